use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use crate::auth::ClientIdentity;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Upper bound for the token refresh threshold (one day)
pub const MAX_REFRESH_THRESHOLD: u64 = 86_400;

/// OneDrive Graph client - app-only access to a user's drive
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Azure AD tenant ID
    #[arg(short = 't', long, env = "TENANT_ID", global = true)]
    pub tenant_id: Option<String>,

    /// Application (client) ID
    #[arg(short = 'c', long, env = "CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Client secret value
    #[arg(short = 's', long, env = "CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Target user's email address (whose drive is accessed)
    #[arg(short = 'u', long, env = "USER_EMAIL", global = true)]
    pub user_email: Option<String>,

    /// Microsoft Graph base URL
    #[arg(long, env = "GRAPH_BASE_URL", default_value = DEFAULT_GRAPH_BASE_URL, global = true)]
    pub graph_url: String,

    /// Identity provider host
    #[arg(long, env = "AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST, global = true)]
    pub authority: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "300", global = true)]
    pub http_timeout: u64,

    /// Print raw JSON metadata instead of a listing
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List files in the root folder or in a folder by ID
    List {
        /// Folder item ID (defaults to the drive root)
        #[arg(short, long)]
        folder: Option<String>,
    },

    /// Show metadata for a file by ID
    Metadata {
        /// File item ID
        id: String,
    },

    /// Download file content by ID
    Download {
        /// File item ID
        id: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search files by name
    Search {
        /// Search term
        query: String,
    },

    /// Show metadata for a file by its drive path (e.g. /Documents/report.pdf)
    GetPath {
        /// Drive path
        path: String,
    },
}

impl CliArgs {
    /// Load `.env` (if present) and parse CLI arguments
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        CliArgs::parse()
    }
}

/// Settings the library needs to reach the identity provider and Graph
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Identity provider host, without tenant
    pub authority_host: String,

    /// Graph API base URL, e.g. https://graph.microsoft.com/v1.0
    pub graph_base_url: String,

    /// Scope requested in the client-credentials grant
    pub scope: String,

    /// Connect timeout in seconds
    pub connect_timeout: u64,

    /// Total request timeout in seconds
    pub request_timeout: u64,

    /// Max idle pooled connections per host
    pub max_connections: usize,

    /// Seconds before expiry at which a token counts as expiring
    pub refresh_threshold: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            connect_timeout: 30,
            request_timeout: 300,
            max_connections: 20,
            refresh_threshold: 300,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // Identity
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_email: String,

    // Endpoints
    pub authority_host: String,
    pub graph_base_url: String,
    pub scope: String,

    // Timeouts
    pub token_refresh_threshold: u64,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Output
    pub log_level: String,
    pub json_output: bool,
}

impl Config {
    /// Build configuration with priority: CLI > ENV > defaults
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = Config {
            tenant_id: args
                .tenant_id
                .clone()
                .context("TENANT_ID is required (use -t or set TENANT_ID env var)")?,

            client_id: args
                .client_id
                .clone()
                .context("CLIENT_ID is required (use -c or set CLIENT_ID env var)")?,

            client_secret: args
                .client_secret
                .clone()
                .context("CLIENT_SECRET is required (use -s or set CLIENT_SECRET env var)")?,

            user_email: args
                .user_email
                .clone()
                .context("USER_EMAIL is required (use -u or set USER_EMAIL env var)")?,

            authority_host: args.authority.trim_end_matches('/').to_string(),
            graph_base_url: args.graph_url.trim_end_matches('/').to_string(),
            scope: std::env::var("GRAPH_SCOPE").unwrap_or_else(|_| DEFAULT_SCOPE.to_string()),

            token_refresh_threshold: env_or("TOKEN_REFRESH_THRESHOLD", 300),

            http_max_connections: env_or("HTTP_MAX_CONNECTIONS", 20),
            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", 30),
            http_request_timeout: args.http_timeout,

            log_level: args.log_level.clone(),
            json_output: args.json,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("GRAPH_BASE_URL", &self.graph_base_url),
            ("AUTHORITY_HOST", &self.authority_host),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                anyhow::bail!("{} must be an http(s) URL: {}", name, url);
            }
        }

        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        if self.token_refresh_threshold > MAX_REFRESH_THRESHOLD {
            anyhow::bail!(
                "TOKEN_REFRESH_THRESHOLD must be at most {} seconds",
                MAX_REFRESH_THRESHOLD
            );
        }

        Ok(())
    }

    /// Application identity for the client-credentials grant
    pub fn identity(&self) -> Result<ClientIdentity> {
        ClientIdentity::new(
            &self.tenant_id,
            &self.client_id,
            &self.client_secret,
            &self.user_email,
        )
        .context("Invalid client identity")
    }

    /// Library-level settings derived from this configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            authority_host: self.authority_host.clone(),
            graph_base_url: self.graph_base_url.clone(),
            scope: self.scope.clone(),
            connect_timeout: self.http_connect_timeout,
            request_timeout: self.http_request_timeout,
            max_connections: self.http_max_connections,
            refresh_threshold: self.token_refresh_threshold,
        }
    }
}

/// Parse an env-only knob, falling back to the default on absence or garbage
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    parse_or(std::env::var(name).ok().as_deref(), default)
}

fn parse_or<T: std::str::FromStr>(value: Option<&str>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "onedrive-graph",
            "--tenant-id",
            "tenant-1",
            "--client-id",
            "client-abc",
            "--client-secret",
            "s3cret",
            "--user-email",
            "user@contoso.com",
        ];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_list_defaults_to_root() {
        let args = args(&["list"]);
        assert_eq!(args.command, Command::List { folder: None });
        assert_eq!(args.graph_url, DEFAULT_GRAPH_BASE_URL);
        assert_eq!(args.authority, DEFAULT_AUTHORITY_HOST);
        assert!(!args.json);
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(
            args(&["list", "--folder", "F1"]).command,
            Command::List {
                folder: Some("F1".to_string())
            }
        );
        assert_eq!(
            args(&["download", "ID1", "-o", "out.bin"]).command,
            Command::Download {
                id: "ID1".to_string(),
                output: Some(PathBuf::from("out.bin")),
            }
        );
        assert_eq!(
            args(&["get-path", "/Documents/a b.pdf"]).command,
            Command::GetPath {
                path: "/Documents/a b.pdf".to_string()
            }
        );
        assert!(args(&["search", "report", "--json"]).json);
    }

    #[test]
    fn test_config_from_args() {
        let config = Config::from_args(&args(&["--graph-url", "http://localhost:9/v1.0/", "list"]))
            .unwrap();
        assert_eq!(config.tenant_id, "tenant-1");
        assert_eq!(config.user_email, "user@contoso.com");
        assert_eq!(config.graph_base_url, "http://localhost:9/v1.0");
        assert!(config.validate().is_ok());

        let client = config.client_config();
        assert_eq!(client.graph_base_url, "http://localhost:9/v1.0");
        assert_eq!(client.request_timeout, 300);

        let identity = config.identity().unwrap();
        assert_eq!(identity.target_account(), "user@contoso.com");
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = Config::from_args(&args(&["list"])).unwrap();
        config.authority_host = "login.microsoftonline.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("AUTHORITY_HOST"));
    }

    #[test]
    fn test_validate_rejects_huge_refresh_threshold() {
        let mut config = Config::from_args(&args(&["list"])).unwrap();
        config.token_refresh_threshold = MAX_REFRESH_THRESHOLD;
        assert!(config.validate().is_ok());

        config.token_refresh_threshold = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TOKEN_REFRESH_THRESHOLD"));
    }

    #[test]
    fn test_parse_or() {
        assert_eq!(parse_or(Some("42"), 7u64), 42);
        assert_eq!(parse_or(Some(" 42 "), 7u64), 42);
        assert_eq!(parse_or(Some("abc"), 7u64), 7);
        assert_eq!(parse_or(None, 7usize), 7);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.authority_host, "https://login.microsoftonline.com");
        assert_eq!(config.graph_base_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(config.scope, "https://graph.microsoft.com/.default");
        assert_eq!(config.refresh_threshold, 300);
    }
}

// === Interactive Setup ===

/// Check if interactive setup is needed (no .env file, missing identity values, a terminal to ask on)
pub fn needs_interactive_setup(args: &CliArgs) -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();

    let missing_identity = args.tenant_id.is_none()
        || args.client_id.is_none()
        || args.client_secret.is_none()
        || args.user_email.is_none();

    !env_file_exists && missing_identity && std::io::stdin().is_terminal()
}

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_email: String,
}

impl InteractiveConfig {
    /// Fill the identity values into parsed CLI arguments
    pub fn apply(self, args: &mut CliArgs) {
        args.tenant_id = Some(self.tenant_id);
        args.client_id = Some(self.client_id);
        args.client_secret = Some(self.client_secret);
        args.user_email = Some(self.user_email);
    }
}

/// Prompt for whichever identity values are missing
pub fn run_interactive_setup(args: &CliArgs) -> Result<InteractiveConfig> {
    eprintln!();
    eprintln!("No configuration found. Let's set up access to OneDrive.");
    eprintln!("Register an app in Azure AD with Files.Read.All (application) permission.");
    eprintln!();

    let tenant_id = prompt_or(&args.tenant_id, "Azure AD tenant ID (TENANT_ID)")?;
    let client_id = prompt_or(&args.client_id, "Application (client) ID (CLIENT_ID)")?;

    let client_secret = match &args.client_secret {
        Some(secret) => secret.clone(),
        None => Password::new()
            .with_prompt("Client secret (CLIENT_SECRET)")
            .interact()
            .context("Failed to read CLIENT_SECRET")?,
    };
    if client_secret.is_empty() {
        anyhow::bail!("CLIENT_SECRET cannot be empty");
    }

    let user_email = prompt_or(&args.user_email, "Target user's email (USER_EMAIL)")?;

    let config = InteractiveConfig {
        tenant_id,
        client_id,
        client_secret,
        user_email,
    };

    eprintln!();
    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        eprintln!("Configuration saved to .env file");
    }

    eprintln!();
    Ok(config)
}

fn prompt_or(existing: &Option<String>, prompt: &str) -> Result<String> {
    if let Some(value) = existing {
        return Ok(value.clone());
    }

    let value: String = Input::new()
        .with_prompt(prompt)
        .interact_text()
        .with_context(|| format!("Failed to read {}", prompt))?;

    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", prompt);
    }
    Ok(value.trim().to_string())
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let env_content = format!(
        r#"# OneDrive Graph client configuration
# Generated by interactive setup

# Azure AD tenant and app registration (required)
TENANT_ID={}
CLIENT_ID={}
CLIENT_SECRET={}

# Whose drive is accessed (required)
USER_EMAIL={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.tenant_id, config.client_id, config.client_secret, config.user_email,
    );

    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(env_content.as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}

use anyhow::{Context, Result};
use std::io::Write;

use onedrive_graph::config::{self, CliArgs, Command, Config};
use onedrive_graph::{DriveClient, DriveItem};

fn main() -> Result<()> {
    let mut args = CliArgs::load();

    // Prompt for missing identity values on first run
    if config::needs_interactive_setup(&args) {
        let interactive_config = config::run_interactive_setup(&args)?;
        interactive_config.apply(&mut args);
    }

    let config = Config::from_args(&args)?;
    config.validate()?;

    // Initialize logging with a configured level; stdout is reserved for output
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(
        "Graph: {}, authority: {}, account: {}",
        config.graph_base_url,
        config.authority_host,
        config.user_email
    );

    let client = DriveClient::new(config.identity()?, &config.client_config())
        .context("Failed to initialize drive client")?;

    run(&client, &args.command, config.json_output)
}

/// Execute one subcommand against the drive
fn run(client: &DriveClient, command: &Command, json: bool) -> Result<()> {
    match command {
        Command::List { folder } => {
            let items = client
                .list_files(folder.as_deref())
                .context("Failed to list files")?;
            print_items(&items, json)
        }

        Command::Metadata { id } => {
            let item = client
                .get_file_metadata(id)
                .with_context(|| format!("Failed to get metadata for {}", id))?;
            print_item(&item, json)
        }

        Command::Download { id, output } => {
            let content = client
                .download_file(id)
                .with_context(|| format!("Failed to download {}", id))?;

            match output {
                Some(path) => {
                    std::fs::write(path, &content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!("Saved {} bytes to {}", content.len(), path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout
                        .write_all(&content)
                        .context("Failed to write to stdout")?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }

        Command::Search { query } => {
            let items = client
                .search_files(query)
                .with_context(|| format!("Search for '{}' failed", query))?;
            print_items(&items, json)
        }

        Command::GetPath { path } => {
            let item = client
                .get_file_by_path(path)
                .with_context(|| format!("Failed to get {}", path))?;
            print_item(&item, json)
        }
    }
}

fn print_items(items: &[DriveItem], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("(no items)");
    }

    for item in items {
        let icon = if item.is_folder() { "📁" } else { "📄" };
        match item.size {
            Some(size) if !item.is_folder() => {
                println!("  {} {}  [{}]  {}", icon, item.name, format_size(size), item.id)
            }
            _ => println!("  {} {}  {}", icon, item.name, item.id),
        }
    }
    Ok(())
}

fn print_item(item: &DriveItem, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(item)?);
        return Ok(());
    }

    println!("  Name:      {}", item.name);
    println!("  ID:        {}", item.id);
    println!(
        "  Type:      {}",
        if item.is_folder() {
            "folder".to_string()
        } else {
            item.mime_type().unwrap_or("file").to_string()
        }
    );
    if let Some(size) = item.size {
        println!("  Size:      {}", format_size(size));
    }
    if let Some(modified) = item.last_modified_date_time {
        println!("  Modified:  {}", modified.to_rfc3339());
    }
    if let Some(ref url) = item.web_url {
        println!("  URL:       {}", url);
    }
    Ok(())
}

/// Human-readable byte size
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

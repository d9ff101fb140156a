// Error handling module
// Defines the error taxonomy surfaced by the Graph client

use thiserror::Error;

/// Errors that can occur while talking to the identity provider or Graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Identity provider rejected or failed the token request
    #[error("Authentication failed: {message}")]
    Authentication {
        status: Option<u16>,
        message: String,
    },

    /// Graph returned a non-2xx status after the allotted retry
    #[error("Graph API error: {status} - {body}")]
    Http { status: u16, body: String },

    /// Connection, timeout or other transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A successful response whose body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid construction parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied id or path that cannot be addressed safely
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GraphError {
    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::Authentication { status, .. } => *status,
            GraphError::Http { status, .. } => Some(*status),
            GraphError::Transport(e) => e.status().map(|s| s.as_u16()),
            GraphError::InvalidResponse(_)
            | GraphError::Config(_)
            | GraphError::InvalidInput(_) => None,
        }
    }

    /// True when the identity provider refused to issue a token
    pub fn is_authentication(&self) -> bool {
        matches!(self, GraphError::Authentication { .. })
    }
}

/// Result type alias for Graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GraphError::Authentication {
            status: Some(400),
            message: "400 Bad Request - invalid_client".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Authentication failed: 400 Bad Request - invalid_client"
        );

        let err = GraphError::Http {
            status: 404,
            body: "itemNotFound".to_string(),
        };
        assert_eq!(err.to_string(), "Graph API error: 404 - itemNotFound");
    }

    #[test]
    fn test_config_error_message() {
        let err = GraphError::Config("tenant_id is required".to_string());
        assert_eq!(err.to_string(), "Configuration error: tenant_id is required");
    }

    #[test]
    fn test_invalid_response_message() {
        let err = GraphError::InvalidResponse("expected value".to_string());
        assert_eq!(err.to_string(), "Invalid response: expected value");
    }

    #[test]
    fn test_invalid_input_message() {
        let err = GraphError::InvalidInput("item id '..' is a dot segment".to_string());
        assert_eq!(err.to_string(), "Invalid input: item id '..' is a dot segment");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_status_accessor() {
        let err = GraphError::Http {
            status: 429,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(429));

        let err = GraphError::Authentication {
            status: None,
            message: "malformed token response".to_string(),
        };
        assert_eq!(err.status(), None);
        assert!(err.is_authentication());

        let err = GraphError::Config("bad".to_string());
        assert_eq!(err.status(), None);
        assert!(!err.is_authentication());
    }
}

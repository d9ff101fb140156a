// OneDrive Graph client - library root

pub mod auth;
pub mod config;
pub mod drive;
pub mod error;
pub mod http_client;
pub mod models;

pub use auth::{ClientIdentity, CredentialManager, CredentialState};
pub use config::ClientConfig;
pub use drive::DriveClient;
pub use error::{GraphError, Result};
pub use http_client::{GraphHttpClient, RequestOptions};
pub use models::DriveItem;

// Authentication module
// Manages the application token lifecycle (client-credentials grant)

mod manager;
mod refresh;
mod types;

pub use manager::CredentialManager;
pub use refresh::{token_url, DEFAULT_EXPIRES_IN};
pub use types::{ClientIdentity, Credential, CredentialState};

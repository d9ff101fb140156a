// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;

use crate::error::{GraphError, Result};

/// Application identity used for the client-credentials grant
///
/// Immutable once built; the secret never shows up in `Debug` output.
#[derive(Clone)]
pub struct ClientIdentity {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    target_account: String,
}

impl ClientIdentity {
    /// Build an identity from trimmed values, rejecting empty ones
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        target_account: impl Into<String>,
    ) -> Result<Self> {
        let required = |name: &str, value: String| -> Result<String> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(GraphError::Config(format!("{} is required", name)));
            }
            Ok(trimmed.to_string())
        };

        Ok(Self {
            tenant_id: required("tenant_id", tenant_id.into())?,
            client_id: required("client_id", client_id.into())?,
            client_secret: required("client_secret", client_secret.into())?,
            target_account: required("target_account", target_account.into())?,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Account whose drive is accessed (usually a UPN / email address)
    pub fn target_account(&self) -> &str {
        &self.target_account
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("target_account", &self.target_account)
            .finish()
    }
}

/// Access token together with its absolute expiry
///
/// Always replaced as a whole value so a token is never seen without its expiry.
#[derive(Clone, PartialEq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Usable while `now < expires_at - skew`
    pub fn is_usable(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(skew)
            .map_or(false, |deadline| now < deadline)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where the credential sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing fetched yet
    Absent,
    /// Usable outside the skew window
    Valid,
    /// Inside the skew window; the next `current()` refreshes
    Expiring,
    /// Rejected by the server with 401
    Invalid,
}

/// Token endpoint success body
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<u64>,
    #[allow(dead_code)]
    pub token_type: Option<String>,
}

/// Token endpoint error body
#[derive(Deserialize)]
pub struct TokenErrorResponse {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

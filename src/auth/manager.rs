use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use std::sync::{Mutex, PoisonError, RwLock};

use super::refresh;
use super::types::{ClientIdentity, Credential, CredentialState};
use crate::config::{ClientConfig, MAX_REFRESH_THRESHOLD};
use crate::error::{GraphError, Result};

/// Stored credential plus whether the server has rejected it
#[derive(Default)]
struct CredentialSlot {
    credential: Option<Credential>,
    rejected: bool,
}

/// Credential manager
/// Owns the application token and refreshes it lazily on demand
pub struct CredentialManager {
    /// Application identity used for every token request
    identity: ClientIdentity,

    /// Current credential, always replaced as a whole
    slot: RwLock<CredentialSlot>,

    /// Serializes refreshes so racing callers do not all hit the provider
    refresh_lock: Mutex<()>,

    /// HTTP client for token requests
    client: Client,

    /// Identity provider host, e.g. https://login.microsoftonline.com
    authority_host: String,

    /// Requested scope, e.g. https://graph.microsoft.com/.default
    scope: String,

    /// Token refresh threshold (default: 300 seconds = 5 minutes)
    refresh_threshold: Duration,
}

impl CredentialManager {
    /// Create a manager with no credential held yet
    pub fn new(identity: ClientIdentity, config: &ClientConfig) -> Result<Self> {
        let refresh_threshold = Some(config.refresh_threshold)
            .filter(|secs| *secs <= MAX_REFRESH_THRESHOLD)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                GraphError::Config(format!(
                    "refresh_threshold must be at most {} seconds, got {}",
                    MAX_REFRESH_THRESHOLD, config.refresh_threshold
                ))
            })?;

        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout))
            .timeout(std::time::Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            identity,
            slot: RwLock::new(CredentialSlot::default()),
            refresh_lock: Mutex::new(()),
            client,
            authority_host: config.authority_host.clone(),
            scope: config.scope.clone(),
            refresh_threshold,
        })
    }

    /// Token that is still usable outside the skew window, if any
    fn usable_token(&self) -> Option<String> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.credential
            .as_ref()
            .filter(|c| c.is_usable(Utc::now(), self.refresh_threshold))
            .map(|c| c.token.clone())
    }

    /// Fetch a new credential and store it; caller holds `refresh_lock`
    fn refresh_locked(&self) -> Result<String> {
        tracing::debug!("Refreshing application token...");

        let credential =
            refresh::request_token(&self.client, &self.authority_host, &self.scope, &self.identity)?;
        let token = credential.token.clone();

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = CredentialSlot {
            credential: Some(credential),
            rejected: false,
        };

        Ok(token)
    }

    /// Get a usable access token, refreshing first if none is held or it is expiring
    pub fn current(&self) -> Result<String> {
        if let Some(token) = self.usable_token() {
            return Ok(token);
        }

        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = self.usable_token() {
            return Ok(token);
        }

        self.refresh_locked()
    }

    /// Unconditionally replace the credential with a fresh one
    pub fn force_refresh(&self) -> Result<String> {
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.refresh_locked()
    }

    /// Record that the server answered 401 to the held token
    pub fn mark_rejected(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.credential.is_some() {
            slot.rejected = true;
        }
    }

    /// Current lifecycle state of the credential
    pub fn state(&self) -> CredentialState {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        match slot.credential {
            None => CredentialState::Absent,
            Some(_) if slot.rejected => CredentialState::Invalid,
            Some(ref c) if c.is_usable(Utc::now(), self.refresh_threshold) => {
                CredentialState::Valid
            }
            Some(_) => CredentialState::Expiring,
        }
    }

    /// Expiry of the held credential
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.credential.as_ref().map(|c| c.expires_at)
    }
}

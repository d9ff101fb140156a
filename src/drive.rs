// OneDrive operations for a single target account
// Each operation builds an endpoint path and delegates to the dispatcher

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{ClientIdentity, CredentialManager};
use crate::config::ClientConfig;
use crate::error::{GraphError, Result};
use crate::http_client::{GraphHttpClient, RequestOptions};
use crate::models::{Collection, DriveItem};

/// Everything except RFC 3986 unreserved characters gets encoded
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Account names keep `@`, which is legal in a path segment
const ACCOUNT: &AsciiSet = &SEGMENT.remove(b'@');

fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

fn encode_account(raw: &str) -> String {
    utf8_percent_encode(raw, ACCOUNT).to_string()
}

/// URL parsers collapse `.` and `..` segments, which would move the request
/// to a different endpoint
fn is_dot_segment(raw: &str) -> bool {
    raw == "." || raw == ".."
}

/// Encode one caller-supplied id that must stay a single, non-empty segment
fn encode_id(kind: &str, raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(GraphError::InvalidInput(format!("{} is empty", kind)));
    }
    if is_dot_segment(raw) {
        return Err(GraphError::InvalidInput(format!(
            "{} '{}' is a dot segment",
            kind, raw
        )));
    }
    Ok(encode_segment(raw))
}

/// Encode a drive path segment by segment, keeping `/` separators
fn encode_drive_path(path: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        if is_dot_segment(segment) {
            return Err(GraphError::InvalidInput(format!(
                "drive path '{}' contains a '{}' segment",
                path, segment
            )));
        }
        segments.push(encode_segment(segment));
    }

    let encoded = segments.join("/");
    if encoded.starts_with('/') {
        Ok(encoded)
    } else {
        Ok(format!("/{}", encoded))
    }
}

/// Endpoint paths relative to the Graph base URL
pub mod paths {
    use super::{encode_account, encode_drive_path, encode_id, encode_segment};
    use crate::error::Result;

    fn drive(account: &str) -> Result<String> {
        encode_id("account", account)?;
        Ok(format!("/users/{}/drive", encode_account(account)))
    }

    pub fn root_children(account: &str) -> Result<String> {
        Ok(format!("{}/root/children", drive(account)?))
    }

    pub fn item_children(account: &str, folder_id: &str) -> Result<String> {
        Ok(format!(
            "{}/items/{}/children",
            drive(account)?,
            encode_id("folder id", folder_id)?
        ))
    }

    pub fn item(account: &str, item_id: &str) -> Result<String> {
        Ok(format!("{}/items/{}", drive(account)?, encode_id("item id", item_id)?))
    }

    pub fn item_content(account: &str, item_id: &str) -> Result<String> {
        Ok(format!(
            "{}/items/{}/content",
            drive(account)?,
            encode_id("item id", item_id)?
        ))
    }

    /// Single quotes are doubled (OData string literal) before encoding
    pub fn search(account: &str, query: &str) -> Result<String> {
        let literal = query.replace('\'', "''");
        Ok(format!(
            "{}/root/search(q='{}')",
            drive(account)?,
            encode_segment(&literal)
        ))
    }

    /// Item addressed by drive path; an empty path or "/" is the root itself
    pub fn by_path(account: &str, path: &str) -> Result<String> {
        if path.trim_matches('/').is_empty() {
            return Ok(format!("{}/root", drive(account)?));
        }
        Ok(format!("{}/root:{}", drive(account)?, encode_drive_path(path)?))
    }
}

/// OneDrive client acting as an application on one account's drive
pub struct DriveClient {
    http: GraphHttpClient,
    account: String,
}

impl DriveClient {
    /// Create a client; no network traffic happens until the first call
    pub fn new(identity: ClientIdentity, config: &ClientConfig) -> Result<Self> {
        let account = identity.target_account().to_string();
        let credentials = Arc::new(CredentialManager::new(identity, config)?);
        let http = GraphHttpClient::new(credentials, config)?;

        tracing::debug!(
            account = %account,
            graph = %config.graph_base_url,
            "Drive client initialized"
        );

        Ok(Self { http, account })
    }

    /// Target account whose drive is accessed
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Credential manager (state, expiry)
    pub fn credentials(&self) -> &CredentialManager {
        self.http.credentials()
    }

    /// Dispatcher, for endpoints this client does not wrap
    pub fn http(&self) -> &GraphHttpClient {
        &self.http
    }

    /// List files and folders in the root, or in a folder by ID
    pub fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<DriveItem>> {
        let path = match folder_id.filter(|id| !id.is_empty()) {
            Some(id) => paths::item_children(&self.account, id)?,
            None => paths::root_children(&self.account)?,
        };

        let collection: Collection<DriveItem> = self.get_json(&path)?;
        Ok(collection.value)
    }

    /// Metadata for a single item
    pub fn get_file_metadata(&self, file_id: &str) -> Result<DriveItem> {
        self.get_json(&paths::item(&self.account, file_id)?)
    }

    /// Raw file content; the pre-authenticated download redirect is followed
    pub fn download_file(&self, file_id: &str) -> Result<Bytes> {
        let options = RequestOptions {
            follow_redirects: true,
            ..RequestOptions::default()
        };

        let response = self.http.execute(
            Method::GET,
            &paths::item_content(&self.account, file_id)?,
            &options,
        )?;
        Ok(response.bytes()?)
    }

    /// Search the drive by name/content
    pub fn search_files(&self, query: &str) -> Result<Vec<DriveItem>> {
        let collection: Collection<DriveItem> =
            self.get_json(&paths::search(&self.account, query)?)?;
        Ok(collection.value)
    }

    /// Metadata for an item by its path, e.g. "/Documents/report.pdf"
    pub fn get_file_by_path(&self, path: &str) -> Result<DriveItem> {
        self.get_json(&paths::by_path(&self.account, path)?)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .execute(Method::GET, path, &RequestOptions::default())?;
        let body = response.text()?;

        serde_json::from_str(&body)
            .map_err(|e| GraphError::InvalidResponse(format!("{} (path: {})", e, path)))
    }
}

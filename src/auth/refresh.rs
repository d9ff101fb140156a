// Token acquisition via the client-credentials grant

use chrono::{Duration, Utc};
use reqwest::blocking::Client;

use super::types::{ClientIdentity, Credential, TokenErrorResponse, TokenResponse};
use crate::error::{GraphError, Result};

/// Default lifetime when the provider omits `expires_in`
pub const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Token endpoint for a tenant on the given authority host
pub fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// Request a fresh application token from the identity provider
pub fn request_token(
    client: &Client,
    authority_host: &str,
    scope: &str,
    identity: &ClientIdentity,
) -> Result<Credential> {
    let url = token_url(authority_host, identity.tenant_id());

    tracing::debug!(
        "Client credentials request: url={}, client_id={}..., scope={}",
        url,
        identity.client_id().chars().take(8).collect::<String>(),
        scope
    );

    let form = [
        ("client_id", identity.client_id()),
        ("client_secret", identity.client_secret()),
        ("scope", scope),
        ("grant_type", "client_credentials"),
    ];

    let response = client.post(&url).form(&form).send()?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().unwrap_or_default();

        // Surface the AAD error code when the body carries one
        let detail = serde_json::from_str::<TokenErrorResponse>(&error_text)
            .ok()
            .and_then(|e| match (e.error, e.error_description) {
                (Some(code), Some(desc)) => Some(format!("{}: {}", code, desc)),
                (Some(code), None) => Some(code),
                _ => None,
            })
            .unwrap_or(error_text);

        return Err(GraphError::Authentication {
            status: Some(status.as_u16()),
            message: format!("token request failed: {} - {}", status, detail),
        });
    }

    let body = response.text()?;
    let data: TokenResponse =
        serde_json::from_str(&body).map_err(|e| GraphError::Authentication {
            status: Some(status.as_u16()),
            message: format!("malformed token response: {} - {}", e, body),
        })?;

    if data.access_token.is_empty() {
        return Err(GraphError::Authentication {
            status: Some(status.as_u16()),
            message: "token response does not contain access_token".to_string(),
        });
    }

    let expires_in = data.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
    let expires_at = i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| GraphError::Authentication {
            status: Some(status.as_u16()),
            message: format!("token response has out-of-range expires_in: {}", expires_in),
        })?;

    tracing::info!(
        "Application token acquired, expires: {}",
        expires_at.to_rfc3339()
    );

    Ok(Credential {
        token: data.access_token,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn identity() -> ClientIdentity {
        ClientIdentity::new("tenant-1", "client-abc", "s3cret", "user@contoso.com").unwrap()
    }

    #[test]
    fn test_token_url() {
        assert_eq!(
            token_url("https://login.microsoftonline.com", "tenant-1"),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(
            token_url("http://127.0.0.1:1234/", "t"),
            "http://127.0.0.1:1234/t/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_request_token_sends_client_credentials_form() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "client-abc".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
                Matcher::UrlEncoded(
                    "scope".into(),
                    "https://graph.microsoft.com/.default".into(),
                ),
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-1","expires_in":1800,"token_type":"Bearer"}"#)
            .expect(1)
            .create();

        let before = Utc::now();
        let cred = request_token(
            &Client::new(),
            &server.url(),
            "https://graph.microsoft.com/.default",
            &identity(),
        )
        .unwrap();
        let after = Utc::now();

        mock.assert();
        assert_eq!(cred.token, "tok-1");
        assert!(cred.expires_at >= before + Duration::seconds(1800));
        assert!(cred.expires_at <= after + Duration::seconds(1800));
    }

    #[test]
    fn test_missing_expires_in_defaults_to_one_hour() {
        let mut server = mockito::Server::new();
        let _token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1"}"#)
            .create();

        let before = Utc::now();
        let cred = request_token(&Client::new(), &server.url(), "scope", &identity()).unwrap();
        let after = Utc::now();

        assert!(cred.expires_at >= before + Duration::seconds(3600));
        assert!(cred.expires_at <= after + Duration::seconds(3600));
    }

    #[test]
    fn test_provider_rejection_is_authentication_error() {
        let mut server = mockito::Server::new();
        let _token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(401)
            .with_body(
                r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided."}"#,
            )
            .create();

        let err = request_token(&Client::new(), &server.url(), "scope", &identity()).unwrap_err();
        match err {
            GraphError::Authentication { status, message } => {
                assert_eq!(status, Some(401));
                assert!(message.contains("invalid_client"));
                assert!(message.contains("AADSTS7000215"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_body_is_authentication_error() {
        let mut server = mockito::Server::new();
        let _token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create();

        let err = request_token(&Client::new(), &server.url(), "scope", &identity()).unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(err.status(), Some(200));
    }

    #[test]
    fn test_empty_access_token_is_rejected() {
        let mut server = mockito::Server::new();
        let _token = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"","expires_in":3600}"#)
            .create();

        let err = request_token(&Client::new(), &server.url(), "scope", &identity()).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_out_of_range_expires_in_is_authentication_error() {
        for expires_in in ["10000000000000", "9223372036854775807", "18446744073709551615"] {
            let mut server = mockito::Server::new();
            let _token = server
                .mock("POST", "/tenant-1/oauth2/v2.0/token")
                .with_status(200)
                .with_body(format!(
                    r#"{{"access_token":"tok-1","expires_in":{}}}"#,
                    expires_in
                ))
                .create();

            let err =
                request_token(&Client::new(), &server.url(), "scope", &identity()).unwrap_err();
            assert!(err.is_authentication(), "{}: {:?}", expires_in, err);
            assert_eq!(err.status(), Some(200));
            assert!(err.to_string().contains("expires_in"));
        }
    }
}

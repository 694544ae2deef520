//! Bearer credentials for tool servers that require authentication.
//!
//! The OAuth flows themselves happen elsewhere; this module only turns a
//! stored refresh token plus client registration into access tokens.

use super::error::{McpError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use toolgate_domain::AuthContext;
use tracing::{debug, info};

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 30;

const TOKEN_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Supplies and refreshes bearer tokens for a transport.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current access token, refreshing first if none is cached or it expired.
    async fn access_token(&self) -> Result<String>;

    /// Force a refresh, e.g. after the server answered 401.
    async fn refresh(&self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug)]
struct TokenState {
    refresh_token: String,
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Exchanges a stored refresh token at the registration's token endpoint.
pub struct StoredTokenAuthProvider {
    http: reqwest::Client,
    context_id: String,
    client_id: String,
    client_secret: Option<String>,
    token_endpoint: String,
    state: Mutex<TokenState>,
}

impl StoredTokenAuthProvider {
    pub fn from_context(http: reqwest::Client, context: &AuthContext) -> Result<Self> {
        let refresh_token = context
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                McpError::Auth(format!("auth context '{}' has no refresh token", context.id))
            })?;
        let info = context.client_information.as_ref().ok_or_else(|| {
            McpError::Auth(format!(
                "auth context '{}' has no client registration",
                context.id
            ))
        })?;
        let token_endpoint = info.token_endpoint.clone().ok_or_else(|| {
            McpError::Auth(format!(
                "client registration for '{}' has no token endpoint",
                context.id
            ))
        })?;

        Ok(Self {
            http,
            context_id: context.id.clone(),
            client_id: info.client_id.clone(),
            client_secret: info.client_secret.clone(),
            token_endpoint,
            state: Mutex::new(TokenState {
                refresh_token,
                access_token: None,
                expires_at: None,
            }),
        })
    }

    async fn exchange(&self, state: &mut TokenState) -> Result<()> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", state.refresh_token.clone()),
            ("client_id", self.client_id.clone()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        debug!(context = %self.context_id, "Refreshing access token");
        let response = self
            .http
            .post(&self.token_endpoint)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await?;
        state.access_token = Some(token.access_token);
        state.expires_at = token
            .expires_in
            .and_then(|secs| expiry_after(Utc::now(), secs));
        if let Some(rotated) = token.refresh_token.filter(|t| !t.is_empty()) {
            info!(context = %self.context_id, "Refresh token rotated");
            state.refresh_token = rotated;
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for StoredTokenAuthProvider {
    async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(token) = &state.access_token
            && is_fresh(state.expires_at, Utc::now())
        {
            return Ok(token.clone());
        }

        self.exchange(&mut state).await?;
        state
            .access_token
            .clone()
            .ok_or_else(|| McpError::Auth("token endpoint returned no access token".into()))
    }

    async fn refresh(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.exchange(&mut state).await
    }
}

/// `None` when `expires_in` is out of range; such a token is kept until rejected.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// A token without a known expiry is treated as fresh until the server rejects it.
fn is_fresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(at) => now
            .checked_add_signed(Duration::seconds(EXPIRY_SKEW_SECS))
            .is_some_and(|threshold| threshold < at),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use toolgate_domain::OAuthClientInformation;

    fn context_for(token_endpoint: &str) -> AuthContext {
        AuthContext::new("ctx").with_refresh_token("rt").with_client_information(
            OAuthClientInformation {
                client_id: "client".to_string(),
                client_secret: None,
                token_endpoint: Some(token_endpoint.to_string()),
            },
        )
    }

    fn context() -> AuthContext {
        context_for("https://auth.example.com/token")
    }

    #[test]
    fn test_from_context_requires_token_endpoint() {
        let mut ctx = context();
        assert!(StoredTokenAuthProvider::from_context(reqwest::Client::new(), &ctx).is_ok());

        if let Some(info) = ctx.client_information.as_mut() {
            info.token_endpoint = None;
        }
        let err = StoredTokenAuthProvider::from_context(reqwest::Client::new(), &ctx)
            .err()
            .unwrap();
        assert!(err.to_string().contains("token endpoint"));
    }

    #[test]
    fn test_from_context_requires_refresh_token() {
        let ctx = AuthContext::new("ctx").with_client_information(OAuthClientInformation {
            client_id: "client".to_string(),
            ..Default::default()
        });
        assert!(StoredTokenAuthProvider::from_context(reqwest::Client::new(), &ctx).is_err());
    }

    #[test]
    fn test_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh(None, now));
        assert!(is_fresh(Some(now + Duration::seconds(300)), now));
        assert!(!is_fresh(Some(now + Duration::seconds(10)), now));
        assert!(!is_fresh(Some(now - Duration::seconds(1)), now));
    }

    #[test]
    fn test_expiry_after_out_of_range() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 60), Some(now + Duration::seconds(60)));
        assert_eq!(expiry_after(now, i64::MAX), None);
        assert_eq!(expiry_after(now, i64::MIN), None);
    }

    #[tokio::test]
    async fn test_refresh_token_exchange_and_rotation() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "rt".into()),
                Matcher::UrlEncoded("client_id".into(), "client".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at-1","expires_in":3600,"refresh_token":"rt-2"}"#)
            .expect(1)
            .create_async()
            .await;
        let rotated = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("refresh_token".into(), "rt-2".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at-2"}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = StoredTokenAuthProvider::from_context(
            reqwest::Client::new(),
            &context_for(&format!("{}/token", server.url())),
        )
        .unwrap();

        assert_eq!(provider.access_token().await.unwrap(), "at-1");
        // cached while fresh
        assert_eq!(provider.access_token().await.unwrap(), "at-1");
        provider.refresh().await.unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "at-2");

        first.assert_async().await;
        rotated.assert_async().await;
    }

    #[tokio::test]
    async fn test_huge_expires_in_does_not_panic() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"access_token":"at","expires_in":{}}}"#, i64::MAX))
            .create_async()
            .await;

        let provider = StoredTokenAuthProvider::from_context(
            reqwest::Client::new(),
            &context_for(&format!("{}/token", server.url())),
        )
        .unwrap();

        assert_eq!(provider.access_token().await.unwrap(), "at");
        assert!(provider.state.lock().await.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_token_endpoint_error_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body("invalid_grant")
            .create_async()
            .await;

        let provider = StoredTokenAuthProvider::from_context(
            reqwest::Client::new(),
            &context_for(&format!("{}/token", server.url())),
        )
        .unwrap();

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, McpError::Auth(message) if message.contains("invalid_grant")));
    }
}

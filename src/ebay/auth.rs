use crate::cache::now_ms;
use crate::ebay::config::{APP_ID, APP_SECRET, OAUTH_TOKEN_URL};
use crate::http::build_client;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

const BROWSE_SCOPES: &[&str] = &["https://api.ebay.com/oauth/api_scope"];

// Refresh slightly before the advertised expiry.
const EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Error)]
pub enum EbayAuthError {
    #[error("missing ebay app credentials in env")]
    MissingCredentials,
    #[error("oauth request failed: {0}")]
    Request(String),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at_ms: i64,
}

/// Client-credentials token source for the Browse API. Tokens are cached
/// until shortly before expiry; `invalidate` forces the next call to fetch a
/// fresh one (used exactly once after a 401).
pub struct AppTokenProvider {
    cached: Mutex<Option<CachedToken>>,
}

impl AppTokenProvider {
    pub fn new() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }

    pub async fn bearer(&self) -> Result<String, EbayAuthError> {
        {
            let guard = self.cached.lock().await;
            if let Some(token) = guard.as_ref()
                && now_ms() < token.expires_at_ms - EXPIRY_MARGIN_MS
            {
                return Ok(token.value.clone());
            }
        }

        // Lock released across the network call; two concurrent misses both
        // fetch and the second write wins, which is harmless.
        let (value, expires_in) = request_app_token(BROWSE_SCOPES).await?;
        let token = CachedToken {
            value: value.clone(),
            expires_at_ms: now_ms() + (expires_in as i64) * 1000,
        };
        *self.cached.lock().await = Some(token);
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

impl Default for AppTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn basic_auth_header() -> Result<String, EbayAuthError> {
    if APP_ID.is_empty() || APP_SECRET.is_empty() {
        return Err(EbayAuthError::MissingCredentials);
    }
    let raw = format!("{}:{}", *APP_ID, *APP_SECRET);
    Ok(format!("Basic {}", BASE64.encode(raw)))
}

async fn request_app_token(scopes: &[&str]) -> Result<(String, u64), EbayAuthError> {
    let authorization = basic_auth_header()?;
    let body = [
        ("grant_type", "client_credentials"),
        ("scope", &scopes.join(" ")),
    ];
    let client = build_client();
    let response = client
        .post(OAUTH_TOKEN_URL.as_str())
        .header(reqwest::header::AUTHORIZATION, authorization)
        .form(&body)
        .send()
        .await
        .map_err(|err| EbayAuthError::Request(err.to_string()))?;

    if !response.status().is_success() {
        return Err(EbayAuthError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }

    let payload: TokenResponse = response
        .json()
        .await
        .map_err(|err| EbayAuthError::Request(err.to_string()))?;
    Ok((payload.access_token, payload.expires_in.unwrap_or(7200)))
}

//! OAuth refresh-token exchange for the storage account.
//!
//! The account is configured with a long-lived refresh token; every API call
//! needs a short-lived access token. `TokenProvider` exchanges one for the
//! other and caches the result until shortly before it expires.

use crate::api_contracts::TokenResponse;
use crate::error::{BackupError, BackupResult};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";

/// Refresh this many seconds before the reported expiry.
const REFRESH_MARGIN_SECS: i64 = 300;

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges a refresh token for cached short-lived access tokens.
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    app_key: String,
    app_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Create a provider against the production token endpoint.
    pub fn new(app_key: String, app_secret: String, refresh_token: String) -> Self {
        Self::with_token_url(DEFAULT_TOKEN_URL.to_string(), app_key, app_secret, refresh_token)
    }

    /// Create a provider with an explicit token endpoint (used by tests).
    pub fn with_token_url(
        token_url: String,
        app_key: String,
        app_secret: String,
        refresh_token: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url,
            app_key,
            app_secret,
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    /// Get a valid access token, refreshing if the cached one is near expiry.
    pub async fn access_token(&self) -> BackupResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let refreshed = self.refresh().await?;
        debug!("refreshed access token (expires in {}s)", refreshed.expires_in);

        let access_token = refreshed.access_token.clone();
        *cached = Some(CachedToken {
            access_token: refreshed.access_token,
            expires_at: Utc::now() + Duration::seconds(refreshed.expires_in),
        });

        Ok(access_token)
    }

    async fn refresh(&self) -> BackupResult<TokenResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.app_key.as_str()),
                ("client_secret", self.app_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackupError::Auth(format!(
                "token refresh failed ({status}): {body}"
            )));
        }

        Ok(response.json().await?)
    }
}

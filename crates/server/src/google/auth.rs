//! Service-account bearer tokens via the OAuth 2.0 JWT-bearer grant.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use showings_core::domain::tenant::CredentialsRef;
use showings_core::errors::ProviderError;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ensure_success, transport_error};

pub const SCOPES: &str =
    "https://www.googleapis.com/auth/calendar https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// Source of bearer tokens for a tenant's credentials.
#[async_trait]
pub trait AccessTokens: Send + Sync {
    async fn bearer(&self, credentials: &CredentialsRef) -> Result<SecretString, ProviderError>;
}

#[derive(Debug, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub async fn read(path: &Path) -> Result<Self, ProviderError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|error| {
            ProviderError::Credentials(format!("cannot read `{}`: {error}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|error| {
            ProviderError::Credentials(format!("`{}` is not a service-account key: {error}", path.display()))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Signed RS256 assertion for `key`, valid for one hour from `now`.
pub fn sign_assertion(key: &ServiceAccountKey, audience: &str, now: DateTime<Utc>) -> Result<String, ProviderError> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SCOPES,
        aud: audience,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|error| ProviderError::Credentials(format!("invalid private key: {error}")))?;
    encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
        .map_err(|error| ProviderError::Credentials(format!("could not sign assertion: {error}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone)]
struct CachedToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

type TokenSlot = Arc<Mutex<Option<CachedToken>>>;

/// Exchanges service-account assertions for access tokens and keeps each
/// token until shortly before it expires. Each key file has its own slot, so
/// a refresh only waits on callers sharing that key.
pub struct ServiceAccountAuth {
    client: Client,
    token_url: String,
    slots: StdMutex<HashMap<PathBuf, TokenSlot>>,
}

impl ServiceAccountAuth {
    pub fn new(client: Client, token_url: impl Into<String>) -> Self {
        Self { client, token_url: token_url.into(), slots: StdMutex::new(HashMap::new()) }
    }

    fn slot(&self, path: &Path) -> Result<TokenSlot, ProviderError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| ProviderError::Credentials("token cache poisoned".to_string()))?;
        Ok(slots.entry(path.to_path_buf()).or_default().clone())
    }

    async fn cached_or_exchange<F, Fut>(&self, path: &Path, exchange: F) -> Result<SecretString, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken, ProviderError>>,
    {
        let slot = self.slot(path)?;
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }
        let fresh = exchange().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self, path: &Path) -> Result<CachedToken, ProviderError> {
        let key = ServiceAccountKey::read(path).await?;
        let audience = key.token_uri.clone().unwrap_or_else(|| self.token_url.clone());
        let now = Utc::now();
        let assertion = sign_assertion(&key, &audience, now)?;

        let response = self
            .client
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        let token: TokenResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| ProviderError::Decode(format!("token response: {error}")))?;
        if token.access_token.is_empty() {
            return Err(ProviderError::Credentials("token endpoint returned empty access token".to_string()));
        }

        debug!(
            event_name = "google.auth.token_issued",
            client_email = %key.client_email,
            expires_in = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
            "service-account token issued"
        );

        Ok(CachedToken {
            value: SecretString::from(token.access_token),
            expires_at: now + Duration::seconds(token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS)),
        })
    }
}

#[async_trait]
impl AccessTokens for ServiceAccountAuth {
    async fn bearer(&self, credentials: &CredentialsRef) -> Result<SecretString, ProviderError> {
        self.cached_or_exchange(&credentials.0, || self.exchange(&credentials.0)).await
    }
}

#[cfg(test)]
pub struct StaticToken(pub SecretString);

#[cfg(test)]
#[async_trait]
impl AccessTokens for StaticToken {
    async fn bearer(&self, _credentials: &CredentialsRef) -> Result<SecretString, ProviderError> {
        Ok(self.0.clone())
    }
}

pub(crate) fn authorization(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}

//! Google OAuth 2.0 token management for the Sheets API.
//!
//! Supports three credential sources, tried in this order:
//! - a pre-generated access token (`GOOGLE_ACCESS_TOKEN`)
//! - a service account key (`GOOGLE_CREDENTIALS` as a key-file path or inline
//!   JSON, or `GOOGLE_SERVICE_ACCOUNT_JSON`)
//! - the user OAuth refresh-token flow

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Default Google OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for spreadsheet access.
pub const GOOGLE_SHEETS_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

/// Lifetime assumed for a pre-generated token.
const PREGENERATED_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Tokens are refreshed this long before they expire.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Google OAuth credentials and token cache.
#[derive(Debug, Clone)]
pub struct GoogleAuth {
    inner: Arc<RwLock<GoogleAuthInner>>,
    client: reqwest::blocking::Client,
}

#[derive(Debug)]
struct GoogleAuthInner {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    service_account: Option<ServiceAccountKey>,
    token_url: String,
    access_token: Option<String>,
    token_expires_at: Option<Instant>,
}

/// Configuration for Google OAuth.
#[derive(Debug, Clone, Default)]
pub struct GoogleAuthConfig {
    /// OAuth client ID (user OAuth flow)
    pub client_id: Option<String>,
    /// OAuth client secret (user OAuth flow)
    pub client_secret: Option<String>,
    /// Refresh token (user OAuth flow)
    pub refresh_token: Option<String>,
    /// Service account key JSON
    pub service_account_json: Option<String>,
    /// Pre-generated access token
    pub access_token: Option<String>,
    /// Override for the OAuth refresh endpoint
    pub token_url: Option<String>,
}

impl GoogleAuthConfig {
    /// Load configuration from environment variables.
    ///
    /// `GOOGLE_CREDENTIALS` may hold either a path to a key file or the key JSON
    /// itself; it takes precedence over `GOOGLE_SERVICE_ACCOUNT_JSON`.
    pub fn from_env() -> Result<Self, GoogleAuthError> {
        let service_account_json = match non_empty_env("GOOGLE_CREDENTIALS") {
            Some(value) => Some(read_credentials_value(&value)?),
            None => non_empty_env("GOOGLE_SERVICE_ACCOUNT_JSON"),
        };

        Ok(Self {
            client_id: non_empty_env("GOOGLE_CLIENT_ID"),
            client_secret: non_empty_env("GOOGLE_CLIENT_SECRET"),
            refresh_token: non_empty_env("GOOGLE_REFRESH_TOKEN"),
            service_account_json,
            access_token: non_empty_env("GOOGLE_ACCESS_TOKEN"),
            token_url: non_empty_env("GOOGLE_OAUTH_TOKEN_URL"),
        })
    }

    /// Check if the configuration has usable credentials.
    pub fn is_valid(&self) -> bool {
        self.access_token.is_some()
            || self.service_account_json.is_some()
            || (self.client_id.is_some()
                && self.client_secret.is_some()
                && self.refresh_token.is_some())
    }
}

/// Error types for Google authentication.
#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("failed to read credentials file {path}: {message}")]
    CredentialsFile { path: String, message: String },
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("service account auth failed: {0}")]
    ServiceAccountAuthFailed(String),
    #[error("http error: {0}")]
    HttpError(String),
    #[error("json error: {0}")]
    JsonError(String),
    #[error("token cache lock poisoned")]
    LockPoisoned,
}

/// Fields of a service account key file that the JWT flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl GoogleAuth {
    /// Create a new GoogleAuth instance from configuration.
    pub fn new(config: GoogleAuthConfig) -> Result<Self, GoogleAuthError> {
        if !config.is_valid() {
            return Err(GoogleAuthError::MissingCredentials(
                "Either GOOGLE_ACCESS_TOKEN, GOOGLE_CREDENTIALS, GOOGLE_SERVICE_ACCOUNT_JSON, or (GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + GOOGLE_REFRESH_TOKEN) must be set".to_string(),
            ));
        }

        let service_account = config
            .service_account_json
            .as_deref()
            .map(|json| {
                serde_json::from_str::<ServiceAccountKey>(json)
                    .map_err(|e| GoogleAuthError::ServiceAccountAuthFailed(e.to_string()))
            })
            .transpose()?;

        let (access_token, token_expires_at) = match config.access_token {
            Some(token) => (Some(token), Some(Instant::now() + PREGENERATED_TOKEN_TTL)),
            None => (None, None),
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GoogleAuthError::HttpError(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(RwLock::new(GoogleAuthInner {
                client_id: config.client_id,
                client_secret: config.client_secret,
                refresh_token: config.refresh_token,
                service_account,
                token_url: config
                    .token_url
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
                access_token,
                token_expires_at,
            })),
            client,
        })
    }

    /// Create a new GoogleAuth instance from environment variables.
    pub fn from_env() -> Result<Self, GoogleAuthError> {
        Self::new(GoogleAuthConfig::from_env()?)
    }

    /// Get a valid access token, refreshing if necessary.
    pub fn get_access_token(&self) -> Result<String, GoogleAuthError> {
        {
            let inner = self.inner.read().map_err(|_| GoogleAuthError::LockPoisoned)?;
            if let (Some(token), Some(expires_at)) = (&inner.access_token, &inner.token_expires_at)
            {
                if *expires_at > Instant::now() + EXPIRY_SLACK {
                    return Ok(token.clone());
                }
            }
        }

        self.refresh_access_token()
    }

    /// Force refresh the access token.
    pub fn refresh_access_token(&self) -> Result<String, GoogleAuthError> {
        let inner = self.inner.read().map_err(|_| GoogleAuthError::LockPoisoned)?;

        if let Some(key) = inner.service_account.clone() {
            drop(inner);
            return self.refresh_via_service_account(&key);
        }

        if let (Some(client_id), Some(client_secret), Some(refresh_token)) =
            (&inner.client_id, &inner.client_secret, &inner.refresh_token)
        {
            let client_id = client_id.clone();
            let client_secret = client_secret.clone();
            let refresh_token = refresh_token.clone();
            let token_url = inner.token_url.clone();
            drop(inner);
            return self.refresh_via_oauth(&token_url, &client_id, &client_secret, &refresh_token);
        }

        Err(GoogleAuthError::MissingCredentials(
            "No refreshable credentials available".to_string(),
        ))
    }

    fn refresh_via_oauth(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<String, GoogleAuthError> {
        debug!("Refreshing Google OAuth token");

        let response = self
            .client
            .post(token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .map_err(|e| GoogleAuthError::HttpError(e.to_string()))?;

        let token = self.read_token_response(response, GoogleAuthError::TokenRefreshFailed)?;
        debug!("Google OAuth token refreshed successfully");
        Ok(token)
    }

    /// Exchange a signed RS256 assertion for an access token.
    fn refresh_via_service_account(&self, key: &ServiceAccountKey) -> Result<String, GoogleAuthError> {
        debug!("Requesting Google token for service account {}", key.client_email);

        let token_url = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URL);
        let assertion = sign_service_account_assertion(key, token_url, chrono::Utc::now().timestamp())?;

        let response = self
            .client
            .post(token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .map_err(|e| GoogleAuthError::HttpError(e.to_string()))?;

        self.read_token_response(response, GoogleAuthError::ServiceAccountAuthFailed)
    }

    fn read_token_response(
        &self,
        response: reqwest::blocking::Response,
        on_status: fn(String) -> GoogleAuthError,
    ) -> Result<String, GoogleAuthError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            error!("Google token request failed: {} - {}", status, body);
            return Err(on_status(format!("HTTP {}: {}", status, body)));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .map_err(|e| GoogleAuthError::JsonError(e.to_string()))?;

        let lifetime = Duration::from_secs(token_response.expires_in.max(0).unsigned_abs());
        let access_token = token_response.access_token;

        let mut inner = self.inner.write().map_err(|_| GoogleAuthError::LockPoisoned)?;
        inner.access_token = Some(access_token.clone());
        inner.token_expires_at = Some(Instant::now() + lifetime);

        Ok(access_token)
    }
}

/// Build the signed JWT used in the service-account token exchange.
pub fn sign_service_account_assertion(
    key: &ServiceAccountKey,
    audience: &str,
    issued_at: i64,
) -> Result<String, GoogleAuthError> {
    let claims = JwtClaims {
        iss: &key.client_email,
        scope: GOOGLE_SHEETS_SCOPES.join(" "),
        aud: audience,
        iat: issued_at,
        exp: issued_at.saturating_add(3600),
    };

    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| GoogleAuthError::ServiceAccountAuthFailed(format!("invalid private key: {}", e)))?;

    jsonwebtoken::encode(&header, &claims, &encoding_key)
        .map_err(|e| GoogleAuthError::ServiceAccountAuthFailed(e.to_string()))
}

/// Interpret a `GOOGLE_CREDENTIALS` value as inline JSON or a key-file path.
fn read_credentials_value(value: &str) -> Result<String, GoogleAuthError> {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }
    std::fs::read_to_string(Path::new(trimmed)).map_err(|e| GoogleAuthError::CredentialsFile {
        path: trimmed.to_string(),
        message: e.to_string(),
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    token_type: Option<String>,
}

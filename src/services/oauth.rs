//! Google OAuth service: authorization URL, state, code exchange, user upsert.
//!
//! DESIGN
//! ======
//! The CSRF state lives in two places: a short-lived cookie on the browser
//! and a `verifications` row on the server. The callback must present the
//! same value in both, and consuming the row is a `DELETE ... RETURNING`, so
//! a state is usable once.

use axum::http::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ErrorCode, INTERNAL_SERVER_ERROR};
use crate::services::session;

pub const GOOGLE_PROVIDER: &str = "google";
pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
pub const GOOGLE_SCOPES: &str = "openid email profile";
pub const CALLBACK_PATH: &str = "/api/auth/callback/google";

pub const CODE_ACCOUNT_NOT_LINKED: &str = "ACCOUNT_NOT_LINKED";

const STATE_IDENTIFIER_PREFIX: &str = "oauth-state:";
const STATE_TTL_SECS: f64 = 600.0;

/// Google OAuth configuration loaded from environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl GoogleConfig {
    /// Load from `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET`; the redirect
    /// URI is derived from the application's external base URL.
    /// Returns `None` if either variable is missing or empty (Google sign-in disabled).
    #[must_use]
    pub fn from_env(base_url: &str) -> Option<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").ok().filter(|v| !v.trim().is_empty())?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok().filter(|v| !v.trim().is_empty())?;
        Some(Self::new(client_id, client_secret, base_url))
    }

    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, base_url: &str) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: format!("{}{CALLBACK_PATH}", base_url.trim_end_matches('/')),
        }
    }

    /// Build the Google consent URL. Always shows the account chooser in a popup-style page.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Config` if the URL cannot be assembled.
    pub fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        Url::parse_with_params(
            GOOGLE_AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("state", state),
                ("prompt", "select_account"),
                ("display", "popup"),
                ("access_type", "offline"),
            ],
        )
        .map(String::from)
        .map_err(|e| OAuthError::Config(e.to_string()))
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("google sign-in is not configured")]
    NotConfigured,
    #[error("invalid oauth state")]
    InvalidState,
    #[error("oauth configuration error: {0}")]
    Config(String),
    #[error("google token exchange failed: {0}")]
    TokenExchange(String),
    #[error("google api error: {0}")]
    GoogleApi(String),
    #[error("google account has no email")]
    MissingEmail,
    #[error("account not linked: email is registered and google did not verify it")]
    AccountNotLinked,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for OAuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "PROVIDER_NOT_FOUND",
            Self::InvalidState => "INVALID_OAUTH_STATE",
            Self::TokenExchange(_) | Self::GoogleApi(_) => "OAUTH_PROVIDER_ERROR",
            Self::MissingEmail => "EMAIL_NOT_FOUND",
            Self::AccountNotLinked => CODE_ACCOUNT_NOT_LINKED,
            Self::Config(_) | Self::Db(_) => INTERNAL_SERVER_ERROR,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidState => StatusCode::UNAUTHORIZED,
            Self::TokenExchange(_) | Self::GoogleApi(_) => StatusCode::BAD_GATEWAY,
            Self::MissingEmail | Self::AccountNotLinked => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Config(_) | Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUser {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleUser {
    /// Display name, falling back to the email's local part.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_owned();
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("user")
            .to_owned()
    }
}

// =============================================================================
// STATE
// =============================================================================

fn state_identifier(state: &str) -> String {
    format!("{STATE_IDENTIFIER_PREFIX}{state}")
}

/// Create and persist a fresh OAuth state value.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_state(pool: &PgPool) -> Result<String, OAuthError> {
    let state = session::generate_token();
    sqlx::query(
        r"INSERT INTO verifications (id, identifier, value, expires_at)
          VALUES ($1, $2, $3, now() + make_interval(secs => $4))",
    )
    .bind(Uuid::new_v4())
    .bind(state_identifier(&state))
    .bind(GOOGLE_PROVIDER)
    .bind(STATE_TTL_SECS)
    .execute(pool)
    .await?;
    Ok(state)
}

/// Consume a state value atomically.
///
/// # Errors
///
/// `InvalidState` if the value is unknown, expired or already used.
pub async fn consume_state(pool: &PgPool, state: &str) -> Result<(), OAuthError> {
    let row = sqlx::query(
        "DELETE FROM verifications WHERE identifier = $1 AND expires_at > now() RETURNING id",
    )
    .bind(state_identifier(state))
    .fetch_optional(pool)
    .await?;
    row.map(|_| ()).ok_or(OAuthError::InvalidState)
}

/// Cookie and query must both carry the same non-empty state.
#[must_use]
pub fn states_match(cookie_state: Option<&str>, query_state: Option<&str>) -> bool {
    match (cookie_state, query_state) {
        (Some(expected), Some(actual)) => !expected.is_empty() && expected == actual,
        _ => false,
    }
}

// =============================================================================
// GOOGLE API
// =============================================================================

/// Exchange an authorization code for tokens.
///
/// # Errors
///
/// `TokenExchange` on transport failures or an unexpected response body.
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &GoogleConfig,
    code: &str,
) -> Result<GoogleTokens, OAuthError> {
    let resp = http
        .post(GOOGLE_TOKEN_URL)
        .header("Accept", "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;
    if !status.is_success() {
        return Err(OAuthError::TokenExchange(format!("{status}: {body}")));
    }
    serde_json::from_str(&body).map_err(|_| OAuthError::TokenExchange(format!("unexpected response: {body}")))
}

/// Fetch the OpenID profile of the token's owner.
///
/// # Errors
///
/// `GoogleApi` on transport failures or a non-success status.
pub async fn fetch_google_user(http: &reqwest::Client, access_token: &str) -> Result<GoogleUser, OAuthError> {
    let resp = http
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| OAuthError::GoogleApi(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(OAuthError::GoogleApi(format!("{status}: {body}")));
    }

    resp.json::<GoogleUser>()
        .await
        .map_err(|e| OAuthError::GoogleApi(e.to_string()))
}

// =============================================================================
// PERSISTENCE
// =============================================================================

fn token_expiry(tokens: &GoogleTokens) -> Option<OffsetDateTime> {
    tokens
        .expires_in
        .and_then(|secs| OffsetDateTime::now_utc().checked_add(time::Duration::seconds(secs)))
}

/// Resolve the local user for a Google profile, creating or linking as needed.
///
/// 1. a linked google account wins (its tokens are refreshed);
/// 2. otherwise a user with the same verified email gets the account linked;
/// 3. otherwise a new user + account is created.
///
/// # Errors
///
/// `MissingEmail` when a new link needs an email Google did not return,
/// `AccountNotLinked` when the email exists but Google did not verify it.
pub async fn upsert_google_user(pool: &PgPool, profile: &GoogleUser, tokens: &GoogleTokens) -> Result<Uuid, OAuthError> {
    let mut tx = pool.begin().await?;
    let expires_at = token_expiry(tokens);

    let linked = sqlx::query(
        r"UPDATE accounts
          SET access_token = $3,
              refresh_token = COALESCE($4, refresh_token),
              id_token = $5,
              access_token_expires_at = $6,
              scope = $7,
              updated_at = now()
          WHERE provider_id = $1 AND account_id = $2
          RETURNING user_id",
    )
    .bind(GOOGLE_PROVIDER)
    .bind(&profile.sub)
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(&tokens.id_token)
    .bind(expires_at)
    .bind(&tokens.scope)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = linked {
        tx.commit().await?;
        return Ok(row.get("user_id"));
    }

    let email = profile
        .email
        .as_deref()
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or(OAuthError::MissingEmail)?;

    let existing = sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&mut *tx)
        .await?;

    let user_id = match existing {
        Some(row) => {
            if !profile.email_verified {
                return Err(OAuthError::AccountNotLinked);
            }
            row.get("id")
        }
        None => {
            let id = Uuid::new_v4();
            sqlx::query("INSERT INTO users (id, name, email, email_verified, image) VALUES ($1, $2, $3, $4, $5)")
                .bind(id)
                .bind(profile.display_name())
                .bind(&email)
                .bind(profile.email_verified)
                .bind(&profile.picture)
                .execute(&mut *tx)
                .await?;
            id
        }
    };

    sqlx::query(
        r"INSERT INTO accounts
              (id, account_id, provider_id, user_id, access_token, refresh_token, id_token,
               access_token_expires_at, scope)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(Uuid::new_v4())
    .bind(&profile.sub)
    .bind(GOOGLE_PROVIDER)
    .bind(user_id)
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(&tokens.id_token)
    .bind(expires_at)
    .bind(&tokens.scope)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(%user_id, "google account linked");
    Ok(user_id)
}

#[cfg(test)]
#[path = "oauth_test.rs"]
mod tests;

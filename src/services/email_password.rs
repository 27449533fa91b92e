//! Email + password registration and sign-in.
//!
//! Credentials live in `accounts` with `provider_id = 'credential'`; the
//! user row itself carries no secret. Sign-up signs the user in immediately.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::SessionPolicy;
use crate::db;
use crate::error::{ErrorCode, INTERNAL_SERVER_ERROR};
use crate::forms;
use crate::services::password::{self, PasswordError};
use crate::services::session::{self, IssuedSession, SessionMeta};

pub const CREDENTIAL_PROVIDER: &str = "credential";
pub const PASSWORD_MAX_CHARS: usize = 128;

pub const CODE_USER_ALREADY_EXISTS: &str = "USER_ALREADY_EXISTS_USE_ANOTHER_EMAIL";
pub const CODE_INVALID_EMAIL_OR_PASSWORD: &str = "INVALID_EMAIL_OR_PASSWORD";

#[derive(Debug, thiserror::Error)]
pub enum EmailAuthError {
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Name is required")]
    InvalidName,
    #[error("Password too short")]
    PasswordTooShort,
    #[error("Password too long")]
    PasswordTooLong,
    #[error("User already exists. Use another email.")]
    UserAlreadyExists,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("password error: {0}")]
    Password(#[from] PasswordError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ErrorCode for EmailAuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidName => "INVALID_NAME",
            Self::PasswordTooShort => "PASSWORD_TOO_SHORT",
            Self::PasswordTooLong => "PASSWORD_TOO_LONG",
            Self::UserAlreadyExists => CODE_USER_ALREADY_EXISTS,
            Self::InvalidCredentials => CODE_INVALID_EMAIL_OR_PASSWORD,
            Self::Password(_) | Self::Db(_) => INTERNAL_SERVER_ERROR,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidEmail | Self::InvalidName | Self::PasswordTooShort | Self::PasswordTooLong => {
                StatusCode::BAD_REQUEST
            }
            Self::UserAlreadyExists => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Password(_) | Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Public user fields returned after sign-up / sign-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: AuthUserRecord,
    pub session: IssuedSession,
}

/// Trim and lowercase; `None` when the result is not a plausible address.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    forms::is_valid_email(&normalized).then_some(normalized)
}

fn check_password_length(password: &str) -> Result<(), EmailAuthError> {
    let len = forms::text_len(password);
    if len < forms::PASSWORD_MIN_CHARS {
        return Err(EmailAuthError::PasswordTooShort);
    }
    if len > PASSWORD_MAX_CHARS {
        return Err(EmailAuthError::PasswordTooLong);
    }
    Ok(())
}

/// Register a user with email and password, then issue a session.
///
/// # Errors
///
/// `UserAlreadyExists` when the email is taken (including a lost insert race),
/// validation variants for bad input, `Db`/`Password` for internal failures.
pub async fn sign_up_email(
    pool: &PgPool,
    policy: &SessionPolicy,
    req: &SignUpRequest,
    meta: &SessionMeta,
) -> Result<SignedIn, EmailAuthError> {
    let email = normalize_email(&req.email).ok_or(EmailAuthError::InvalidEmail)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(EmailAuthError::InvalidName);
    }
    check_password_length(&req.password)?;

    let existing = sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(EmailAuthError::UserAlreadyExists);
    }

    let password_hash = password::hash_password(&req.password).await?;
    let user_id = Uuid::new_v4();

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(name)
        .bind(&email)
        .execute(&mut *tx)
        .await;
    if let Err(e) = inserted {
        return Err(if db::is_unique_violation(&e) { EmailAuthError::UserAlreadyExists } else { e.into() });
    }
    sqlx::query(
        r"INSERT INTO accounts (id, account_id, provider_id, user_id, password)
          VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id.to_string())
    .bind(CREDENTIAL_PROVIDER)
    .bind(user_id)
    .bind(&password_hash)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let session = session::create_session(pool, user_id, policy, meta).await?;
    tracing::info!(%user_id, "user registered");

    Ok(SignedIn {
        user: AuthUserRecord { id: user_id, name: name.to_owned(), email, email_verified: false, image: None },
        session,
    })
}

/// Verify email + password and issue a session.
///
/// # Errors
///
/// `InvalidCredentials` for an unknown email, a user without a password
/// account, or a wrong password.
pub async fn sign_in_email(
    pool: &PgPool,
    policy: &SessionPolicy,
    req: &SignInRequest,
    meta: &SessionMeta,
) -> Result<SignedIn, EmailAuthError> {
    let email = normalize_email(&req.email).ok_or(EmailAuthError::InvalidEmail)?;

    let row = sqlx::query(
        r"SELECT u.id, u.name, u.email, u.email_verified, u.image, a.password
          FROM users u
          JOIN accounts a ON a.user_id = u.id AND a.provider_id = $2
          WHERE u.email = $1",
    )
    .bind(&email)
    .bind(CREDENTIAL_PROVIDER)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(EmailAuthError::InvalidCredentials);
    };
    let Some(hash) = row.get::<Option<String>, _>("password") else {
        return Err(EmailAuthError::InvalidCredentials);
    };
    if !password::verify_password(&req.password, &hash).await? {
        return Err(EmailAuthError::InvalidCredentials);
    }

    let user = AuthUserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        email_verified: row.get("email_verified"),
        image: row.get("image"),
    };
    let session = session::create_session(pool, user.id, policy, meta).await?;
    tracing::info!(user_id = %user.id, "user signed in");

    Ok(SignedIn { user, session })
}

#[cfg(test)]
#[path = "email_password_test.rs"]
mod tests;

//! Session issuance, validation and revocation.
//!
//! ARCHITECTURE
//! ============
//! Sessions are opaque random tokens stored in `sessions` and carried by an
//! HTTP-only cookie. Validation joins the owning user and the user's first
//! clinic, so every handler that sees a session also sees the active clinic
//! (or `None` for users that have not created one yet).
//!
//! TRADE-OFFS
//! ==========
//! Expiry slides: a session touched more than `update_age` after its last
//! refresh gets a fresh `ttl`. That costs one conditional `UPDATE` per request
//! that crosses the threshold and nothing otherwise. A refreshed context is
//! flagged so the HTTP layer can re-issue the cookie with the new expiry.

use std::fmt::Write;

use rand::Rng;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::SessionPolicy;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// TYPES
// =============================================================================

/// Request metadata stored alongside a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Clinic attached to the session payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionClinic {
    pub id: Uuid,
    pub name: String,
}

/// User row returned from session validation, enriched with the first clinic.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    /// First clinic by association time; `None` until the user creates one.
    pub clinic: Option<SessionClinic>,
}

/// Session row as exposed by `get-session`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// A validated session with its user.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub session: SessionInfo,
    pub user: SessionUser,
    /// Set when this validation slid `session.expires_at` forward.
    #[serde(skip)]
    pub refreshed: bool,
}

/// A freshly issued session. `expires_at` is the database expiry, which the
/// cookie mirrors.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

fn secs(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64()
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create a session for the given user, returning the token and expiry.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    policy: &SessionPolicy,
    meta: &SessionMeta,
) -> Result<IssuedSession, sqlx::Error> {
    let id = Uuid::new_v4();
    let token = generate_token();
    let row = sqlx::query(
        r"INSERT INTO sessions (id, token, user_id, expires_at, ip_address, user_agent)
          VALUES ($1, $2, $3, now() + make_interval(secs => $4), $5, $6)
          RETURNING expires_at",
    )
    .bind(id)
    .bind(&token)
    .bind(user_id)
    .bind(secs(policy.ttl))
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .fetch_one(pool)
    .await?;

    Ok(IssuedSession { token, expires_at: row.get("expires_at") })
}

fn context_from_row(r: &PgRow) -> SessionContext {
    let clinic_id: Option<Uuid> = r.get("clinic_id");
    let clinic_name: Option<String> = r.get("clinic_name");
    let clinic = clinic_id.zip(clinic_name).map(|(id, name)| SessionClinic { id, name });

    SessionContext {
        session: SessionInfo { id: r.get("session_id"), user_id: r.get("id"), expires_at: r.get("expires_at") },
        user: SessionUser {
            id: r.get("id"),
            name: r.get("name"),
            email: r.get("email"),
            email_verified: r.get("email_verified"),
            image: r.get("image"),
            clinic,
        },
        refreshed: false,
    }
}

/// Validate a session token and return the session with its enriched user.
///
/// Expired sessions are treated as absent. A session past its refresh
/// threshold gets its expiry extended before returning, and the returned
/// context has `refreshed` set.
///
/// # Errors
///
/// Returns a database error if a query fails.
pub async fn validate_session(
    pool: &PgPool,
    token: &str,
    policy: &SessionPolicy,
) -> Result<Option<SessionContext>, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT
              s.id AS session_id,
              s.expires_at,
              u.id,
              u.name,
              u.email,
              u.email_verified,
              u.image,
              c.id AS clinic_id,
              c.name AS clinic_name
          FROM sessions s
          JOIN users u ON u.id = s.user_id
          LEFT JOIN LATERAL (
              SELECT cl.id, cl.name
              FROM users_to_clinics uc
              JOIN clinics cl ON cl.id = uc.clinic_id
              WHERE uc.user_id = u.id
              ORDER BY uc.created_at, cl.id
              LIMIT 1
          ) c ON TRUE
          WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut ctx = context_from_row(&row);

    if let Some(expires_at) = refresh_session(pool, ctx.session.id, policy).await? {
        ctx.session.expires_at = expires_at;
        ctx.refreshed = true;
    }

    Ok(Some(ctx))
}

/// Extend the session's expiry if it was last refreshed more than
/// `update_age` ago. Returns the new expiry when a refresh happened.
async fn refresh_session(
    pool: &PgPool,
    session_id: Uuid,
    policy: &SessionPolicy,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    let row = sqlx::query(
        r"UPDATE sessions
          SET expires_at = now() + make_interval(secs => $2),
              updated_at = now()
          WHERE id = $1 AND updated_at < now() - make_interval(secs => $3)
          RETURNING expires_at",
    )
    .bind(session_id)
    .bind(secs(policy.ttl))
    .bind(secs(policy.update_age))
    .fetch_optional(pool)
    .await?;

    if row.is_some() {
        tracing::debug!(%session_id, "session expiry extended");
    }
    Ok(row.map(|r| r.get("expires_at")))
}

/// Delete a session by token.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

//! Clinic service: the create-clinic action, membership listing, access gate.
//!
//! DESIGN
//! ======
//! Creating a clinic inserts the clinic and the creator's association in one
//! transaction. The creator's user row is locked first so concurrent submits
//! from the same user serialize and agree on which one was the first clinic.
//! The first clinic tells the caller to navigate to the dashboard; later ones
//! complete in place.

use axum::http::StatusCode;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ErrorCode, INTERNAL_SERVER_ERROR};
use crate::services::session::SessionUser;

pub const DASHBOARD_PATH: &str = "/dashboard";
pub const AUTHENTICATION_PATH: &str = "/authentication";
pub const CLINIC_FORM_PATH: &str = "/clinic-form";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("user not found: {0}")]
    UserNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for ClinicError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::Database(_) => INTERNAL_SERVER_ERROR,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClinicRow {
    pub id: Uuid,
    pub name: String,
}

/// Result of the create-clinic action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Finished in place; the caller stays on the form.
    Completed,
    /// Finished and the caller should navigate to the given path.
    Redirect(&'static str),
}

impl ActionOutcome {
    #[must_use]
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            Self::Completed => None,
            Self::Redirect(to) => Some(to),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedClinic {
    pub clinic: ClinicRow,
    pub outcome: ActionOutcome,
}

// =============================================================================
// ACTION
// =============================================================================

/// Create a clinic owned by `user_id` and associate the user with it.
///
/// Every call creates exactly one clinic and one association; submissions are
/// not deduplicated.
///
/// # Errors
///
/// `UserNotFound` if the user row is gone, `Database` on query failures.
pub async fn create_clinic(pool: &PgPool, user_id: Uuid, name: &str) -> Result<CreatedClinic, ClinicError> {
    let mut tx = pool.begin().await?;

    let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if locked.is_none() {
        return Err(ClinicError::UserNotFound(user_id));
    }

    let prior = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM users_to_clinics WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO clinics (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO users_to_clinics (user_id, clinic_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(%user_id, clinic_id = %id, first = prior == 0, "clinic created");

    Ok(CreatedClinic { clinic: ClinicRow { id, name: name.to_owned() }, outcome: outcome_for(prior) })
}

fn outcome_for(prior_associations: i64) -> ActionOutcome {
    if prior_associations == 0 { ActionOutcome::Redirect(DASHBOARD_PATH) } else { ActionOutcome::Completed }
}

/// Clinics the user belongs to, oldest association first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_user_clinics(pool: &PgPool, user_id: Uuid) -> Result<Vec<ClinicRow>, ClinicError> {
    let rows = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT c.id, c.name
         FROM users_to_clinics uc
         JOIN clinics c ON c.id = uc.clinic_id
         WHERE uc.user_id = $1
         ORDER BY uc.created_at ASC, c.id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id, name)| ClinicRow { id, name }).collect())
}

// =============================================================================
// ACCESS GATE
// =============================================================================

/// Decision for pages that need a signed-in user with a clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGate {
    Authenticate,
    CreateClinic,
    Granted,
}

impl AccessGate {
    #[must_use]
    pub fn evaluate(user: Option<&SessionUser>, clinic_count: usize) -> Self {
        match (user, clinic_count) {
            (None, _) => Self::Authenticate,
            (Some(_), 0) => Self::CreateClinic,
            (Some(_), _) => Self::Granted,
        }
    }

    /// Where to send the request, or `None` when access is granted.
    #[must_use]
    pub fn redirect_to(self) -> Option<&'static str> {
        match self {
            Self::Authenticate => Some(AUTHENTICATION_PATH),
            Self::CreateClinic => Some(CLINIC_FORM_PATH),
            Self::Granted => None,
        }
    }
}

#[cfg(test)]
#[path = "clinic_test.rs"]
mod tests;

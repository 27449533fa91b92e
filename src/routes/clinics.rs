//! Clinic JSON API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::error::ApiError;
use crate::forms::ClinicForm;
use crate::routes::auth::AuthUser;
use crate::services::clinic::{self, ClinicRow};
use crate::state::AppState;

/// `GET /api/clinics`: the caller's clinics, oldest association first.
pub async fn list_clinics(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<ClinicRow>>, ApiError> {
    clinic::list_user_clinics(&state.pool, auth.user.id)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_err(&e))
}

/// `POST /api/clinics`: create a clinic for the caller.
pub async fn create_clinic(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<ClinicForm>,
) -> Result<Response, ApiError> {
    let name = match form.validate() {
        Ok(name) => name,
        Err(errors) => {
            let body = serde_json::json!({
                "code": "VALIDATION_ERROR",
                "message": format!("{} invalid field(s)", errors.len()),
                "errors": errors,
            });
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response());
        }
    };

    let created = clinic::create_clinic(&state.pool, auth.user.id, &name)
        .await
        .map_err(|e| ApiError::from_err(&e))?;
    let body = serde_json::json!({
        "clinic": created.clinic,
        "redirect": created.outcome.redirect_target(),
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

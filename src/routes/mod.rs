//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the HTML pages, the auth JSON endpoints, the clinic
//! JSON API and the static assets. Everything shares `AppState`. A session
//! middleware wraps every route and re-issues the session cookie whenever a
//! request slid the session's expiry.

pub mod auth;
pub mod clinics;
pub mod pages;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::root))
        .route("/authentication", get(pages::authentication))
        .route("/authentication/sign-up", post(pages::sign_up))
        .route("/authentication/sign-in", post(pages::sign_in))
        .route("/dashboard", get(pages::dashboard))
        .route("/clinic-form", get(pages::clinic_form).post(pages::clinic_form_submit))
        .route("/sign-out", post(pages::sign_out))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-up/email", post(auth::sign_up_email))
        .route("/api/auth/sign-in/email", post(auth::sign_in_email))
        .route("/api/auth/get-session", get(auth::get_session))
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route("/api/auth/sign-in/google", get(auth::google_sign_in))
        .route("/api/auth/callback/google", get(auth::google_callback))
        .route("/api/clinics", get(clinics::list_clinics).post(clinics::create_clinic))
        .route("/healthz", get(healthz))
}

/// Full application router.
pub fn app(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.config.static_dir);

    page_routes()
        .merge(api_routes())
        .nest_service("/static", static_dir)
        .layer(middleware::from_fn_with_state(state.clone(), auth::reissue_refreshed_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

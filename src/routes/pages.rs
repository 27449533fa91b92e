//! Page routes: authentication, dashboard and clinic form.
//!
//! DESIGN
//! ======
//! Forms post back to the server. Validation runs before any service call;
//! an invalid submission re-renders the page with field errors (422) and the
//! service is never reached. Service failures become a toast on the
//! re-rendered page, and success navigates with a 303 so a reload does not
//! resubmit. Gate redirects (signed out, no clinic yet) are 307.

use axum::Form;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::error::ErrorCode;
use crate::forms::{ClinicForm, FieldErrors, SignInForm, SignUpForm};
use crate::routes::auth::{self, ClientInfo, MaybeSession, PageUser};
use crate::services::clinic::{self, AUTHENTICATION_PATH, AccessGate, ActionOutcome, DASHBOARD_PATH};
use crate::services::email_password::{
    self, CODE_INVALID_EMAIL_OR_PASSWORD, CODE_USER_ALREADY_EXISTS, SignInRequest, SignUpRequest,
};
use crate::services::oauth::CODE_ACCOUNT_NOT_LINKED;
use crate::state::AppState;
use crate::views::{self, AuthenticationPage, SignInView, SignUpView, Toast};

pub const TOAST_EMAIL_TAKEN: &str = "Email já cadastrado.";
pub const TOAST_SIGN_UP_FAILED: &str = "Erro ao criar conta.";
pub const TOAST_INVALID_CREDENTIALS: &str = "Email ou senha inválidos.";
pub const TOAST_SIGN_IN_FAILED: &str = "Erro ao entrar.";
pub const TOAST_CLINIC_CREATED: &str = "Clínica criada com sucesso.";
pub const TOAST_CLINIC_FAILED: &str = "Erro ao criar clínica.";
pub const TOAST_RATE_LIMITED: &str = "Muitas tentativas. Tente novamente em instantes.";
pub const TOAST_GOOGLE_FAILED: &str = "Erro ao entrar com Google.";
pub const TOAST_GOOGLE_NOT_LINKED: &str = "Este email já possui uma conta. Entre com email e senha.";

const INTERNAL_ERROR_TEXT: &str = "Erro interno do servidor.";

/// Toast for a failed registration, by error code.
#[must_use]
pub fn sign_up_error_toast(code: &str) -> &'static str {
    if code == CODE_USER_ALREADY_EXISTS { TOAST_EMAIL_TAKEN } else { TOAST_SIGN_UP_FAILED }
}

/// Toast for a failed sign-in, by error code.
#[must_use]
pub fn sign_in_error_toast(code: &str) -> &'static str {
    if code == CODE_INVALID_EMAIL_OR_PASSWORD { TOAST_INVALID_CREDENTIALS } else { TOAST_SIGN_IN_FAILED }
}

/// Toast for a failed Google sign-in, by the code in `?error=`.
#[must_use]
pub fn google_error_toast(code: &str) -> &'static str {
    if code == CODE_ACCOUNT_NOT_LINKED { TOAST_GOOGLE_NOT_LINKED } else { TOAST_GOOGLE_FAILED }
}

fn render_auth(status: StatusCode, state: &AppState, mut page: AuthenticationPage) -> Response {
    page.google_enabled = state.google.is_some();
    (status, Html(views::render_authentication(&page))).into_response()
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// `GET /`: send everyone to the dashboard, which applies the gate.
pub async fn root() -> Redirect {
    Redirect::temporary(DASHBOARD_PATH)
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthenticationQuery {
    error: Option<String>,
}

/// `GET /authentication`. `?error=` carries a failed Google sign-in.
pub async fn authentication(
    State(state): State<AppState>,
    MaybeSession(ctx): MaybeSession,
    Query(query): Query<AuthenticationQuery>,
) -> Response {
    if ctx.is_some() {
        return Redirect::temporary(DASHBOARD_PATH).into_response();
    }
    let toast = query.error.as_deref().map(|code| Toast::error(google_error_toast(code)));
    render_auth(StatusCode::OK, &state, AuthenticationPage { toast, ..AuthenticationPage::default() })
}

/// `POST /authentication/sign-up`
pub async fn sign_up(State(state): State<AppState>, client: ClientInfo, Form(form): Form<SignUpForm>) -> Response {
    let echo = |errors: FieldErrors, toast: Option<Toast>| AuthenticationPage {
        sign_up: SignUpView { name: form.name.clone(), email: form.email.clone(), errors },
        toast,
        ..AuthenticationPage::default()
    };

    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => return render_auth(StatusCode::UNPROCESSABLE_ENTITY, &state, echo(errors, None)),
    };

    if auth::check_rate_limit(&state, &client).is_err() {
        let page = echo(FieldErrors::new(), Some(Toast::error(TOAST_RATE_LIMITED)));
        return render_auth(StatusCode::TOO_MANY_REQUESTS, &state, page);
    }

    let req = SignUpRequest { name: input.name, email: input.email, password: input.password };
    match email_password::sign_up_email(&state.pool, &state.config.session, &req, &client.meta).await {
        Ok(signed_in) => {
            let jar = CookieJar::new().add(auth::issued_session_cookie(signed_in.session, &state.config));
            (jar, Redirect::to(DASHBOARD_PATH)).into_response()
        }
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(error = %e, "sign-up failed");
            }
            let toast = Toast::error(sign_up_error_toast(e.error_code()));
            render_auth(e.status(), &state, echo(FieldErrors::new(), Some(toast)))
        }
    }
}

/// `POST /authentication/sign-in`
pub async fn sign_in(State(state): State<AppState>, client: ClientInfo, Form(form): Form<SignInForm>) -> Response {
    let echo = |errors: FieldErrors, toast: Option<Toast>| AuthenticationPage {
        sign_in: SignInView { email: form.email.clone(), errors },
        toast,
        ..AuthenticationPage::default()
    };

    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => return render_auth(StatusCode::UNPROCESSABLE_ENTITY, &state, echo(errors, None)),
    };

    if auth::check_rate_limit(&state, &client).is_err() {
        let page = echo(FieldErrors::new(), Some(Toast::error(TOAST_RATE_LIMITED)));
        return render_auth(StatusCode::TOO_MANY_REQUESTS, &state, page);
    }

    let req = SignInRequest { email: input.email, password: input.password };
    match email_password::sign_in_email(&state.pool, &state.config.session, &req, &client.meta).await {
        Ok(signed_in) => {
            let jar = CookieJar::new().add(auth::issued_session_cookie(signed_in.session, &state.config));
            (jar, Redirect::to(DASHBOARD_PATH)).into_response()
        }
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(error = %e, "sign-in failed");
            }
            let toast = Toast::error(sign_in_error_toast(e.error_code()));
            render_auth(e.status(), &state, echo(FieldErrors::new(), Some(toast)))
        }
    }
}

/// `POST /sign-out`
pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = auth::end_session(&state, jar).await;
    (jar, Redirect::to(AUTHENTICATION_PATH)).into_response()
}

// =============================================================================
// DASHBOARD
// =============================================================================

/// `GET /dashboard`: signed-in users with at least one clinic.
pub async fn dashboard(State(state): State<AppState>, MaybeSession(ctx): MaybeSession) -> Response {
    let Some(ctx) = ctx else {
        return Redirect::temporary(AUTHENTICATION_PATH).into_response();
    };

    let clinics = match clinic::list_user_clinics(&state.pool, ctx.user.id).await {
        Ok(clinics) => clinics,
        Err(e) => {
            tracing::error!(error = %e, user_id = %ctx.user.id, "clinic lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_TEXT).into_response();
        }
    };

    let gate = AccessGate::evaluate(Some(&ctx.user), clinics.len());
    if let Some(to) = gate.redirect_to() {
        return Redirect::temporary(to).into_response();
    }
    Html(views::render_dashboard(&ctx.user, clinics.first())).into_response()
}

// =============================================================================
// CLINIC FORM
// =============================================================================

/// `GET /clinic-form`
pub async fn clinic_form(_page_user: PageUser) -> Html<String> {
    Html(views::render_clinic_form("", &FieldErrors::new(), None))
}

/// `POST /clinic-form`: run the create-clinic action.
pub async fn clinic_form_submit(
    State(state): State<AppState>,
    PageUser { user }: PageUser,
    Form(form): Form<ClinicForm>,
) -> Response {
    let name = match form.validate() {
        Ok(name) => name,
        Err(errors) => {
            let html = views::render_clinic_form(&form.name, &errors, None);
            return (StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response();
        }
    };

    match clinic::create_clinic(&state.pool, user.id, &name).await {
        Ok(created) => match created.outcome {
            ActionOutcome::Redirect(to) => Redirect::to(to).into_response(),
            ActionOutcome::Completed => {
                let toast = Some(Toast::success(TOAST_CLINIC_CREATED));
                Html(views::render_clinic_form("", &FieldErrors::new(), toast)).into_response()
            }
        },
        Err(e) => {
            tracing::error!(error = %e, user_id = %user.id, "clinic creation failed");
            let toast = Some(Toast::error(TOAST_CLINIC_FAILED));
            let html = views::render_clinic_form(&form.name, &FieldErrors::new(), toast);
            (e.status(), Html(html)).into_response()
        }
    }
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;

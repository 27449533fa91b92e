//! Auth routes: session extractors, cookies, email/password and Google endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{ConnectInfo, FromRef, FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::config::AppConfig;
use crate::error::{ApiError, ErrorCode, INTERNAL_SERVER_ERROR};
use crate::rate_limit::RateLimitError;
use crate::services::clinic::{AUTHENTICATION_PATH, DASHBOARD_PATH};
use crate::services::email_password::{self, SignInRequest, SignUpRequest, SignedIn};
use crate::services::oauth::{self, OAuthError};
use crate::services::session::{self, IssuedSession, SessionContext, SessionMeta, SessionUser};
use crate::state::AppState;

pub const SESSION_COOKIE_NAME: &str = "session_token";
pub const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";

const UNKNOWN_CLIENT: &str = "unknown";
const MISSING_CODE: &str = "MISSING_CODE";

// =============================================================================
// COOKIES
// =============================================================================

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Session cookie that expires together with the session row.
pub(crate) fn session_cookie(token: String, expires_at: OffsetDateTime, config: &AppConfig) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE_NAME, token, config.cookie_secure);
    cookie.set_expires(expires_at);
    cookie
}

pub(crate) fn issued_session_cookie(issued: IssuedSession, config: &AppConfig) -> Cookie<'static> {
    session_cookie(issued.token, issued.expires_at, config)
}

pub(crate) fn clear_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(name, String::new(), secure);
    cookie.set_max_age(Duration::ZERO);
    cookie
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(SESSION_COOKIE_NAME)
        .map(Cookie::value)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Delete the request's session (if any) and return a jar that clears the cookie.
pub(crate) async fn end_session(state: &AppState, jar: CookieJar) -> CookieJar {
    if let Some(token) = jar.get(SESSION_COOKIE_NAME).map(Cookie::value).filter(|v| !v.is_empty()) {
        if let Err(e) = session::delete_session(&state.pool, token).await {
            tracing::warn!(error = %e, "session delete failed");
        }
    }
    jar.add(clear_cookie(SESSION_COOKIE_NAME, state.config.cookie_secure))
}

// =============================================================================
// SLIDING EXPIRY
// =============================================================================

/// Request extension through which the session extractors report a slid
/// expiry back to `reissue_refreshed_session`.
#[derive(Clone, Default)]
pub(crate) struct SessionRefresh(Arc<Mutex<Option<OffsetDateTime>>>);

impl SessionRefresh {
    fn record(&self, expires_at: OffsetDateTime) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(expires_at);
        }
    }

    fn take(&self) -> Option<OffsetDateTime> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

fn sets_session_cookie(headers: &HeaderMap) -> bool {
    let prefix = format!("{SESSION_COOKIE_NAME}=");
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.to_str().is_ok_and(|v| v.starts_with(&prefix)))
}

/// Middleware: when the handler's session lookup extended the session,
/// send the cookie again with the new expiry. Handlers that already set the
/// session cookie (sign-in, sign-out) win.
pub(crate) async fn reissue_refreshed_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let refresh = SessionRefresh::default();
    req.extensions_mut().insert(refresh.clone());
    let token = session_token(req.headers());

    let mut response = next.run(req).await;

    let (Some(expires_at), Some(token)) = (refresh.take(), token) else {
        return response;
    };
    if sets_session_cookie(response.headers()) {
        return response;
    }
    let cookie = session_cookie(token, expires_at, &state.config);
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "refreshed session cookie not encodable"),
    }
    response
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Session for the request cookie, `None` when signed out.
pub struct MaybeSession(pub Option<SessionContext>);

impl<S> FromRequestParts<S> for MaybeSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(Self(None));
        };

        let app_state = AppState::from_ref(state);
        let ctx = session::validate_session(&app_state.pool, &token, &app_state.config.session)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "session lookup failed");
                ApiError::internal()
            })?;

        let refresh = parts.extensions.get::<SessionRefresh>();
        if let (Some(ctx), Some(refresh)) = (ctx.as_ref().filter(|ctx| ctx.refreshed), refresh) {
            refresh.record(ctx.session.expires_at);
        }
        Ok(Self(ctx))
    }
}

/// Authenticated user for JSON routes; rejects with 401.
pub struct AuthUser {
    pub user: SessionUser,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeSession(ctx) = MaybeSession::from_request_parts(parts, state).await?;
        ctx.map(|ctx| Self { user: ctx.user })
            .ok_or_else(ApiError::unauthorized)
    }
}

/// Authenticated user for pages; signed-out requests are sent to `/authentication`.
pub struct PageUser {
    pub user: SessionUser,
}

impl<S> FromRequestParts<S> for PageUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeSession(ctx) = MaybeSession::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        ctx.map(|ctx| Self { user: ctx.user })
            .ok_or_else(|| Redirect::temporary(AUTHENTICATION_PATH).into_response())
    }
}

/// Rate-limit key plus the metadata stored with new sessions.
pub struct ClientInfo {
    pub key: String,
    pub meta: SessionMeta,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let key = client_key(&parts.headers, peer);
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let ip_address = (key != UNKNOWN_CLIENT).then(|| key.clone());

        Ok(Self { key, meta: SessionMeta { ip_address, user_agent } })
    }
}

/// First `X-Forwarded-For` hop, else the peer IP, else a shared fallback key.
pub(crate) fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(hop) = forwarded {
        return hop.to_owned();
    }
    peer.map_or_else(|| UNKNOWN_CLIENT.to_owned(), |addr| addr.ip().to_string())
}

pub(crate) fn check_rate_limit(state: &AppState, client: &ClientInfo) -> Result<(), RateLimitError> {
    state.rate_limiter.check_and_record(&client.key).inspect_err(|e| {
        tracing::warn!(client = %client.key, error = %e, "auth attempt rate limited");
    })
}

// =============================================================================
// EMAIL / PASSWORD
// =============================================================================

fn signed_in_response(state: &AppState, signed_in: SignedIn) -> Response {
    let body = serde_json::json!({ "token": signed_in.session.token, "user": signed_in.user });
    let jar = CookieJar::new().add(issued_session_cookie(signed_in.session, &state.config));
    (jar, Json(body)).into_response()
}

/// `POST /api/auth/sign-up/email`: register and sign in.
pub async fn sign_up_email(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<SignUpRequest>,
) -> Result<Response, ApiError> {
    check_rate_limit(&state, &client).map_err(|e| ApiError::from_err(&e))?;
    let signed_in = email_password::sign_up_email(&state.pool, &state.config.session, &req, &client.meta)
        .await
        .map_err(|e| ApiError::from_err(&e))?;
    Ok(signed_in_response(&state, signed_in))
}

/// `POST /api/auth/sign-in/email`: verify credentials and sign in.
pub async fn sign_in_email(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<SignInRequest>,
) -> Result<Response, ApiError> {
    check_rate_limit(&state, &client).map_err(|e| ApiError::from_err(&e))?;
    let signed_in = email_password::sign_in_email(&state.pool, &state.config.session, &req, &client.meta)
        .await
        .map_err(|e| ApiError::from_err(&e))?;
    Ok(signed_in_response(&state, signed_in))
}

/// `GET /api/auth/get-session`: current session or `null`.
pub async fn get_session(MaybeSession(ctx): MaybeSession) -> Json<Option<SessionContext>> {
    Json(ctx)
}

/// `POST /api/auth/sign-out`: delete session, clear cookie.
pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = end_session(&state, jar).await;
    (jar, Json(serde_json::json!({ "success": true })))
}

// =============================================================================
// GOOGLE
// =============================================================================

/// `GET /api/auth/sign-in/google`: redirect to Google's consent page.
pub async fn google_sign_in(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(config) = &state.google else {
        return Err(ApiError::from_err(&OAuthError::NotConfigured));
    };

    let oauth_state = oauth::create_state(&state.pool)
        .await
        .map_err(|e| ApiError::from_err(&e))?;
    let url = config.authorize_url(&oauth_state).map_err(|e| ApiError::from_err(&e))?;

    let mut cookie = base_cookie(OAUTH_STATE_COOKIE_NAME, oauth_state, state.config.cookie_secure);
    cookie.set_max_age(Duration::minutes(10));
    let jar = CookieJar::new().add(cookie);
    Ok((jar, Redirect::temporary(&url)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Where a failed Google sign-in lands: the authentication page with the
/// error code, which the page turns into a toast.
#[must_use]
pub fn google_error_redirect(code: &str) -> String {
    format!("{AUTHENTICATION_PATH}?error={code}")
}

/// `GET /api/auth/callback/google`: verify state, exchange code, sign in.
///
/// This is a browser navigation, so every outcome is a redirect and every
/// outcome clears the state cookie.
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    client: ClientInfo,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let cookie_state = jar.get(OAUTH_STATE_COOKIE_NAME).map(|c| c.value().to_owned());
    let jar = jar.add(clear_cookie(OAUTH_STATE_COOKIE_NAME, state.config.cookie_secure));

    let Some(config) = &state.google else {
        return (jar, ApiError::from_err(&OAuthError::NotConfigured)).into_response();
    };

    if let Some(error) = params.error.as_deref() {
        tracing::info!(%error, "google sign-in cancelled");
        return (jar, Redirect::temporary(AUTHENTICATION_PATH)).into_response();
    }

    match finish_google_sign_in(&state, config, cookie_state.as_deref(), &params, &client).await {
        Ok(issued) => {
            let jar = jar.add(issued_session_cookie(issued, &state.config));
            (jar, Redirect::temporary(DASHBOARD_PATH)).into_response()
        }
        Err(code) => (jar, Redirect::temporary(&google_error_redirect(code))).into_response(),
    }
}

/// Run the callback after the state cookie was read. Errors are logged here
/// and reduced to the code shown on the authentication page.
async fn finish_google_sign_in(
    state: &AppState,
    config: &oauth::GoogleConfig,
    cookie_state: Option<&str>,
    params: &CallbackQuery,
    client: &ClientInfo,
) -> Result<IssuedSession, &'static str> {
    if !oauth::states_match(cookie_state, params.state.as_deref()) {
        tracing::warn!("google callback with invalid state");
        return Err(OAuthError::InvalidState.error_code());
    }
    let (Some(oauth_state), Some(code)) = (params.state.as_deref(), params.code.as_deref()) else {
        tracing::warn!("google callback without authorization code");
        return Err(MISSING_CODE);
    };

    let user_id = resolve_google_user(state, config, oauth_state, code).await.map_err(|e| {
        if e.status().is_server_error() {
            tracing::error!(error = %e, "google sign-in failed");
        } else {
            tracing::warn!(error = %e, "google sign-in rejected");
        }
        e.error_code()
    })?;

    session::create_session(&state.pool, user_id, &state.config.session, &client.meta)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "session creation failed");
            INTERNAL_SERVER_ERROR
        })
}

async fn resolve_google_user(
    state: &AppState,
    config: &oauth::GoogleConfig,
    oauth_state: &str,
    code: &str,
) -> Result<uuid::Uuid, OAuthError> {
    oauth::consume_state(&state.pool, oauth_state).await?;
    let tokens = oauth::exchange_code(&state.http, config, code).await?;
    let profile = oauth::fetch_google_user(&state.http, &tokens.access_token).await?;
    oauth::upsert_google_user(&state.pool, &profile, &tokens).await
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

//! Server-rendered pages.
//!
//! DESIGN
//! ======
//! Pages are static HTML templates compiled into the binary with
//! `include_str!` and filled by placeholder substitution. Every value that
//! came from a user or the database goes through `escape_html` before it is
//! substituted. Substitution is a single left-to-right pass over the template,
//! so inserted text is never scanned for placeholders again. Toasts are
//! rendered as a banner inside the returned page.

use crate::forms::FieldErrors;
use crate::services::clinic::ClinicRow;
use crate::services::session::SessionUser;

const LAYOUT_TEMPLATE: &str = include_str!("../../templates/layout.html");
const AUTHENTICATION_TEMPLATE: &str = include_str!("../../templates/authentication.html");
const DASHBOARD_TEMPLATE: &str = include_str!("../../templates/dashboard.html");
const CLINIC_FORM_TEMPLATE: &str = include_str!("../../templates/clinic_form.html");

pub const GOOGLE_SIGN_IN_LABEL: &str = "Entrar com Google";

// =============================================================================
// TOASTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

/// One-shot feedback message shown with a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: &'static str,
}

impl Toast {
    #[must_use]
    pub fn success(message: &'static str) -> Self {
        Self { kind: ToastKind::Success, message }
    }

    #[must_use]
    pub fn error(message: &'static str) -> Self {
        Self { kind: ToastKind::Error, message }
    }

    fn render(self) -> String {
        let (class, role) = match self.kind {
            ToastKind::Success => ("toast toast-success", "status"),
            ToastKind::Error => ("toast toast-error", "alert"),
        };
        format!(r#"<div class="{class}" role="{role}">{}</div>"#, escape_html(self.message))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn field_error(errors: &FieldErrors, field: &str) -> String {
    errors
        .get(field)
        .map(|msg| format!(r#"<p class="field-error" role="alert">{}</p>"#, escape_html(msg)))
        .unwrap_or_default()
}

fn invalid_attr(errors: &FieldErrors, field: &str) -> &'static str {
    if errors.get(field).is_some() { r#" aria-invalid="true""# } else { "" }
}

/// Fill `{{NAME}}` placeholders from `values` in one pass over `template`.
///
/// Unknown placeholders are kept verbatim.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };
        let key = &after[..end];
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn layout(title: &str, body: &str, toast: Option<Toast>) -> String {
    let toast = toast.map(Toast::render).unwrap_or_default();
    fill(LAYOUT_TEMPLATE, &[("TITLE", &escape_html(title)), ("TOAST", &toast), ("BODY", body)])
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// Values echoed back into the sign-up card. The password is never echoed.
#[derive(Debug, Clone, Default)]
pub struct SignUpView {
    pub name: String,
    pub email: String,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, Default)]
pub struct SignInView {
    pub email: String,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, Default)]
pub struct AuthenticationPage {
    pub sign_up: SignUpView,
    pub sign_in: SignInView,
    pub toast: Option<Toast>,
    pub google_enabled: bool,
}

#[must_use]
pub fn render_authentication(page: &AuthenticationPage) -> String {
    let up = &page.sign_up;
    let inn = &page.sign_in;
    let google = if page.google_enabled {
        format!(r#"<a class="button button-outline" href="/api/auth/sign-in/google">{GOOGLE_SIGN_IN_LABEL}</a>"#)
    } else {
        String::new()
    };

    let body = fill(
        AUTHENTICATION_TEMPLATE,
        &[
            ("SIGN_UP_NAME", &escape_html(&up.name)),
            ("SIGN_UP_NAME_INVALID", invalid_attr(&up.errors, "name")),
            ("SIGN_UP_NAME_ERROR", &field_error(&up.errors, "name")),
            ("SIGN_UP_EMAIL", &escape_html(&up.email)),
            ("SIGN_UP_EMAIL_INVALID", invalid_attr(&up.errors, "email")),
            ("SIGN_UP_EMAIL_ERROR", &field_error(&up.errors, "email")),
            ("SIGN_UP_PASSWORD_INVALID", invalid_attr(&up.errors, "password")),
            ("SIGN_UP_PASSWORD_ERROR", &field_error(&up.errors, "password")),
            ("SIGN_IN_EMAIL", &escape_html(&inn.email)),
            ("SIGN_IN_EMAIL_INVALID", invalid_attr(&inn.errors, "email")),
            ("SIGN_IN_EMAIL_ERROR", &field_error(&inn.errors, "email")),
            ("SIGN_IN_PASSWORD_INVALID", invalid_attr(&inn.errors, "password")),
            ("SIGN_IN_PASSWORD_ERROR", &field_error(&inn.errors, "password")),
            ("GOOGLE_BUTTON", &google),
        ],
    );

    layout("Autenticação", &body, page.toast)
}

// =============================================================================
// DASHBOARD
// =============================================================================

#[must_use]
pub fn render_dashboard(user: &SessionUser, clinic: Option<&ClinicRow>) -> String {
    let clinic_html = clinic
        .map(|c| format!(r#"<p class="clinic-name">{}</p>"#, escape_html(&c.name)))
        .unwrap_or_default();
    let body = fill(
        DASHBOARD_TEMPLATE,
        &[
            ("USER_NAME", &escape_html(&user.name)),
            ("USER_EMAIL", &escape_html(&user.email)),
            ("CLINIC", &clinic_html),
        ],
    );
    layout("Dashboard", &body, None)
}

// =============================================================================
// CLINIC FORM
// =============================================================================

#[must_use]
pub fn render_clinic_form(name: &str, errors: &FieldErrors, toast: Option<Toast>) -> String {
    let body = fill(
        CLINIC_FORM_TEMPLATE,
        &[
            ("CLINIC_NAME", &escape_html(name)),
            ("CLINIC_NAME_INVALID", invalid_attr(errors, "name")),
            ("CLINIC_NAME_ERROR", &field_error(errors, "name")),
        ],
    );
    layout("Adicionar clínica", &body, toast)
}

#[cfg(test)]
#[path = "views_test.rs"]
mod tests;

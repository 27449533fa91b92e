//! Form schemas for the sign-up, sign-in and clinic forms.
//!
//! DESIGN
//! ======
//! Each form deserializes from `application/x-www-form-urlencoded` with every
//! field optional-by-default (missing == empty) and exposes `validate()`,
//! which returns either the cleaned input or field-level messages. Handlers
//! only call into services with a validated value, so an invalid form never
//! reaches registration or the clinic action.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NAME_MIN_CHARS: usize = 2;
pub const PASSWORD_MIN_CHARS: usize = 8;

pub const MSG_NAME_REQUIRED: &str = "Nome é obrigatório";
pub const MSG_EMAIL_INVALID: &str = "Formato de email inválido";
pub const MSG_PASSWORD_TOO_SHORT: &str = "A senha deve ter no mínimo 8 caracteres";
pub const MSG_PASSWORD_REQUIRED: &str = "A senha é obrigatória";
pub const MSG_CLINIC_NAME_REQUIRED: &str = "O nome é obrigatório";

/// Length the way browsers measure `String.length`: UTF-16 code units.
pub(crate) fn text_len(value: &str) -> usize {
    value.encode_utf16().count()
}

// =============================================================================
// FIELD ERRORS
// =============================================================================

/// Field name -> message. Ordered so rendering and JSON output are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, &'static str>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: &'static str) {
        self.0.entry(field).or_insert(message);
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

// =============================================================================
// SIGN-UP
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignUpForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Validated sign-up input. Name and password are trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignUpForm {
    /// # Errors
    ///
    /// Returns every failing field with its message.
    pub fn validate(&self) -> Result<SignUpInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = self.name.trim();
        if text_len(name) < NAME_MIN_CHARS {
            errors.add("name", MSG_NAME_REQUIRED);
        }
        if !is_valid_email(&self.email) {
            errors.add("email", MSG_EMAIL_INVALID);
        }
        let password = self.password.trim();
        if text_len(password) < PASSWORD_MIN_CHARS {
            errors.add("password", MSG_PASSWORD_TOO_SHORT);
        }

        errors.into_result(SignUpInput {
            name: name.to_owned(),
            email: self.email.clone(),
            password: password.to_owned(),
        })
    }
}

// =============================================================================
// SIGN-IN
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    /// # Errors
    ///
    /// Returns every failing field with its message.
    pub fn validate(&self) -> Result<SignInInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        if !is_valid_email(&self.email) {
            errors.add("email", MSG_EMAIL_INVALID);
        }
        if self.password.is_empty() {
            errors.add("password", MSG_PASSWORD_REQUIRED);
        }
        errors.into_result(SignInInput { email: self.email.clone(), password: self.password.clone() })
    }
}

// =============================================================================
// CLINIC
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClinicForm {
    pub name: String,
}

impl ClinicForm {
    /// Returns the trimmed clinic name.
    ///
    /// # Errors
    ///
    /// Returns the `name` field error when the trimmed name is too short.
    pub fn validate(&self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = self.name.trim();
        if text_len(name) < NAME_MIN_CHARS {
            errors.add("name", MSG_CLINIC_NAME_REQUIRED);
        }
        errors.into_result(name.to_owned())
    }
}

// =============================================================================
// EMAIL SHAPE
// =============================================================================

fn is_local_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '+' | '-' | '.')
}

fn is_local_last_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')
}

fn is_domain_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => chars.all(|c| c.is_ascii_alphanumeric() || c == '-'),
        _ => false,
    }
}

/// Practical address check: `local@label.label.tld`.
///
/// Rejects leading dots, consecutive dots, whitespace, quoted local parts and
/// IP-literal domains. The TLD must be at least two ASCII letters.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.contains("..") {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if domain.contains('@') || local.starts_with('.') {
        return false;
    }
    match local.chars().last() {
        Some(last) if is_local_last_char(last) => {}
        _ => return false,
    }
    if !local.chars().all(is_local_char) {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let Some((tld, hosts)) = labels.split_last() else {
        return false;
    };
    !hosts.is_empty()
        && hosts.iter().all(|label| is_domain_label(label))
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
#[path = "forms_test.rs"]
mod tests;

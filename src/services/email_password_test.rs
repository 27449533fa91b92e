use super::*;

// =============================================================================
// normalize_email
// =============================================================================

#[test]
fn normalize_email_trims_and_lowercases() {
    assert_eq!(normalize_email("  Ana@Clinica.COM "), Some("ana@clinica.com".to_owned()));
}

#[test]
fn normalize_email_rejects_invalid_values() {
    assert_eq!(normalize_email(""), None);
    assert_eq!(normalize_email("ana"), None);
    assert_eq!(normalize_email("@clinica.com"), None);
    assert_eq!(normalize_email("ana@"), None);
    assert_eq!(normalize_email("a@b@c.com"), None);
}

// =============================================================================
// check_password_length
// =============================================================================

#[test]
fn password_length_bounds() {
    assert!(matches!(check_password_length("1234567"), Err(EmailAuthError::PasswordTooShort)));
    assert!(check_password_length("12345678").is_ok());
    assert!(check_password_length(&"x".repeat(PASSWORD_MAX_CHARS)).is_ok());
    assert!(matches!(
        check_password_length(&"x".repeat(PASSWORD_MAX_CHARS + 1)),
        Err(EmailAuthError::PasswordTooLong)
    ));
}

// =============================================================================
// ErrorCode
// =============================================================================

#[test]
fn duplicate_email_code_and_status() {
    let err = EmailAuthError::UserAlreadyExists;
    assert_eq!(err.error_code(), "USER_ALREADY_EXISTS_USE_ANOTHER_EMAIL");
    assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn invalid_credentials_code_and_status() {
    let err = EmailAuthError::InvalidCredentials;
    assert_eq!(err.error_code(), "INVALID_EMAIL_OR_PASSWORD");
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn database_errors_are_internal() {
    let err = EmailAuthError::Db(sqlx::Error::RowNotFound);
    assert_eq!(err.error_code(), INTERNAL_SERVER_ERROR);
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn validation_errors_are_bad_request() {
    for err in [
        EmailAuthError::InvalidEmail,
        EmailAuthError::InvalidName,
        EmailAuthError::PasswordTooShort,
        EmailAuthError::PasswordTooLong,
    ] {
        assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{err}");
    }
}

#[test]
fn auth_user_record_serializes_camel_case() {
    let user = AuthUserRecord {
        id: Uuid::nil(),
        name: "Ana".into(),
        email: "ana@clinica.com".into(),
        email_verified: true,
        image: None,
    };
    let json = serde_json::to_value(user).unwrap();
    assert_eq!(json["emailVerified"], serde_json::json!(true));
}

// =============================================================================
// Live database
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::services::test_support::{integration_pool, unique_email};

    fn sign_up_req(email: &str) -> SignUpRequest {
        SignUpRequest { name: "Ana Souza".into(), email: email.into(), password: "segredo123".into() }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn sign_up_then_sign_in() {
        let pool = integration_pool().await;
        let policy = SessionPolicy::default();
        let meta = SessionMeta::default();

        let email = unique_email("flow");
        let signed_up = sign_up_email(&pool, &policy, &sign_up_req(&email.to_uppercase()), &meta)
            .await
            .unwrap();
        assert_eq!(signed_up.user.email, email);
        assert_eq!(signed_up.session.token.len(), 64);

        let signed_in = sign_in_email(
            &pool,
            &policy,
            &SignInRequest { email: email.clone(), password: "segredo123".into() },
            &meta,
        )
        .await
        .unwrap();
        assert_eq!(signed_in.user.id, signed_up.user.id);
        assert_ne!(signed_in.session.token, signed_up.session.token);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn duplicate_email_is_rejected() {
        let pool = integration_pool().await;
        let policy = SessionPolicy::default();
        let meta = SessionMeta::default();

        let email = unique_email("dup");
        sign_up_email(&pool, &policy, &sign_up_req(&email), &meta)
            .await
            .unwrap();
        let err = sign_up_email(&pool, &policy, &sign_up_req(&email.to_uppercase()), &meta)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), CODE_USER_ALREADY_EXISTS);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn wrong_password_is_invalid_credentials() {
        let pool = integration_pool().await;
        let policy = SessionPolicy::default();
        let meta = SessionMeta::default();

        let email = unique_email("wrongpw");
        sign_up_email(&pool, &policy, &sign_up_req(&email), &meta)
            .await
            .unwrap();
        let err = sign_in_email(
            &pool,
            &policy,
            &SignInRequest { email, password: "segredo999".into() },
            &meta,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EmailAuthError::InvalidCredentials));
    }
}

use super::*;

fn config() -> GoogleConfig {
    GoogleConfig::new("my_client_id", "secret", "http://localhost:3000/")
}

// =============================================================================
// GoogleConfig::from_env: env manipulation requires unsafe in edition 2024.
// The variables are process-global, so this is the only test that sets them.
// =============================================================================

#[test]
fn from_env_requires_both_variables() {
    unsafe {
        std::env::remove_var("GOOGLE_CLIENT_ID");
        std::env::remove_var("GOOGLE_CLIENT_SECRET");
    }
    assert!(GoogleConfig::from_env("http://localhost:3000").is_none());

    unsafe { std::env::set_var("GOOGLE_CLIENT_ID", "id123") };
    assert!(GoogleConfig::from_env("http://localhost:3000").is_none());

    unsafe { std::env::set_var("GOOGLE_CLIENT_SECRET", "") };
    assert!(GoogleConfig::from_env("http://localhost:3000").is_none());

    unsafe { std::env::set_var("GOOGLE_CLIENT_SECRET", "secret456") };
    let config = GoogleConfig::from_env("https://clinics.example.com").unwrap();
    assert_eq!(config.client_id, "id123");
    assert_eq!(config.client_secret, "secret456");
    assert_eq!(config.redirect_uri, "https://clinics.example.com/api/auth/callback/google");

    unsafe {
        std::env::remove_var("GOOGLE_CLIENT_ID");
        std::env::remove_var("GOOGLE_CLIENT_SECRET");
    }
}

#[test]
fn new_strips_trailing_slash_from_base() {
    assert_eq!(config().redirect_uri, "http://localhost:3000/api/auth/callback/google");
}

// =============================================================================
// authorize_url
// =============================================================================

#[test]
fn authorize_url_starts_with_google() {
    let url = config().authorize_url("st").unwrap();
    assert!(url.starts_with(GOOGLE_AUTHORIZE_URL));
}

#[test]
fn authorize_url_contains_client_and_state() {
    let url = config().authorize_url("csrf_token_abc").unwrap();
    assert!(url.contains("client_id=my_client_id"));
    assert!(url.contains("state=csrf_token_abc"));
    assert!(url.contains("response_type=code"));
}

#[test]
fn authorize_url_requests_account_chooser_popup() {
    let url = config().authorize_url("st").unwrap();
    assert!(url.contains("prompt=select_account"));
    assert!(url.contains("display=popup"));
}

#[test]
fn authorize_url_encodes_redirect_and_scope() {
    let url = config().authorize_url("st").unwrap();
    assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fapi%2Fauth%2Fcallback%2Fgoogle"));
    assert!(url.contains("scope=openid+email+profile"));
}

// =============================================================================
// states_match
// =============================================================================

#[test]
fn states_match_requires_equal_non_empty_values() {
    assert!(states_match(Some("abc"), Some("abc")));
    assert!(!states_match(Some("abc"), Some("abd")));
    assert!(!states_match(Some(""), Some("")));
    assert!(!states_match(None, Some("abc")));
    assert!(!states_match(Some("abc"), None));
}

#[test]
fn state_identifier_is_namespaced() {
    assert_eq!(state_identifier("xyz"), "oauth-state:xyz");
}

// =============================================================================
// Profile / tokens
// =============================================================================

#[test]
fn google_user_deserializes_userinfo() {
    let json = r#"{"sub":"1081","email":"ana@gmail.com","email_verified":true,"name":"Ana","picture":"https://x/y.png"}"#;
    let user: GoogleUser = serde_json::from_str(json).unwrap();
    assert_eq!(user.sub, "1081");
    assert!(user.email_verified);
    assert_eq!(user.display_name(), "Ana");
}

#[test]
fn google_user_defaults_unverified_and_name_from_email() {
    let json = r#"{"sub":"1081","email":"ana.souza@gmail.com"}"#;
    let user: GoogleUser = serde_json::from_str(json).unwrap();
    assert!(!user.email_verified);
    assert_eq!(user.display_name(), "ana.souza");
}

#[test]
fn google_user_without_name_or_email_is_user() {
    let user: GoogleUser = serde_json::from_str(r#"{"sub":"1"}"#).unwrap();
    assert_eq!(user.display_name(), "user");
}

#[test]
fn token_expiry_is_in_the_future() {
    let tokens: GoogleTokens =
        serde_json::from_str(r#"{"access_token":"at","expires_in":3599,"scope":"openid"}"#).unwrap();
    let expiry = token_expiry(&tokens).unwrap();
    assert!(expiry > OffsetDateTime::now_utc());
    assert!(tokens.refresh_token.is_none());
}

#[test]
fn token_expiry_out_of_range_is_none() {
    let tokens: GoogleTokens =
        serde_json::from_str(&format!(r#"{{"access_token":"at","expires_in":{}}}"#, i64::MAX)).unwrap();
    assert!(token_expiry(&tokens).is_none());

    let tokens: GoogleTokens = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
    assert!(token_expiry(&tokens).is_none());
}

// =============================================================================
// OAuthError
// =============================================================================

#[test]
fn oauth_error_statuses() {
    assert_eq!(OAuthError::NotConfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(OAuthError::InvalidState.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(OAuthError::TokenExchange("x".into()).status(), StatusCode::BAD_GATEWAY);
    assert_eq!(OAuthError::AccountNotLinked.error_code(), "ACCOUNT_NOT_LINKED");
}

#[test]
fn oauth_error_display_includes_detail() {
    let msg = OAuthError::GoogleApi("403 Forbidden".into()).to_string();
    assert!(msg.contains("google api"));
    assert!(msg.contains("403 Forbidden"));
}

// =============================================================================
// Live database
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::services::test_support::{integration_pool, unique_email};

    fn tokens() -> GoogleTokens {
        GoogleTokens {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            id_token: None,
            expires_in: Some(3600),
            scope: Some(GOOGLE_SCOPES.into()),
        }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn state_is_single_use() {
        let pool = integration_pool().await;
        let state = create_state(&pool).await.unwrap();
        consume_state(&pool, &state).await.unwrap();
        assert!(matches!(consume_state(&pool, &state).await, Err(OAuthError::InvalidState)));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn upsert_is_stable_per_subject() {
        let pool = integration_pool().await;
        let profile = GoogleUser {
            sub: Uuid::new_v4().to_string(),
            email: Some(unique_email("google")),
            email_verified: true,
            name: Some("Ana".into()),
            picture: None,
        };
        let first = upsert_google_user(&pool, &profile, &tokens()).await.unwrap();
        let second = upsert_google_user(&pool, &profile, &tokens()).await.unwrap();
        assert_eq!(first, second);
    }
}

use super::*;

#[tokio::test]
async fn hash_then_verify_matches() {
    let hash = hash_password("segredo123").await.unwrap();
    assert!(hash.starts_with("$argon2id$"));
    assert!(verify_password("segredo123", &hash).await.unwrap());
}

#[tokio::test]
async fn wrong_password_does_not_verify() {
    let hash = hash_password("segredo123").await.unwrap();
    assert!(!verify_password("segredo124", &hash).await.unwrap());
}

#[tokio::test]
async fn same_password_gets_distinct_salts() {
    let a = hash_password("segredo123").await.unwrap();
    let b = hash_password("segredo123").await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn malformed_hash_is_an_error() {
    let err = verify_password("segredo123", "not-a-phc-string").await.unwrap_err();
    assert!(matches!(err, PasswordError::MalformedHash(_)));
}

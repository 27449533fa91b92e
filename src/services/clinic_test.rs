use super::*;

fn user() -> SessionUser {
    SessionUser {
        id: Uuid::nil(),
        name: "Ana".into(),
        email: "ana@clinica.com".into(),
        email_verified: false,
        image: None,
        clinic: None,
    }
}

// =============================================================================
// AccessGate
// =============================================================================

#[test]
fn gate_without_session_requires_authentication() {
    assert_eq!(AccessGate::evaluate(None, 0), AccessGate::Authenticate);
    assert_eq!(AccessGate::evaluate(None, 3), AccessGate::Authenticate);
    assert_eq!(AccessGate::Authenticate.redirect_to(), Some("/authentication"));
}

#[test]
fn gate_without_clinics_requires_clinic_form() {
    let user = user();
    assert_eq!(AccessGate::evaluate(Some(&user), 0), AccessGate::CreateClinic);
    assert_eq!(AccessGate::CreateClinic.redirect_to(), Some("/clinic-form"));
}

#[test]
fn gate_with_clinics_is_granted() {
    let user = user();
    assert_eq!(AccessGate::evaluate(Some(&user), 1), AccessGate::Granted);
    assert_eq!(AccessGate::evaluate(Some(&user), 7), AccessGate::Granted);
    assert_eq!(AccessGate::Granted.redirect_to(), None);
}

// =============================================================================
// ActionOutcome
// =============================================================================

#[test]
fn first_clinic_redirects_to_dashboard() {
    assert_eq!(outcome_for(0), ActionOutcome::Redirect("/dashboard"));
    assert_eq!(outcome_for(0).redirect_target(), Some("/dashboard"));
}

#[test]
fn later_clinics_complete_in_place() {
    assert_eq!(outcome_for(1), ActionOutcome::Completed);
    assert_eq!(outcome_for(5).redirect_target(), None);
}

#[test]
fn clinic_error_codes() {
    let err = ClinicError::UserNotFound(Uuid::nil());
    assert_eq!(err.error_code(), "USER_NOT_FOUND");
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    let err = ClinicError::Database(sqlx::Error::PoolTimedOut);
    assert_eq!(err.error_code(), INTERNAL_SERVER_ERROR);
}

// =============================================================================
// Live database
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::services::test_support::{insert_user, integration_pool, unique_email};

    async fn association_count(pool: &PgPool, user_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT count(*) FROM users_to_clinics WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn each_submit_creates_exactly_one_association() {
        let pool = integration_pool().await;
        let user_id = insert_user(&pool, &unique_email("clinic-one")).await;

        let first = create_clinic(&pool, user_id, "Clínica Vida").await.unwrap();
        assert_eq!(first.outcome, ActionOutcome::Redirect(DASHBOARD_PATH));
        assert_eq!(association_count(&pool, user_id).await, 1);

        let second = create_clinic(&pool, user_id, "Clínica Vida").await.unwrap();
        assert_eq!(second.outcome, ActionOutcome::Completed);
        assert_ne!(first.clinic.id, second.clinic.id);
        assert_eq!(association_count(&pool, user_id).await, 2);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn list_is_ordered_by_association() {
        let pool = integration_pool().await;
        let user_id = insert_user(&pool, &unique_email("clinic-order")).await;
        create_clinic(&pool, user_id, "Primeira").await.unwrap();
        create_clinic(&pool, user_id, "Segunda").await.unwrap();

        let names: Vec<String> = list_user_clinics(&pool, user_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Primeira", "Segunda"]);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn unknown_user_is_rejected() {
        let pool = integration_pool().await;
        let err = create_clinic(&pool, Uuid::new_v4(), "Fantasma").await.unwrap_err();
        assert!(matches!(err, ClinicError::UserNotFound(_)));
    }
}

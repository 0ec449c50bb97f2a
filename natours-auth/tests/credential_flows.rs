//! End-to-end credential flows over the in-memory and SQLite stores

use chrono::Duration;
use futures::future::join_all;
use natours_auth::{
    hash_reset_secret, AuthError, CredentialService, Credentials, ErrorKind, MemoryNotifier,
    MemoryPrincipalStore, Signup, SqlitePrincipalStore, UnauthenticatedReason,
};
use natours_core::{
    AuthConfig, Email, HasherConfig, ManualClock, PrincipalStore, Projection, Role, SaveCondition,
};
use std::sync::Arc;

const SECRET: &str = "integration-secret-0123456789abcdef";

struct Harness {
    service: Arc<CredentialService>,
    store: Arc<dyn PrincipalStore>,
    notifier: MemoryNotifier,
    clock: ManualClock,
}

impl Harness {
    fn with_store(store: Arc<dyn PrincipalStore>) -> Self {
        let mut config = AuthConfig::with_secret(SECRET);
        config.hasher = HasherConfig::insecure_fast();
        let notifier = MemoryNotifier::new();
        let clock = ManualClock::default();

        let service = CredentialService::new(
            &config,
            store.clone(),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
        )
        .unwrap()
        .with_public_url("https://natours.test");

        Self {
            service: Arc::new(service),
            store,
            notifier,
            clock,
        }
    }

    fn new() -> Self {
        Self::with_store(Arc::new(MemoryPrincipalStore::new()))
    }

    async fn signup(&self, email: &str, password: &str) -> natours_auth::IssuedToken {
        self.service
            .signup(Signup {
                name: "Test User".to_string(),
                email: email.to_string(),
                password: password.to_string(),
                password_confirm: password.to_string(),
            })
            .await
            .unwrap()
    }

    /// Secret from the most recent reset notification
    fn last_secret(&self) -> String {
        let body = self.notifier.last().expect("no notification sent").body;
        body.split("/resetPassword/")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .expect("no reset link in notification")
            .to_string()
    }

    async fn authenticate(&self, token: &str) -> Result<natours_core::Principal, AuthError> {
        let header = format!("Bearer {}", token);
        self.service.protect(Credentials::bearer(&header)).await
    }
}

fn unauthenticated(err: AuthError) -> UnauthenticatedReason {
    match err {
        AuthError::Unauthenticated(reason) => reason,
        other => panic!("expected Unauthenticated, got {:?}", other),
    }
}

#[tokio::test]
async fn signup_stores_a_verifiable_digest() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;

    assert_eq!(issued.principal.role(), Role::Regular);
    assert!(issued.principal.password_hash().is_none());

    let email = Email::parse("a@x.com").unwrap();
    let stored = h
        .store
        .find_by_email(&email, Projection::WithPasswordHash)
        .await
        .unwrap()
        .unwrap();
    let digest = stored.password_hash().unwrap();
    assert_ne!(digest.as_str(), "Secret123");
    assert!(h.service.hasher().verify("Secret123", digest));
    assert!(stored.password_changed_at().is_none());

    let verified = h.service.codec().verify(&issued.token).unwrap();
    assert_eq!(verified.principal_id, issued.principal.id());
}

#[tokio::test]
async fn signup_rejects_mismatched_confirmation() {
    let h = Harness::new();
    let err = h
        .service
        .signup(Signup {
            name: "Test User".to_string(),
            email: "a@x.com".to_string(),
            password: "Secret123".to_string(),
            password_confirm: "Mismatch".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h
        .store
        .find_by_email(&Email::parse("a@x.com").unwrap(), Projection::Default)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn signup_with_taken_email_conflicts() {
    let h = Harness::new();
    h.signup("a@x.com", "Secret123").await;

    let err = h
        .service
        .signup(Signup {
            name: "Other".to_string(),
            email: " A@X.com ".to_string(),
            password: "Secret456".to_string(),
            password_confirm: "Secret456".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn login_issues_token_for_the_principal() {
    let h = Harness::new();
    let signed_up = h.signup("a@x.com", "Secret123").await;

    let issued = h.service.login("A@x.com", "Secret123").await.unwrap();
    let verified = h.service.codec().verify(&issued.token).unwrap();
    assert_eq!(verified.principal_id, signed_up.principal.id());

    let admitted = h.authenticate(&issued.token).await.unwrap();
    assert_eq!(admitted.id(), signed_up.principal.id());
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let h = Harness::new();
    h.signup("a@x.com", "Secret123").await;

    let wrong_password = h.service.login("a@x.com", "Wrong1234").await.unwrap_err();
    let unknown_email = h
        .service
        .login("nobody@x.com", "Secret123")
        .await
        .unwrap_err();
    let malformed_email = h.service.login("not-an-email", "Secret123").await.unwrap_err();

    for err in [&wrong_password, &unknown_email, &malformed_email] {
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
        assert_eq!(err.to_string(), "Incorrect email or password");
    }
}

#[tokio::test]
async fn password_update_revokes_older_tokens() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;
    let principal = h.authenticate(&issued.token).await.unwrap();

    h.clock.advance(Duration::seconds(2));
    let renewed = h
        .service
        .update_password(&principal, "Secret123", "NewPass12", "NewPass12")
        .await
        .unwrap();

    let err = h.authenticate(&issued.token).await.unwrap_err();
    assert_eq!(unauthenticated(err), UnauthenticatedReason::PasswordChanged);
    assert!(h.authenticate(&renewed.token).await.is_ok());

    assert!(h.service.login("a@x.com", "NewPass12").await.is_ok());
    assert_eq!(
        h.service
            .login("a@x.com", "Secret123")
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidCredentials
    );
}

#[tokio::test]
async fn password_update_checks_current_and_rejects_no_op() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;
    let principal = h.authenticate(&issued.token).await.unwrap();

    let wrong = h
        .service
        .update_password(&principal, "Nope12345", "NewPass12", "NewPass12")
        .await
        .unwrap_err();
    assert_eq!(wrong.kind(), ErrorKind::InvalidCredentials);

    let same = h
        .service
        .update_password(&principal, "Secret123", "Secret123", "Secret123")
        .await
        .unwrap_err();
    assert_eq!(same.kind(), ErrorKind::NoOpChange);

    let weak = h
        .service
        .update_password(&principal, "Secret123", "short", "short")
        .await
        .unwrap_err();
    assert_eq!(weak.kind(), ErrorKind::Validation);

    // Nothing above touched the token
    assert!(h.authenticate(&issued.token).await.is_ok());
}

#[tokio::test]
async fn reset_flow_round_trip() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;

    h.service.forgot_password("a@x.com").await.unwrap();
    let secret = h.last_secret();

    let pending = h
        .store
        .find_by_reset_hash(&hash_reset_secret(&secret))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.id(), issued.principal.id());

    h.clock.advance(Duration::seconds(2));
    let reset = h
        .service
        .reset_password(&secret, "NewPass1", "NewPass1")
        .await
        .unwrap();
    assert!(h.authenticate(&reset.token).await.is_ok());

    let stored = h
        .store
        .find_by_id(&issued.principal.id(), Projection::WithPasswordHash)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.reset().is_none());
    assert!(stored.password_changed_at().is_some());
    assert!(h
        .service
        .hasher()
        .verify("NewPass1", stored.password_hash().unwrap()));

    let again = h
        .service
        .reset_password(&secret, "OtherPass1", "OtherPass1")
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidOrExpired);

    let err = h.authenticate(&issued.token).await.unwrap_err();
    assert_eq!(unauthenticated(err), UnauthenticatedReason::PasswordChanged);
}

#[tokio::test]
async fn later_begin_supersedes_earlier_secret() {
    let h = Harness::new();
    h.signup("a@x.com", "Secret123").await;

    h.service.forgot_password("a@x.com").await.unwrap();
    let first = h.last_secret();
    h.service.forgot_password("a@x.com").await.unwrap();
    let second = h.last_secret();
    assert_ne!(first, second);

    let err = h
        .service
        .reset_password(&first, "NewPass1", "NewPass1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOrExpired);

    assert!(h
        .service
        .reset_password(&second, "NewPass1", "NewPass1")
        .await
        .is_ok());
}

#[tokio::test]
async fn expired_and_wrong_secrets_fail_the_same_way() {
    let h = Harness::new();
    h.signup("a@x.com", "Secret123").await;
    h.service.forgot_password("a@x.com").await.unwrap();
    let secret = h.last_secret();

    let wrong = h
        .service
        .reset_password("0000", "NewPass1", "NewPass1")
        .await
        .unwrap_err();

    h.clock.advance(Duration::minutes(15) + Duration::seconds(1));
    let expired = h
        .service
        .reset_password(&secret, "NewPass1", "NewPass1")
        .await
        .unwrap_err();

    assert_eq!(wrong.kind(), ErrorKind::InvalidOrExpired);
    assert_eq!(expired.kind(), ErrorKind::InvalidOrExpired);
    assert_eq!(wrong.to_string(), expired.to_string());
    assert_eq!(wrong.to_string(), "Token is invalid or has expired");
}

#[tokio::test]
async fn concurrent_consumers_have_one_winner() {
    let h = Harness::new();
    h.signup("a@x.com", "Secret123").await;
    h.service.forgot_password("a@x.com").await.unwrap();
    let secret = h.last_secret();

    let attempts = (0..8).map(|i| {
        let service = h.service.clone();
        let secret = secret.clone();
        tokio::spawn(async move {
            let password = format!("NewPass{}", i);
            service.reset_password(&secret, &password, &password).await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::InvalidOrExpired);
    }
}

#[tokio::test]
async fn failed_delivery_rolls_back_reset_state() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;
    h.notifier.set_failing(true);

    let err = h.service.forgot_password("a@x.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyFailure);

    let stored = h
        .store
        .find_by_id(&issued.principal.id(), Projection::Default)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.reset().is_none());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn forgot_password_for_unknown_email_sends_nothing() {
    let h = Harness::new();
    h.service.forgot_password("nobody@x.com").await.unwrap();
    assert!(h.notifier.sent().is_empty());

    let err = h.service.forgot_password("not-an-email").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn deleted_principal_loses_its_tokens() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;

    // Same signing key, but a store that no longer holds the account
    let other = Harness::with_store(Arc::new(MemoryPrincipalStore::new()));
    let err = other.authenticate(&issued.token).await.unwrap_err();
    assert_eq!(unauthenticated(err), UnauthenticatedReason::PrincipalGone);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;

    h.clock.advance(h.service.token_lifetime());
    let err = h.authenticate(&issued.token).await.unwrap_err();
    assert_eq!(unauthenticated(err), UnauthenticatedReason::ExpiredToken);
}

#[tokio::test]
async fn restrict_to_follows_role() {
    let h = Harness::new();
    let issued = h.signup("a@x.com", "Secret123").await;
    let mut principal = h.authenticate(&issued.token).await.unwrap();

    let staff = [Role::Admin, Role::Operator];
    assert_eq!(
        h.service
            .restrict_to(&principal, &staff)
            .unwrap_err()
            .kind(),
        ErrorKind::Forbidden
    );

    principal.set_role(Role::Admin);
    h.store
        .save(&principal, SaveCondition::Always)
        .await
        .unwrap();
    let reloaded = h.authenticate(&issued.token).await.unwrap();
    assert!(h.service.restrict_to(&reloaded, &staff).is_ok());
}

#[tokio::test]
async fn sqlite_store_supports_the_full_flow() {
    let store = Arc::new(SqlitePrincipalStore::connect("sqlite::memory:").await.unwrap());
    let h = Harness::with_store(store);
    let issued = h.signup("a@x.com", "Secret123").await;

    h.service.forgot_password("a@x.com").await.unwrap();
    let secret = h.last_secret();

    h.clock.advance(Duration::seconds(2));
    let reset = h
        .service
        .reset_password(&secret, "NewPass1", "NewPass1")
        .await
        .unwrap();
    assert!(h
        .service
        .reset_password(&secret, "NewPass2", "NewPass2")
        .await
        .is_err());

    assert!(h.authenticate(&reset.token).await.is_ok());
    assert_eq!(
        unauthenticated(h.authenticate(&issued.token).await.unwrap_err()),
        UnauthenticatedReason::PasswordChanged
    );
    assert!(h.service.login("a@x.com", "NewPass1").await.is_ok());
}

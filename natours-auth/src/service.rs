//! Credential lifecycle operations
//!
//! [`CredentialService`] wires the hasher, token codec, reset manager and
//! access guard over a principal store and a notifier.

use crate::error::{AuthError, AuthResult, UnauthenticatedReason};
use crate::guard::{authorize, AccessGuard, Credentials};
use crate::hasher::SecretHasher;
use crate::reset::{ResetSecret, ResetTokenManager};
use crate::token::TokenCodec;
use chrono::{DateTime, Duration, Utc};
use natours_core::{
    AuthConfig, Clock, Email, NatoursResult, Notification, Notifier, Principal, PrincipalId,
    PrincipalStore, Projection, Role, SaveCondition, SaveOutcome,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Path under the public URL that receives reset secrets
pub const RESET_PATH: &str = "/api/v1/users/resetPassword";

/// Signup input
#[derive(Debug, Clone)]
pub struct Signup {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// A freshly issued bearer token and the principal it names
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Secret-free principal
    pub principal: Principal,
}

pub struct CredentialService {
    store: Arc<dyn PrincipalStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    hasher: SecretHasher,
    codec: Arc<TokenCodec>,
    resets: ResetTokenManager,
    guard: AccessGuard,
    min_password_length: usize,
    public_url: String,
}

impl CredentialService {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn PrincipalStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> NatoursResult<Self> {
        let hasher = SecretHasher::new(&config.hasher)?;
        let codec = Arc::new(TokenCodec::new(config, clock.clone()));
        let resets = ResetTokenManager::new(
            store.clone(),
            hasher.clone(),
            clock.clone(),
            config.reset_token_lifetime(),
        );
        let guard = AccessGuard::new(codec.clone(), store.clone());

        Ok(Self {
            store,
            notifier,
            clock,
            hasher,
            codec,
            resets,
            guard,
            min_password_length: config.min_password_length,
            public_url: "http://127.0.0.1:8080".to_string(),
        })
    }

    /// Base URL used in reset links
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn token_lifetime(&self) -> Duration {
        self.codec.lifetime()
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn resets(&self) -> &ResetTokenManager {
        &self.resets
    }

    #[instrument(skip_all, fields(email = %input.email.trim()))]
    pub async fn signup(&self, input: Signup) -> AuthResult<IssuedToken> {
        let email = Email::parse(&input.email)?;
        if input.name.trim().is_empty() {
            return Err(AuthError::validation("Please tell us your name", "name"));
        }
        self.check_new_password(&input.password, &input.password_confirm)?;

        let digest = self.hasher.hash_blocking(input.password).await?;
        let principal = Principal::new(&input.name, email, digest, self.clock.now())?;
        self.store.insert(&principal).await?;

        info!(principal_id = %principal.id(), "Principal signed up");
        self.issue(principal)
    }

    /// Unknown email and wrong password fail identically and cost one
    /// password verification each
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<IssuedToken> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation {
                message: "Please provide email and password".to_string(),
                field: None,
            });
        }

        let principal = match Email::parse(email) {
            Ok(email) => {
                self.store
                    .find_by_email(&email, Projection::WithPasswordHash)
                    .await?
            }
            Err(_) => None,
        };

        let digest = principal
            .as_ref()
            .and_then(|p| p.password_hash().cloned());
        let matched = self
            .hasher
            .verify_blocking(password.to_string(), digest)
            .await?;

        match principal {
            Some(principal) if matched => {
                info!(principal_id = %principal.id(), "Principal logged in");
                self.issue(principal)
            }
            _ => {
                debug!("Login rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Authenticate a request (`protect`)
    pub async fn protect(&self, credentials: Credentials<'_>) -> AuthResult<Principal> {
        self.guard.authenticate(credentials).await
    }

    /// Gate an authenticated principal on its role (`restrictTo`)
    pub fn restrict_to(&self, principal: &Principal, allowed: &[Role]) -> AuthResult<()> {
        authorize(principal, allowed)
    }

    /// Start a password reset and mail the secret (`forgotPassword`).
    /// Succeeds without sending anything when no principal has `email`.
    #[instrument(skip_all)]
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let email = Email::parse(email)?;
        let Some(principal) = self.store.find_by_email(&email, Projection::Default).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let secret = self.resets.begin(&principal).await?;
        let notification = self.reset_notification(&principal, &secret);

        if let Err(send_error) = self.notifier.send(notification).await {
            warn!(
                principal_id = %principal.id(),
                error = %send_error,
                "Reset notification failed, rolling back"
            );
            if let Err(rollback_error) = self.resets.rollback(&principal, &secret).await {
                error!(
                    principal_id = %principal.id(),
                    error = %rollback_error,
                    "Failed to roll back reset state"
                );
            }
            return Err(send_error.into());
        }

        Ok(())
    }

    /// Spend a reset secret and log the principal in (`resetPassword`)
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        secret: &str,
        password: &str,
        password_confirm: &str,
    ) -> AuthResult<IssuedToken> {
        self.check_new_password(password, password_confirm)?;
        let principal = self.resets.consume(secret, password).await?;
        self.issue(principal)
    }

    /// Change the password of an authenticated principal and hand back a
    /// token that survives the change
    #[instrument(skip_all, fields(principal_id = %principal.id()))]
    pub async fn update_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> AuthResult<IssuedToken> {
        self.check_new_password(new_password, new_password_confirm)?;

        let gone = || AuthError::Unauthenticated(UnauthenticatedReason::PrincipalGone);
        let mut current = self
            .store
            .find_by_id(&principal.id(), Projection::WithPasswordHash)
            .await?
            .ok_or_else(gone)?;

        let matched = self
            .hasher
            .verify_blocking(
                current_password.to_string(),
                current.password_hash().cloned(),
            )
            .await?;
        if !matched {
            return Err(AuthError::WrongCurrentPassword);
        }
        if new_password == current_password {
            return Err(AuthError::NoOpChange);
        }

        let digest = self.hasher.hash_blocking(new_password.to_string()).await?;
        current.replace_password(digest, self.clock.now());

        match self
            .store
            .save_credentials(&current, SaveCondition::Always)
            .await?
        {
            SaveOutcome::Saved => {
                info!("Password updated");
                self.issue(current.without_password_hash())
            }
            SaveOutcome::Stale => Err(gone()),
        }
    }

    /// Look up a principal by id, without its digest
    pub async fn principal(&self, id: &PrincipalId) -> AuthResult<Option<Principal>> {
        Ok(self.store.find_by_id(id, Projection::Default).await?)
    }

    fn issue(&self, principal: Principal) -> AuthResult<IssuedToken> {
        let token = self.codec.issue(principal.id())?;
        Ok(IssuedToken {
            token,
            expires_at: self.clock.now() + self.codec.lifetime(),
            principal: principal.without_password_hash(),
        })
    }

    fn check_new_password(&self, password: &str, confirm: &str) -> AuthResult<()> {
        if password.chars().count() < self.min_password_length {
            return Err(AuthError::validation(
                format!(
                    "Password must be at least {} characters long",
                    self.min_password_length
                ),
                "password",
            ));
        }
        if password != confirm {
            return Err(AuthError::validation(
                "Passwords are not the same",
                "passwordConfirm",
            ));
        }
        Ok(())
    }

    fn reset_notification(&self, principal: &Principal, secret: &ResetSecret) -> Notification {
        let url = format!("{}{}/{}", self.public_url, RESET_PATH, secret.expose());
        let minutes = self.resets.lifetime().num_minutes();

        Notification {
            to: principal.email().clone(),
            subject: format!("Your password reset token (valid for {} min)", minutes),
            body: format!(
                "Forgot your password? Submit a PATCH request with your new password and \
                 passwordConfirm to: {}\n\
                 If you didn't forget your password, please ignore this email!",
                url
            ),
        }
    }
}

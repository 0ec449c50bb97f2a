//! Slow, salted password hashing with argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use natours_core::{internal_error, HasherConfig, NatoursResult, PasswordDigest};
use tracing::warn;

/// Digest compared against when no principal matched, so that a miss costs
/// the same as a wrong password.
const DUMMY_PASSWORD: &str = "natours-dummy-password";

/// Stateless password hasher. Digests are PHC strings embedding their own
/// salt and cost, so older digests keep verifying after a cost change.
#[derive(Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
    dummy: PasswordDigest,
}

impl SecretHasher {
    pub fn new(config: &HasherConfig) -> NatoursResult<Self> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            None,
        )
        .map_err(|e| internal_error!(format!("Invalid argon2 parameters: {}", e), "hasher"))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy = hash_with(&argon2, DUMMY_PASSWORD)?;

        Ok(Self { argon2, dummy })
    }

    pub fn hash(&self, plaintext: &str) -> NatoursResult<PasswordDigest> {
        hash_with(&self.argon2, plaintext)
    }

    /// False for a wrong password and for an unreadable digest
    pub fn verify(&self, plaintext: &str, digest: &PasswordDigest) -> bool {
        let parsed = match PasswordHash::new(digest.as_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Stored password digest is not a valid PHC string");
                return false;
            }
        };

        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// [`Self::hash`] on the blocking thread pool
    pub async fn hash_blocking(&self, plaintext: String) -> NatoursResult<PasswordDigest> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| internal_error!("Password hashing task failed", "hasher", e))?
    }

    /// [`Self::verify`] on the blocking thread pool. With no digest the
    /// plaintext is checked against the dummy digest and the result is
    /// always false.
    pub async fn verify_blocking(
        &self,
        plaintext: String,
        digest: Option<PasswordDigest>,
    ) -> NatoursResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || match digest {
            Some(digest) => hasher.verify(&plaintext, &digest),
            None => {
                hasher.verify(&plaintext, &hasher.dummy);
                false
            }
        })
        .await
        .map_err(|e| internal_error!("Password verification task failed", "hasher", e))
    }
}

fn hash_with(argon2: &Argon2<'_>, plaintext: &str) -> NatoursResult<PasswordDigest> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| PasswordDigest::from_phc(hash.to_string()))
        .map_err(|e| internal_error!(format!("Failed to hash password: {}", e), "hasher"))
}

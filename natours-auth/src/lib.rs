//! Natours Auth - credential and access-control subsystem
//!
//! Password hashing, bearer tokens, password resets and request gating on
//! top of the collaborator contracts in `natours-core`.

pub mod error;
pub mod guard;
pub mod hasher;
pub mod notify;
pub mod reset;
pub mod service;
pub mod store;
pub mod token;

pub use error::{AuthError, AuthResult, ErrorKind, UnauthenticatedReason};
pub use guard::{authorize, AccessGuard, Credentials, TOKEN_COOKIE};
pub use hasher::SecretHasher;
pub use notify::{LogNotifier, MemoryNotifier};
pub use reset::{hash_reset_secret, ResetSecret, ResetTokenManager};
pub use service::{CredentialService, IssuedToken, Signup};
pub use store::MemoryPrincipalStore;
#[cfg(feature = "sqlite")]
pub use store::SqlitePrincipalStore;
pub use token::{Claims, TokenCodec, TokenError, VerifiedToken};

//! Typed results of the credential operations

use natours_core::NatoursError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Failure classes exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InvalidCredentials,
    InvalidOrExpired,
    Unauthenticated,
    Forbidden,
    NoOpChange,
    Conflict,
    DependencyFailure,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::InvalidOrExpired => "invalid_or_expired",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NoOpChange => "no_op_change",
            ErrorKind::Conflict => "conflict",
            ErrorKind::DependencyFailure => "dependency_failure",
        }
    }
}

/// Why a request could not be authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnauthenticatedReason {
    MissingToken,
    MalformedHeader,
    InvalidToken,
    ExpiredToken,
    PrincipalGone,
    PasswordChanged,
}

impl UnauthenticatedReason {
    pub fn message(&self) -> &'static str {
        match self {
            UnauthenticatedReason::MissingToken => {
                "You are not logged in! Please log in to get access."
            }
            UnauthenticatedReason::MalformedHeader => {
                "Authorization header must use the Bearer scheme."
            }
            UnauthenticatedReason::InvalidToken => "Invalid token. Please log in again!",
            UnauthenticatedReason::ExpiredToken => "Your token has expired! Please log in again.",
            UnauthenticatedReason::PrincipalGone => {
                "The user belonging to this token no longer exists."
            }
            UnauthenticatedReason::PasswordChanged => {
                "User recently changed password! Please log in again."
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Your current password is wrong")]
    WrongCurrentPassword,

    #[error("Token is invalid or has expired")]
    InvalidOrExpired,

    #[error("{}", .0.message())]
    Unauthenticated(UnauthenticatedReason),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("New password must differ from the current password")]
    NoOpChange,

    #[error("{0}")]
    Conflict(String),

    #[error("Dependency failure: {0}")]
    Dependency(#[source] NatoursError),
}

impl AuthError {
    pub fn validation(message: impl Into<String>, field: &str) -> Self {
        AuthError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation { .. } => ErrorKind::Validation,
            AuthError::InvalidCredentials | AuthError::WrongCurrentPassword => {
                ErrorKind::InvalidCredentials
            }
            AuthError::InvalidOrExpired => ErrorKind::InvalidOrExpired,
            AuthError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::NoOpChange => ErrorKind::NoOpChange,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::Dependency(_) => ErrorKind::DependencyFailure,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            AuthError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

impl From<NatoursError> for AuthError {
    fn from(error: NatoursError) -> Self {
        match error {
            NatoursError::Validation { message, field, .. } => {
                AuthError::Validation { message, field }
            }
            NatoursError::Conflict { message, .. } => AuthError::Conflict(message),
            other => {
                other.log();
                AuthError::Dependency(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natours_core::{storage_error, validation_error};

    #[test]
    fn test_core_errors_map_to_kinds() {
        let err: AuthError = validation_error!("Please provide a valid email", "email", "test").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.field(), Some("email"));

        let err: AuthError = storage_error!("database is locked", "test").into();
        assert_eq!(err.kind(), ErrorKind::DependencyFailure);
    }

    #[test]
    fn test_credential_failures_share_a_kind() {
        assert_eq!(
            AuthError::WrongCurrentPassword.kind(),
            AuthError::InvalidCredentials.kind()
        );
        assert_eq!(
            AuthError::Unauthenticated(UnauthenticatedReason::ExpiredToken).to_string(),
            "Your token has expired! Please log in again."
        );
    }
}

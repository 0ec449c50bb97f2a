//! Core data type definitions
//!
//! The [`Principal`] entity keeps its invariants behind constructor and
//! update functions; stores persist it through [`PrincipalRecord`].

use crate::error::{NatoursError, NatoursResult};
use crate::{internal_error, validation_error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, immutable principal identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Normalised (trimmed, lower-cased) and format-checked email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> NatoursResult<Self> {
        let normalised = raw.trim().to_lowercase();
        validate_email(&normalised)?;
        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_email(value: &str) -> NatoursResult<()> {
    let invalid = || validation_error!("Please provide a valid email", "email", "email");

    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if domain.contains('@') {
        return Err(invalid());
    }
    if local.is_empty() || local.len() > 64 {
        return Err(invalid());
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(invalid());
    }
    if local.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    if domain.is_empty() || domain.len() > 255 || !domain.contains('.') {
        return Err(invalid());
    }
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(invalid());
    }
    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(invalid());
    }
    Ok(())
}

/// Authorization tier of a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Regular,
    Operator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = NatoursError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Role::Regular),
            "operator" => Ok(Role::Operator),
            "admin" => Ok(Role::Admin),
            other => Err(validation_error!(
                format!("Unknown role '{}'", other),
                "role",
                "role"
            )),
        }
    }
}

/// One-way password digest in PHC string format. Never serialized and
/// redacted from debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(<redacted>)")
    }
}

/// Hash and expiry of an in-flight password reset; always set or cleared together
#[derive(Clone, PartialEq, Eq)]
pub struct ResetState {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for ResetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetState")
            .field("token_hash", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An authenticated identity
#[derive(Debug, Clone)]
pub struct Principal {
    id: PrincipalId,
    name: String,
    email: Email,
    role: Role,
    password_hash: Option<PasswordDigest>,
    password_changed_at: Option<DateTime<Utc>>,
    reset: Option<ResetState>,
    created_at: DateTime<Utc>,
}

impl Principal {
    /// Create a new principal with the default role. The password must
    /// already be hashed; `password_changed_at` stays unset at creation.
    pub fn new(
        name: &str,
        email: Email,
        password_hash: PasswordDigest,
        now: DateTime<Utc>,
    ) -> NatoursResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(validation_error!(
                "Principal must have a name",
                "name",
                "principal"
            ));
        }

        Ok(Self {
            id: PrincipalId::new(),
            name: name.to_string(),
            email,
            role: Role::default(),
            password_hash: Some(password_hash),
            password_changed_at: None,
            reset: None,
            created_at: now,
        })
    }

    pub fn id(&self) -> PrincipalId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Present only when the principal was read with
    /// [`crate::Projection::WithPasswordHash`]
    pub fn password_hash(&self) -> Option<&PasswordDigest> {
        self.password_hash.as_ref()
    }

    pub fn password_changed_at(&self) -> Option<DateTime<Utc>> {
        self.password_changed_at
    }

    pub fn reset(&self) -> Option<&ResetState> {
        self.reset.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Replace the password. Records the change time and ends any reset flow.
    pub fn replace_password(&mut self, password_hash: PasswordDigest, now: DateTime<Utc>) {
        self.password_hash = Some(password_hash);
        self.password_changed_at = Some(now);
        self.reset = None;
    }

    pub fn begin_reset(&mut self, token_hash: String, expires_at: DateTime<Utc>) {
        self.reset = Some(ResetState {
            token_hash,
            expires_at,
        });
    }

    pub fn clear_reset(&mut self) {
        self.reset = None;
    }

    /// True when `token_hash` is the stored reset hash and it has not expired
    pub fn reset_is_live(&self, token_hash: &str, now: DateTime<Utc>) -> bool {
        self.reset
            .as_ref()
            .is_some_and(|reset| reset.token_hash == token_hash && reset.expires_at > now)
    }

    /// Whether the password changed after a token issued at `issued_at_us`
    /// (microseconds since the epoch) was minted. A token issued in the same
    /// microsecond as the change stays valid.
    pub fn password_changed_after(&self, issued_at_us: i64) -> bool {
        self.password_changed_at
            .is_some_and(|changed| changed.timestamp_micros() > issued_at_us)
    }

    /// Same principal without the password digest (the default read projection)
    pub fn without_password_hash(mut self) -> Self {
        self.password_hash = None;
        self
    }

    /// Secret-free outward representation
    pub fn view(&self) -> PrincipalView {
        PrincipalView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    /// Rebuild a principal from its persisted form
    pub fn from_record(record: PrincipalRecord) -> NatoursResult<Self> {
        let reset = match (record.reset_token_hash, record.reset_token_expires_at) {
            (Some(token_hash), Some(expires_at)) => Some(ResetState {
                token_hash,
                expires_at,
            }),
            (None, None) => None,
            _ => {
                return Err(internal_error!(
                    format!(
                        "Principal {} has a half-written reset state",
                        record.id
                    ),
                    "principal"
                ))
            }
        };

        Ok(Self {
            id: record.id,
            name: record.name,
            email: record.email,
            role: record.role,
            password_hash: record.password_hash,
            password_changed_at: record.password_changed_at,
            reset,
            created_at: record.created_at,
        })
    }

    pub fn to_record(&self) -> PrincipalRecord {
        PrincipalRecord {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            password_hash: self.password_hash.clone(),
            password_changed_at: self.password_changed_at,
            reset_token_hash: self.reset.as_ref().map(|r| r.token_hash.clone()),
            reset_token_expires_at: self.reset.as_ref().map(|r| r.expires_at),
            created_at: self.created_at,
        }
    }
}

/// Flat persisted form of a [`Principal`]
#[derive(Debug, Clone)]
pub struct PrincipalRecord {
    pub id: PrincipalId,
    pub name: String,
    pub email: Email,
    pub role: Role,
    pub password_hash: Option<PasswordDigest>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Public principal information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrincipalView {
    pub id: PrincipalId,
    pub name: String,
    pub email: Email,
    pub role: Role,
}

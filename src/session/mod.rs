//! Session handling: who the current user is, and where that is remembered.
//!
//! A [`SessionContext`] is resolved once (sign-in or resume) and then passed
//! explicitly into every data-access call.

mod credential;
mod identity;
mod manager;

pub use credential::*;
pub use identity::*;
pub use manager::*;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Identifier of a signed-in user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate a raw identifier. It becomes a path segment, so it must be
    /// non-blank and free of `/`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AppError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AppError::Validation("User id is required".to_string()));
        }
        if raw.contains('/') {
            return Err(AppError::Validation(format!(
                "User id must not contain '/': {:?}",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The resolved identity every data-access call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: UserId,
}

impl SessionContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

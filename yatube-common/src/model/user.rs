use crate::model::{Id, auth::PasswordHash};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;

pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
}

impl Display for User {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.username, f)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateUser {
    pub username: Username,
    pub password_hash: PasswordHash,
}

/// Login name: up to 150 letters, digits and `@.+-_`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0}")]
pub struct InvalidUsernameError(String);

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let len = username.chars().count();
        let allowed = username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));

        if (1..=USERNAME_MAX_LEN).contains(&len) && allowed {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The password must be at least {PASSWORD_MIN_LEN} characters long")]
pub struct PasswordTooShortError;

/// Plain text password as submitted. Never printed.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Result<Self, PasswordTooShortError> {
        if password.chars().count() >= PASSWORD_MIN_LEN {
            Ok(Self(password))
        } else {
            Err(PasswordTooShortError)
        }
    }

    /// Wraps a password for verification only; length rules apply on signup.
    #[must_use]
    pub fn unchecked(password: String) -> Self {
        Self(password)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

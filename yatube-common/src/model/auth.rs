use crate::{
    model::{Id, user::{Password, UserMarker}},
    util::PositiveDuration,
};
use argon2::{Argon2, Params};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const AUTH_TOKEN_CORE_LEN: usize = 24;
pub const AUTH_TOKEN_SALT_LEN: usize = 18;
pub const AUTH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;
pub const PASSWORD_SALT_LEN: usize = 16;
pub const PASSWORD_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing failed: {0}")]
pub struct HashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AuthTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

/// Bearer credential handed to a client after login.
///
/// Rendered as `<user id>:<base64 core>:<base64 salt>`. Only the argon2 hash
/// of the core is persisted, so a leaked table cannot be replayed.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken {
    pub user_id: Id<UserMarker>,
    pub core: [u8; AUTH_TOKEN_CORE_LEN],
    pub salt: [u8; AUTH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthTokenHash(pub Box<[u8; AUTH_TOKEN_HASH_LEN]>);

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authentication {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: OffsetDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Authentication {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

impl AuthToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            core: rand::random(),
            salt: rand::random(),
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let user_id = self.user_id;
        let encoded_core = Base64Display::new(&self.core, &BASE64_STANDARD);
        let encoded_salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{user_id}:{encoded_core}:{encoded_salt}")
    }

    pub fn hash(&self) -> Result<AuthTokenHash, HashError> {
        let mut hash = Box::new([0; AUTH_TOKEN_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.core, &self.salt, &mut *hash)
            .map_err(HashError)?;

        Ok(AuthTokenHash(hash))
    }
}

impl FromStr for AuthToken {
    type Err = AuthTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let user_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let core_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let salt_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let user_id = user_id_part.parse().map_err(Self::Err::InvalidUserId)?;
        let core = BASE64_STANDARD
            .decode(core_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            core,
            salt,
        })
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("user_id", &self.user_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for AuthTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The auth token hash had an invalid length")]
pub struct InvalidAuthTokenHashError;

impl TryFrom<Vec<u8>> for AuthTokenHash {
    type Error = InvalidAuthTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let bytes: [u8; AUTH_TOKEN_HASH_LEN] =
            value.try_into().map_err(|_| InvalidAuthTokenHashError)?;
        Ok(Self(Box::new(bytes)))
    }
}

/// Salted argon2 digest of a password.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordHash {
    pub salt: [u8; PASSWORD_SALT_LEN],
    pub hash: [u8; PASSWORD_HASH_LEN],
}

impl PasswordHash {
    pub fn generate(password: &Password) -> Result<Self, HashError> {
        Self::with_salt(password, rand::random())
    }

    fn with_salt(password: &Password, salt: [u8; PASSWORD_SALT_LEN]) -> Result<Self, HashError> {
        let mut hash = [0; PASSWORD_HASH_LEN];
        Argon2::default()
            .hash_password_into(password.as_bytes(), &salt, &mut hash)
            .map_err(HashError)?;

        Ok(Self { salt, hash })
    }

    pub fn verify(&self, password: &Password) -> Result<bool, HashError> {
        let candidate = Self::with_salt(password, self.salt)?;

        // Length is fixed, so folding over every byte keeps the comparison
        // independent of where the first mismatch is.
        let difference = candidate
            .hash
            .iter()
            .zip(self.hash.iter())
            .fold(0, |acc, (a, b)| acc | (a ^ b));
        Ok(difference == 0)
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordHash").field(&"[redacted]").finish()
    }
}

pub mod auth;
pub mod comment;
pub mod follow;
pub mod group;
pub mod post;
pub mod user;

use crate::{
    model::{
        auth::InvalidAuthTokenHashError,
        group::{InvalidGroupSlugError, InvalidGroupTitleError},
        user::InvalidUsernameError,
    },
    snowflake::Snowflake,
    util::NonPositiveDurationError,
};
use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error as _, Unexpected},
};
use std::{
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
    str::FromStr,
};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    GroupSlug(#[from] InvalidGroupSlugError),
    #[error(transparent)]
    GroupTitle(#[from] InvalidGroupTitleError),
    #[error(transparent)]
    Text(#[from] BlankTextError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidAuthTokenHashError),
    #[error("The stored password hash or salt had an invalid length")]
    PasswordHashLength,
}

/// Typed snowflake id. `Marker` only exists at the type level.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Marker>(Snowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: Snowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> Snowflake {
        self.0
    }

    /// Database representation. Snowflakes stay below 2^63 until the
    /// timestamp part overflows, so the cast never changes the value.
    #[must_use]
    pub fn as_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Debug for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.0.get()).finish()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Self::from)
    }
}

impl<Marker> From<Snowflake> for Id<Marker> {
    fn from(value: Snowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for Snowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(Snowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Text must not be blank")]
pub struct BlankTextError;

/// Body of a post or a comment: anything but whitespace only.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Text(String);

impl Text {
    pub fn new(text: String) -> Result<Self, BlankTextError> {
        if text.trim().is_empty() {
            Err(BlankTextError)
        } else {
            Ok(Self(text))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    /// The first `len` characters, used wherever a text is shown as a label.
    #[must_use]
    pub fn preview(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Text::new(inner)
            .map_err(|_| D::Error::invalid_value(Unexpected::Str(""), &"non-blank text"))
    }
}

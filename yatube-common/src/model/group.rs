use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const GROUP_SLUG_MAX_LEN: usize = 50;
pub const GROUP_TITLE_MAX_LEN: usize = 200;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GroupMarker;

/// Topic community a post can be filed under.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Group {
    pub id: Id<GroupMarker>,
    pub title: GroupTitle,
    pub slug: GroupSlug,
    pub description: String,
}

impl Display for Group {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title.get())
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateGroup {
    pub title: GroupTitle,
    pub slug: GroupSlug,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupSlug(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group slug is invalid: {0}")]
pub struct InvalidGroupSlugError(String);

impl GroupSlug {
    pub fn new(slug: String) -> Result<Self, InvalidGroupSlugError> {
        let len = slug.chars().count();
        let allowed = slug
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');

        if (1..=GROUP_SLUG_MAX_LEN).contains(&len) && allowed {
            Ok(Self(slug))
        } else {
            Err(InvalidGroupSlugError(slug))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for GroupSlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for GroupSlug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        GroupSlug::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"GroupSlug"))
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupTitle(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group title must be 1 to {GROUP_TITLE_MAX_LEN} characters: {0}")]
pub struct InvalidGroupTitleError(String);

impl GroupTitle {
    pub fn new(title: String) -> Result<Self, InvalidGroupTitleError> {
        if title.trim().is_empty() || title.chars().count() > GROUP_TITLE_MAX_LEN {
            Err(InvalidGroupTitleError(title))
        } else {
            Ok(Self(title))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for GroupTitle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        GroupTitle::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"GroupTitle"))
    }
}

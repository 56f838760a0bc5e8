use crate::model::{
    Id, Text,
    group::{Group, GroupMarker},
    user::{User, UserMarker},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;

/// How many characters of a post identify it in listings and logs.
pub const POST_PREVIEW_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: Text,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub author: User,
    pub group: Option<Group>,
    /// Path relative to the media root.
    pub image: Option<String>,
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text.preview(POST_PREVIEW_LEN))
    }
}

/// Author-controlled fields of a post, as submitted on create and edit.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostContent {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub content: PostContent,
}

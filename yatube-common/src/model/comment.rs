use crate::model::{
    Id, Text,
    post::{POST_PREVIEW_LEN, PostMarker},
    user::{User, UserMarker},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub post: Id<PostMarker>,
    pub author: User,
    pub text: Text,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl Display for Comment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text.preview(POST_PREVIEW_LEN))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateComment {
    pub post: Id<PostMarker>,
    pub author: Id<UserMarker>,
    pub text: Text,
}

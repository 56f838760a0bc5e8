use crate::model::user::User;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// `user` subscribes to the posts of `author`.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Follow {
    pub user: User,
    pub author: User,
}

impl Display for Follow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} follows {}", self.user, self.author)
    }
}

/// What a follow request did to the database.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    SelfFollow,
}

use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use yatube_common::model::{
    Id, ModelValidationError, Text,
    auth::{Authentication, PasswordHash},
    comment::Comment,
    group::{Group, GroupSlug, GroupTitle},
    post::Post,
    user::{User, Username},
};

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    pub user_snowflake: i64,
    pub username: String,
    pub password_salt: Vec<u8>,
    pub password_hash: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct GroupRecord {
    pub group_snowflake: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post joined with its author and, if any, its group.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FullPostRecord {
    pub post_snowflake: i64,
    pub text: String,
    pub created_at: OffsetDateTime,
    pub image: Option<String>,
    pub user_snowflake: i64,
    pub username: String,
    pub group_snowflake: Option<i64>,
    pub group_title: Option<String>,
    pub group_slug: Option<String>,
    pub group_description: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_snowflake: i64,
    pub post_snowflake: i64,
    pub text: String,
    pub created_at: OffsetDateTime,
    pub user_snowflake: i64,
    pub username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_snowflake),
            username: Username::new(value.username)?,
        })
    }
}

impl TryFrom<CredentialsRecord> for (User, PasswordHash) {
    type Error = ModelValidationError;

    fn try_from(value: CredentialsRecord) -> Result<Self, Self::Error> {
        let user = User {
            id: Id::from_db(value.user_snowflake),
            username: Username::new(value.username)?,
        };
        let password_hash = PasswordHash {
            salt: value
                .password_salt
                .try_into()
                .map_err(|_| ModelValidationError::PasswordHashLength)?,
            hash: value
                .password_hash
                .try_into()
                .map_err(|_| ModelValidationError::PasswordHashLength)?,
        };

        Ok((user, password_hash))
    }
}

impl TryFrom<GroupRecord> for Group {
    type Error = ModelValidationError;

    fn try_from(value: GroupRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.group_snowflake),
            title: GroupTitle::new(value.title)?,
            slug: GroupSlug::new(value.slug)?,
            description: value.description,
        })
    }
}

impl TryFrom<FullPostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: FullPostRecord) -> Result<Self, Self::Error> {
        let group = match (
            value.group_snowflake,
            value.group_title,
            value.group_slug,
            value.group_description,
        ) {
            (Some(group_snowflake), Some(title), Some(slug), Some(description)) => Some(
                GroupRecord {
                    group_snowflake,
                    title,
                    slug,
                    description,
                }
                .try_into()?,
            ),
            _ => None,
        };

        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            text: Text::new(value.text)?,
            created: value.created_at,
            author: User {
                id: Id::from_db(value.user_snowflake),
                username: Username::new(value.username)?,
            },
            group,
            image: value.image,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.comment_snowflake),
            post: Id::from_db(value.post_snowflake),
            author: User {
                id: Id::from_db(value.user_snowflake),
                username: Username::new(value.username)?,
            },
            text: Text::new(value.text)?,
            created: value.created_at,
        })
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: Id::from_db(value.user_snowflake),
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at,
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}

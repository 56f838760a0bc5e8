use crate::record::{
    AuthenticationRecord, CommentRecord, CredentialsRecord, FullPostRecord, GroupRecord,
    UserRecord,
};
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool, migrate::MigrateError, query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    str::FromStr,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use yatube_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication, PasswordHash},
        comment::{Comment, CommentMarker, CreateComment},
        follow::FollowOutcome,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker, Username},
    },
    pagination::{Page, PageNumber, Paginator},
    snowflake::{ProcessId, Snowflake, SnowflakeGenerator, SnowflakeTimestampError, WorkerId},
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
}

const POST_SELECT: &str = "
    SELECT
        posts.post_snowflake,
        posts.text,
        posts.created_at,
        posts.image,
        users.user_snowflake,
        users.username,
        topic_groups.group_snowflake,
        topic_groups.title AS group_title,
        topic_groups.slug AS group_slug,
        topic_groups.description AS group_description
    FROM
        posts
        JOIN users ON users.user_snowflake = posts.author_snowflake
        LEFT JOIN topic_groups ON topic_groups.group_snowflake = posts.group_snowflake
    ";

/// Which posts a listing shows. Every listing is newest first.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    /// Posts of every author the given user follows.
    FollowedBy(Id<UserMarker>),
}

impl PostFilter {
    fn push_where(self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            PostFilter::All => {}
            PostFilter::Group(group) => {
                builder
                    .push(" WHERE posts.group_snowflake = ")
                    .push_bind(group.as_db());
            }
            PostFilter::Author(author) => {
                builder
                    .push(" WHERE posts.author_snowflake = ")
                    .push_bind(author.as_db());
            }
            PostFilter::FollowedBy(user) => {
                builder
                    .push(
                        " WHERE posts.author_snowflake IN (
                            SELECT follows.author_snowflake
                            FROM follows
                            WHERE follows.user_snowflake = ",
                    )
                    .push_bind(user.as_db())
                    .push(")");
            }
        }
    }
}

pub struct DbClient {
    pool: SqlitePool,
    snowflake_generator: Mutex<SnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Mutex::new(SnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    /// Opens a pool for `url`, creating the database file if needed.
    ///
    /// An in-memory database lives only as long as its connection, so those
    /// are served by a single connection that is never recycled.
    pub async fn connect(url: &str, worker_id: WorkerId, process_id: ProcessId) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool_options = if url.contains(":memory:") || url.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options.connect_with(options).await?;
        debug!(url, "Connected to database");

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn generate_snowflake_at(&self, time: OffsetDateTime) -> Result<Snowflake> {
        // The generator holds no invariant a panicking holder could break.
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_at(time)?;

        Ok(snowflake)
    }

    /// A fresh id for objects stored outside the database, like uploads.
    pub fn generate_snowflake(&self) -> Result<Snowflake> {
        self.generate_snowflake_at(OffsetDateTime::now_utc())
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.username
            FROM
                users
            WHERE
                users.user_snowflake = ?
            ",
        )
        .bind(user_id.as_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.username
            FROM
                users
            WHERE
                users.username = ?
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_credentials(
        &self,
        username: &Username,
    ) -> Result<Option<(User, PasswordHash)>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.user_snowflake,
                users.username,
                users.password_salt,
                users.password_hash
            FROM
                users
            WHERE
                users.username = ?
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(<(User, PasswordHash)>::try_from).transpose()?;
        Ok(credentials)
    }

    /// `None` if the username is already taken.
    pub async fn create_user(&self, user: &CreateUser) -> Result<Option<User>> {
        let user_snowflake = self.generate_snowflake_at(OffsetDateTime::now_utc())?;

        let result = query(
            "
            INSERT INTO users (user_snowflake, username, password_salt, password_hash)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(user_snowflake.get().cast_signed())
        .bind(user.username.get())
        .bind(&user.password_hash.salt[..])
        .bind(&user.password_hash.hash[..])
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Some(User {
                id: user_snowflake.into(),
                username: user.username.clone(),
            })),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO auth_tokens (token_hash, user_snowflake, created_at, expires_after_seconds)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(&authentication.token_hash.0[..])
        .bind(authentication.user.as_db())
        .bind(authentication.created_at)
        .bind(
            authentication
                .expires_after
                .map(|expires_after| expires_after.whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                auth_tokens.user_snowflake,
                auth_tokens.token_hash,
                auth_tokens.created_at,
                auth_tokens.expires_after_seconds
            FROM
                auth_tokens
            WHERE
                auth_tokens.token_hash = ?
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    pub async fn delete_auth(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM auth_tokens WHERE auth_tokens.token_hash = ?")
            .bind(&token_hash.0[..])
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let group_snowflake = self.generate_snowflake_at(OffsetDateTime::now_utc())?;

        query(
            "
            INSERT INTO topic_groups (group_snowflake, title, slug, description)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(group_snowflake.get().cast_signed())
        .bind(group.title.get())
        .bind(group.slug.get())
        .bind(&group.description)
        .execute(&self.pool)
        .await?;

        Ok(Group {
            id: group_snowflake.into(),
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        })
    }

    pub async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT
                topic_groups.group_snowflake,
                topic_groups.title,
                topic_groups.slug,
                topic_groups.description
            FROM
                topic_groups
            WHERE
                topic_groups.group_snowflake = ?
            ",
        )
        .bind(group_id.as_db())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT
                topic_groups.group_snowflake,
                topic_groups.title,
                topic_groups.slug,
                topic_groups.description
            FROM
                topic_groups
            WHERE
                topic_groups.slug = ?
            ",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    /// All groups, for the group choice on the post form.
    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT
                topic_groups.group_snowflake,
                topic_groups.title,
                topic_groups.slug,
                topic_groups.description
            FROM
                topic_groups
            ORDER BY
                topic_groups.title
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut builder = QueryBuilder::<Sqlite>::new(POST_SELECT);
        builder
            .push(" WHERE posts.post_snowflake = ")
            .push_bind(post_id.as_db());

        let record = builder
            .build_query_as::<FullPostRecord>()
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
        filter.push_where(&mut builder);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.cast_unsigned())
    }

    /// One page of a listing. `page` is the raw `?page=` value, resolved
    /// against the listing's size.
    pub async fn fetch_posts_page(
        &self,
        filter: PostFilter,
        per_page: u32,
        page: Option<&str>,
    ) -> Result<Page<Post>> {
        let paginator = Paginator::new(self.count_posts(filter).await?, per_page);
        self.fetch_resolved_posts_page(filter, paginator, paginator.resolve(page))
            .await
    }

    /// Like [`Self::fetch_posts_page`] for a page already resolved against
    /// `paginator`.
    pub async fn fetch_resolved_posts_page(
        &self,
        filter: PostFilter,
        paginator: Paginator,
        page_number: PageNumber,
    ) -> Result<Page<Post>> {
        let mut builder = QueryBuilder::<Sqlite>::new(POST_SELECT);
        filter.push_where(&mut builder);
        builder
            .push(" ORDER BY posts.post_snowflake DESC LIMIT ")
            .push_bind(i64::from(page_number.limit()))
            .push(" OFFSET ")
            .push_bind(page_number.offset().cast_signed());

        let records = builder
            .build_query_as::<FullPostRecord>()
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(paginator.page(page_number, posts))
    }

    pub async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        let created_at = OffsetDateTime::now_utc();
        let post_snowflake = self.generate_snowflake_at(created_at)?;

        let returned_snowflake = query_scalar::<_, i64>(
            "
            INSERT INTO posts (post_snowflake, text, created_at, author_snowflake, group_snowflake, image)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING posts.post_snowflake
            ",
        )
        .bind(post_snowflake.get().cast_signed())
        .bind(post.content.text.get())
        .bind(created_at)
        .bind(post.author.as_db())
        .bind(post.content.group.map(Id::as_db))
        .bind(post.content.image.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(Id::from_db(returned_snowflake))
    }

    /// Replaces text and group. The image is only replaced when `content`
    /// carries a new one.
    pub async fn update_post(&self, post_id: Id<PostMarker>, content: &PostContent) -> Result<bool> {
        let result = query(
            "
            UPDATE posts
            SET
                text = ?,
                group_snowflake = ?,
                image = COALESCE(?, image)
            WHERE
                posts.post_snowflake = ?
            ",
        )
        .bind(content.text.get())
        .bind(content.group.map(Id::as_db))
        .bind(content.image.as_deref())
        .bind(post_id.as_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_comment(&self, comment: &CreateComment) -> Result<Id<CommentMarker>> {
        let created_at = OffsetDateTime::now_utc();
        let comment_snowflake = self.generate_snowflake_at(created_at)?;

        query(
            "
            INSERT INTO comments (comment_snowflake, post_snowflake, author_snowflake, text, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(comment_snowflake.get().cast_signed())
        .bind(comment.post.as_db())
        .bind(comment.author.as_db())
        .bind(comment.text.get())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(comment_snowflake.into())
    }

    /// Oldest first.
    pub async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_snowflake,
                comments.post_snowflake,
                comments.text,
                comments.created_at,
                users.user_snowflake,
                users.username
            FROM
                comments
                JOIN users ON users.user_snowflake = comments.author_snowflake
            WHERE
                comments.post_snowflake = ?
            ORDER BY
                comments.comment_snowflake
            ",
        )
        .bind(post_id.as_db())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    /// Get-or-create. A user following themselves is refused without a query.
    pub async fn follow(
        &self,
        user: Id<UserMarker>,
        author: Id<UserMarker>,
    ) -> Result<FollowOutcome> {
        if user == author {
            return Ok(FollowOutcome::SelfFollow);
        }

        let result = query(
            "
            INSERT INTO follows (user_snowflake, author_snowflake)
            VALUES (?, ?)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(user.as_db())
        .bind(author.as_db())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Whether a follow existed.
    pub async fn unfollow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let result = query(
            "
            DELETE FROM follows
            WHERE follows.user_snowflake = ? AND follows.author_snowflake = ?
            ",
        )
        .bind(user.as_db())
        .bind(author.as_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let exists: i64 = query_scalar(
            "
            SELECT EXISTS (
                SELECT 1 FROM follows
                WHERE follows.user_snowflake = ? AND follows.author_snowflake = ?
            )
            ",
        )
        .bind(user.as_db())
        .bind(author.as_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists != 0)
    }

    /// `(followers, following)` of a user.
    pub async fn fetch_follow_counts(&self, user: Id<UserMarker>) -> Result<(u64, u64)> {
        let (followers, following): (i64, i64) = query_as(
            "
            SELECT
                (SELECT COUNT(*) FROM follows WHERE follows.author_snowflake = ?),
                (SELECT COUNT(*) FROM follows WHERE follows.user_snowflake = ?)
            ",
        )
        .bind(user.as_db())
        .bind(user.as_db())
        .fetch_one(&self.pool)
        .await?;

        Ok((followers.cast_unsigned(), following.cast_unsigned()))
    }
}

use crate::server::{
    Found, Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
    routes::PageQuery,
};
use axum::extract::{Query, State};
use axum_extra::{
    extract::WithRejection,
    routing::{RouterExt, TypedPath},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use yatube_common::{
    model::{
        follow::{Follow, FollowOutcome},
        post::Post,
        user::{User, Username},
    },
    pagination::{POSTS_ON_PAGE, Page},
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(profile)
        .typed_get(follow_index)
        .typed_get(profile_follow)
        .typed_post(profile_follow)
        .typed_get(profile_unfollow)
        .typed_post(profile_unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
pub struct ProfilePath {
    pub username: Username,
}

#[derive(TypedPath)]
#[typed_path("/follow/")]
pub struct FollowIndexPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
pub struct ProfileFollowPath {
    pub username: Username,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
pub struct ProfileUnfollowPath {
    pub username: Username,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct ProfileContext {
    author: User,
    page_obj: Page<Post>,
    /// Whether the viewer follows `author`. Always false for anonymous viewers.
    following: bool,
    posts_count: u64,
    followers_count: u64,
    following_count: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct FollowIndexContext {
    page_obj: Page<Post>,
}

async fn fetch_author(db: &DbClient, username: Username) -> Result<User> {
    db.fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    viewer: Option<AuthenticatedUser>,
    State(db): State<Arc<DbClient>>,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, ServerError>,
) -> Result<Json<ProfileContext>> {
    let author = fetch_author(&db, username).await?;
    let page_obj = db
        .fetch_posts_page(PostFilter::Author(author.id), POSTS_ON_PAGE, query.page.as_deref())
        .await?;

    let following = match viewer {
        Some(AuthenticatedUser { user, .. }) => db.is_following(user.id, author.id).await?,
        None => false,
    };
    let (followers_count, following_count) = db.fetch_follow_counts(author.id).await?;

    Ok(Json(ProfileContext {
        posts_count: page_obj.count,
        author,
        page_obj,
        following,
        followers_count,
        following_count,
    }))
}

/// Posts of everyone the requester follows.
async fn follow_index(
    FollowIndexPath: FollowIndexPath,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, ServerError>,
) -> Result<Json<FollowIndexContext>> {
    let page_obj = db
        .fetch_posts_page(
            PostFilter::FollowedBy(user.id),
            POSTS_ON_PAGE,
            query.page.as_deref(),
        )
        .await?;

    Ok(Json(FollowIndexContext { page_obj }))
}

async fn profile_follow(
    ProfileFollowPath { username }: ProfileFollowPath,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Found> {
    let author = fetch_author(&db, username).await?;

    let outcome = db.follow(user.id, author.id).await?;
    let follow = Follow { user, author };
    match outcome {
        FollowOutcome::Created => info!(%follow, "Created follow"),
        FollowOutcome::AlreadyFollowing => info!(%follow, "Follow already existed"),
        FollowOutcome::SelfFollow => info!(user = %follow.user, "Ignoring self-follow"),
    }

    Ok(Found::to(FollowIndexPath))
}

async fn profile_unfollow(
    ProfileUnfollowPath { username }: ProfileUnfollowPath,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Found> {
    let author = fetch_author(&db, username).await?;

    if db.unfollow(user.id, author.id).await? {
        let follow = Follow { user, author };
        info!(%follow, "Deleted follow");
    }

    Ok(Found::to(FollowIndexPath))
}

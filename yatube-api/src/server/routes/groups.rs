use crate::server::{Result, ServerError, ServerRouter, json::Json, routes::PageQuery};
use axum::extract::{Query, State};
use axum_extra::{
    extract::WithRejection,
    routing::{RouterExt, TypedPath},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use yatube_common::{
    model::{
        group::{Group, GroupSlug},
        post::Post,
    },
    pagination::{POSTS_ON_PAGE, Page},
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
pub struct GroupPostsPath {
    pub slug: GroupSlug,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct GroupPostsContext {
    group: Group,
    page_obj: Page<Post>,
}

async fn group_posts(
    GroupPostsPath { slug }: GroupPostsPath,
    State(db): State<Arc<DbClient>>,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, ServerError>,
) -> Result<Json<GroupPostsContext>> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;
    let page_obj = db
        .fetch_posts_page(PostFilter::Group(group.id), POSTS_ON_PAGE, query.page.as_deref())
        .await?;

    Ok(Json(GroupPostsContext { group, page_obj }))
}

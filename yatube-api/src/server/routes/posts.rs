use crate::server::{
    Found, IndexCache, Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    forms::{CommentForm, Form, FormErrors, PostForm, PostFormContext, ValidPostForm},
    json::Json,
    media::MediaStorage,
    routes::{PageQuery, profiles::ProfilePath},
};
use axum::{
    extract::{Multipart, Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::WithRejection,
    routing::{RouterExt, TypedPath},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yatube_common::{
    model::{
        Id,
        comment::{Comment, CreateComment},
        group::Group,
        post::{CreatePost, Post, PostContent, PostMarker},
    },
    pagination::{POSTS_ON_PAGE, Page, Paginator},
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(post_detail)
        .typed_get(post_create_form)
        .typed_post(post_create)
        .typed_get(post_edit_form)
        .typed_post(post_edit)
        .typed_get(add_comment_form)
        .typed_post(add_comment)
}

#[derive(TypedPath)]
#[typed_path("/")]
pub struct IndexPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/", rejection(ServerError))]
pub struct PostDetailPath {
    pub id: Id<PostMarker>,
}

#[derive(TypedPath)]
#[typed_path("/create/")]
pub struct PostCreatePath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit/", rejection(ServerError))]
pub struct PostEditPath {
    pub id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comment/", rejection(ServerError))]
pub struct AddCommentPath {
    pub id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct IndexContext {
    page_obj: Page<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct PostDetailContext {
    post: Post,
    comments: Vec<Comment>,
    form: CommentFormContext,
    /// Number of posts by the author.
    posts_count: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
struct CommentFormContext {
    text: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct PostFormPageContext {
    form: PostFormContext,
    groups: Vec<Group>,
    is_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    post_id: Option<Id<PostMarker>>,
}

/// Served from the index cache while a rendering for the same page is fresh.
async fn index(
    IndexPath: IndexPath,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<IndexCache>>,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, ServerError>,
) -> Result<Json<Value>> {
    let paginator = Paginator::new(db.count_posts(PostFilter::All).await?, POSTS_ON_PAGE);
    let page_number = paginator.resolve(query.page.as_deref());
    if let Some(context) = cache.get(&page_number) {
        debug!(page = page_number.get(), "Serving index from cache");
        return Ok(Json(context));
    }

    let page_obj = db
        .fetch_resolved_posts_page(PostFilter::All, paginator, page_number)
        .await?;
    let context = serde_json::to_value(IndexContext { page_obj })?;
    cache.insert(page_number, context.clone());

    Ok(Json(context))
}

async fn fetch_post(db: &DbClient, id: Id<PostMarker>) -> Result<Post> {
    db.fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))
}

async fn post_detail(
    PostDetailPath { id }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostDetailContext>> {
    let post = fetch_post(&db, id).await?;
    let comments = db.fetch_post_comments(id).await?;
    let posts_count = db.count_posts(PostFilter::Author(post.author.id)).await?;

    Ok(Json(PostDetailContext {
        post,
        comments,
        form: CommentFormContext::default(),
        posts_count,
    }))
}

async fn post_form_page(
    db: &DbClient,
    form: PostFormContext,
    post_id: Option<Id<PostMarker>>,
) -> Result<Json<PostFormPageContext>> {
    Ok(Json(PostFormPageContext {
        form,
        groups: db.fetch_groups().await?,
        is_edit: post_id.is_some(),
        post_id,
    }))
}

/// Stores the upload, if any, and turns the form into storable content.
async fn post_content(
    form: ValidPostForm,
    db: &DbClient,
    media: &MediaStorage,
) -> Result<PostContent> {
    let image = match form.image {
        Some((format, bytes)) => Some(
            media
                .save_post_image(db.generate_snowflake()?, format, &bytes)
                .await?,
        ),
        None => None,
    };

    Ok(PostContent {
        text: form.text,
        group: form.group,
        image,
    })
}

async fn discard_image(media: &MediaStorage, image: Option<&str>) {
    if let Some(image) = image
        && let Err(err) = media.remove(image).await
    {
        warn!(%err, "Could not remove image");
    }
}

async fn post_create_form(
    PostCreatePath: PostCreatePath,
    _user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostFormPageContext>> {
    post_form_page(&db, PostFormContext::default(), None).await
}

async fn post_create(
    PostCreatePath: PostCreatePath,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStorage>>,
    WithRejection(multipart, _): WithRejection<Multipart, ServerError>,
) -> Result<Response> {
    let form = PostForm::from_multipart(multipart).await?;
    let valid = match form.validate(&db).await? {
        Ok(valid) => valid,
        Err(errors) => {
            let page = post_form_page(&db, form.into_context(errors), None).await?;
            return Ok(page.into_response());
        }
    };

    let create_post = CreatePost {
        author: user.id,
        content: post_content(valid, &db, &media).await?,
    };
    let post_id = match db.create_post(&create_post).await {
        Ok(post_id) => post_id,
        Err(err) => {
            discard_image(&media, create_post.content.image.as_deref()).await;
            return Err(err.into());
        }
    };
    info!(%post_id, author = %user, "Created post");

    let profile = ProfilePath {
        username: user.username,
    };
    Ok(Found::to(profile).into_response())
}

async fn post_edit_form(
    PostEditPath { id }: PostEditPath,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Response> {
    let post = fetch_post(&db, id).await?;
    if post.author.id != user.id {
        return Ok(Found::to(PostDetailPath { id }).into_response());
    }

    let form = PostForm::from_post(&post).into_context(FormErrors::default());
    let page = post_form_page(&db, form, Some(id)).await?;
    Ok(page.into_response())
}

/// Text and group are replaced. The image only if a new one was uploaded.
async fn post_edit(
    PostEditPath { id }: PostEditPath,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStorage>>,
    WithRejection(multipart, _): WithRejection<Multipart, ServerError>,
) -> Result<Response> {
    let post = fetch_post(&db, id).await?;
    if post.author.id != user.id {
        debug!(%id, user = %user, "Refusing edit by non-author");
        return Ok(Found::to(PostDetailPath { id }).into_response());
    }

    let form = PostForm::from_multipart(multipart).await?;
    let valid = match form.validate(&db).await? {
        Ok(valid) => valid,
        Err(errors) => {
            let page = post_form_page(&db, form.into_context(errors), Some(id)).await?;
            return Ok(page.into_response());
        }
    };

    let content = post_content(valid, &db, &media).await?;
    match db.update_post(id, &content).await {
        Ok(true) => {}
        Ok(false) => {
            discard_image(&media, content.image.as_deref()).await;
            return Err(ServerError::PostByIdNotFound(id));
        }
        Err(err) => {
            discard_image(&media, content.image.as_deref()).await;
            return Err(err.into());
        }
    }
    info!(%id, author = %user, "Edited post");

    if content.image.is_some() {
        discard_image(&media, post.image.as_deref()).await;
    }

    Ok(Found::to(PostDetailPath { id }).into_response())
}

/// There is no comment page, the form lives on the post detail.
async fn add_comment_form(
    AddCommentPath { id }: AddCommentPath,
    _user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Found> {
    fetch_post(&db, id).await?;

    Ok(Found::to(PostDetailPath { id }))
}

async fn add_comment(
    AddCommentPath { id }: AddCommentPath,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Form(form): Form<CommentForm>,
) -> Result<Found> {
    fetch_post(&db, id).await?;

    if let Some(text) = form.validate() {
        let comment_id = db
            .create_comment(&CreateComment {
                post: id,
                author: user.id,
                text,
            })
            .await?;
        info!(%comment_id, post = %id, author = %user, "Created comment");
    }

    Ok(Found::to(PostDetailPath { id }))
}

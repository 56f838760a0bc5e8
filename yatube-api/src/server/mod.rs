use crate::server::{cache::PageCache, json::Json, media::MediaError};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri, header::LOCATION},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Display, sync::Arc};
use thiserror::Error;
use tracing::{debug, error};
use yatube_common::{
    model::{
        Id,
        auth::HashError,
        group::GroupSlug,
        post::PostMarker,
        user::Username,
    },
    pagination::PageNumber,
    util::PositiveDuration,
};
use yatube_db::client::{DbClient, DbError};

pub mod auth;
pub mod cache;
mod forms;
mod json;
pub mod media;
mod routes;
#[cfg(test)]
mod tests;

pub type ServerRouter = Router<ServerState>;

/// Rendered index pages by resolved page number.
pub type IndexCache = PageCache<PageNumber, Value>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct AuthSettings {
    /// `None` means tokens never expire.
    pub token_lifetime: Option<PositiveDuration>,
}

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub media: Arc<media::MediaStorage>,
    pub index_cache: Arc<IndexCache>,
    pub auth_settings: AuthSettings,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

/// A `302 Found` redirect.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Found(String);

impl Found {
    pub fn to(location: impl Display) -> Self {
        Self(location.to_string())
    }
}

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(LOCATION, self.0)]).into_response()
    }
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Login required, redirecting to {0}")]
    LoginRequired(String),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming form rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("Incoming multipart form rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading multipart form failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Hashing a credential failed: {0}")]
    Hash(#[from] HashError),
    #[error("Storing an upload failed: {0}")]
    Media(#[from] MediaError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User {0} was not found.")]
    UserByUsernameNotFound(Username),
    #[error("Group {0} was not found.")]
    GroupBySlugNotFound(GroupSlug),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByUsernameNotFound(_)
            | ServerError::GroupBySlugNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::LoginRequired(_) => StatusCode::FOUND,
            ServerError::QueryRejection(_)
            | ServerError::FormRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Hash(_)
            | ServerError::Media(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::LoginRequired(login_url) = self {
            debug!(%login_url, "Redirecting anonymous user to login");
            return Found(login_url).into_response();
        }

        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            error: self.to_string(),
        };
        (status, Json(error_response)).into_response()
    }
}

use crate::server::ServerRouter;
use serde::Deserialize;

pub mod auth;
pub mod groups;
pub mod posts;
pub mod profiles;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(groups::routes())
        .merge(profiles::routes())
        .merge(auth::routes())
}

/// `?page=` of a paginated listing, kept raw so that any value resolves to
/// some page.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

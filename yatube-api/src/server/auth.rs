use crate::server::{AuthSettings, Result, ServerError, routes::auth::LoginPath};
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{Uri, request::Parts, uri::PathAndQuery},
};
use axum_extra::{
    extract::cookie::{Cookie, CookieJar, SameSite},
    routing::TypedPath,
};
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;
use yatube_common::model::{
    auth::{AuthToken, AuthTokenHash, Authentication},
    user::User,
};
use yatube_db::client::DbClient;

pub const AUTH_COOKIE: &str = "auth_token";

/// Characters escaped in the `next` parameter. Slashes stay readable.
const NEXT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The user behind a valid token, read from `Authorization: Bearer` or the
/// auth cookie.
///
/// Extracting it directly makes a route login-only: anonymous requests are
/// redirected to the login page. `Option<AuthenticatedUser>` accepts both.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token_hash: AuthTokenHash,
}

/// `/auth/login/?next=<uri>`
#[must_use]
pub fn login_url(uri: &Uri) -> String {
    let next = uri.path_and_query().map_or("/", PathAndQuery::as_str);
    format!(
        "{}?next={}",
        LoginPath::PATH,
        utf8_percent_encode(next, NEXT_ENCODE_SET)
    )
}

/// Only same-site absolute paths are followed after login.
///
/// Browsers drop tabs and newlines from URLs, so control characters could
/// turn `/\t/host` into `//host`.
#[must_use]
pub fn is_local_redirect(next: &str) -> bool {
    if !next.starts_with('/')
        || next.starts_with("//")
        || next.contains('\\')
        || next.chars().any(|c| c.is_ascii_control())
    {
        return false;
    }

    next.parse::<Uri>()
        .is_ok_and(|uri| uri.scheme().is_none() && uri.authority().is_none())
}

pub fn auth_cookie(token: &AuthToken, settings: AuthSettings) -> Cookie<'static> {
    let mut cookie = Cookie::build((AUTH_COOKIE, token.as_token_str()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    if let Some(lifetime) = settings.token_lifetime {
        cookie.set_max_age(lifetime.get());
    }

    cookie
}

/// Stores the hash of a fresh token for `user` and hands out the token.
pub async fn issue_token(db: &DbClient, settings: AuthSettings, user: &User) -> Result<AuthToken> {
    let token = AuthToken::generate_random(user.id);
    let authentication = Authentication {
        user: user.id,
        token_hash: token.hash()?,
        created_at: OffsetDateTime::now_utc(),
        expires_after: settings.token_lifetime,
    };
    db.create_auth(&authentication).await?;

    debug!(user = %user, "Issued auth token");
    Ok(token)
}

fn presented_token(parts: &Parts) -> Option<String> {
    if let Some(Authorization(bearer)) = parts.headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_owned());
    }

    CookieJar::from_headers(&parts.headers)
        .get(AUTH_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}

/// Malformed, unknown and expired tokens all count as anonymous.
async fn authenticate(parts: &Parts, db: &DbClient) -> Result<Option<AuthenticatedUser>> {
    let Some(token) = presented_token(parts) else {
        return Ok(None);
    };
    let token: AuthToken = match token.parse() {
        Ok(token) => token,
        Err(err) => {
            debug!(%err, "Ignoring undecodable auth token");
            return Ok(None);
        }
    };

    let token_hash = token.hash()?;
    let Some(authentication) = db.fetch_auth(&token_hash).await? else {
        debug!(user = %token.user_id, "Ignoring unknown auth token");
        return Ok(None);
    };

    if authentication.user != token.user_id
        || authentication.is_expired_at(OffsetDateTime::now_utc())
    {
        debug!(user = %token.user_id, "Ignoring expired or mismatched auth token");
        return Ok(None);
    }

    let user = db.fetch_user(authentication.user).await?;
    Ok(user.map(|user| AuthenticatedUser { user, token_hash }))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db = Arc::<DbClient>::from_ref(state);

        authenticate(parts, &db)
            .await?
            .ok_or_else(|| ServerError::LoginRequired(login_url(&parts.uri)))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let db = Arc::<DbClient>::from_ref(state);

        authenticate(parts, &db).await
    }
}

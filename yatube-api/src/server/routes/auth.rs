use crate::server::{
    AuthSettings, Found, Result, ServerError, ServerRouter,
    auth::{AUTH_COOKIE, AuthenticatedUser, auth_cookie, is_local_redirect, issue_token},
    forms::{
        CredentialsForm, CredentialsFormContext, Form, FormErrors, INVALID_LOGIN,
        NON_FIELD_ERRORS, USERNAME_TAKEN,
    },
    json::Json,
    routes::posts::IndexPath,
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::{
        WithRejection,
        cookie::{Cookie, CookieJar},
    },
    routing::{RouterExt, TypedPath},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use yatube_common::model::{
    auth::PasswordHash,
    user::{CreateUser, User},
};
use yatube_db::client::DbClient;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(signup_form)
        .typed_post(signup)
        .typed_get(login_form)
        .typed_post(login)
        .typed_get(logout)
        .typed_post(logout)
}

#[derive(TypedPath)]
#[typed_path("/auth/signup/")]
pub struct SignupPath;

#[derive(TypedPath)]
#[typed_path("/auth/login/")]
pub struct LoginPath;

#[derive(TypedPath)]
#[typed_path("/auth/logout/")]
pub struct LogoutPath;

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct CredentialsPageContext {
    form: CredentialsFormContext,
}

fn credentials_page(form: CredentialsForm, errors: FormErrors) -> Response {
    Json(CredentialsPageContext {
        form: form.into_context(errors),
    })
    .into_response()
}

/// Sets the auth cookie for a fresh token and redirects.
async fn log_in(
    db: &DbClient,
    settings: AuthSettings,
    jar: CookieJar,
    user: &User,
    location: &str,
) -> Result<Response> {
    let token = issue_token(db, settings, user).await?;
    info!(user = %user, "Logged in");

    Ok((jar.add(auth_cookie(&token, settings)), Found::to(location)).into_response())
}

async fn signup_form(SignupPath: SignupPath) -> Json<CredentialsPageContext> {
    Json(CredentialsPageContext {
        form: CredentialsFormContext::default(),
    })
}

async fn signup(
    SignupPath: SignupPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<AuthSettings>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    let (username, password) = match form.validate_signup() {
        Ok(credentials) => credentials,
        Err(errors) => return Ok(credentials_page(form, errors)),
    };

    let create_user = CreateUser {
        username,
        password_hash: PasswordHash::generate(&password)?,
    };
    let Some(user) = db.create_user(&create_user).await? else {
        let mut errors = FormErrors::default();
        errors.add("username", USERNAME_TAKEN);
        return Ok(credentials_page(form, errors));
    };
    info!(user = %user, "Signed up");

    log_in(&db, settings, jar, &user, &IndexPath.to_string()).await
}

async fn login_form(
    LoginPath: LoginPath,
    WithRejection(Query(query), _): WithRejection<Query<LoginQuery>, ServerError>,
) -> Json<CredentialsPageContext> {
    Json(CredentialsPageContext {
        form: CredentialsFormContext {
            next: query.next.unwrap_or_default(),
            ..CredentialsFormContext::default()
        },
    })
}

async fn login(
    LoginPath: LoginPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<AuthSettings>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    let (username, password) = match form.validate_login() {
        Ok(credentials) => credentials,
        Err(errors) => return Ok(credentials_page(form, errors)),
    };

    let user = match db.fetch_credentials(&username).await? {
        Some((user, password_hash)) if password_hash.verify(&password)? => user,
        _ => {
            info!(%username, "Rejected login");
            let mut errors = FormErrors::default();
            errors.add(NON_FIELD_ERRORS, INVALID_LOGIN);
            return Ok(credentials_page(form, errors));
        }
    };

    let location = if is_local_redirect(&form.next) {
        form.next
    } else {
        IndexPath.to_string()
    };
    log_in(&db, settings, jar, &user, &location).await
}

/// Revokes the presented token, if any, and drops the cookie.
async fn logout(
    LogoutPath: LogoutPath,
    viewer: Option<AuthenticatedUser>,
    State(db): State<Arc<DbClient>>,
    jar: CookieJar,
) -> Result<(CookieJar, Found)> {
    if let Some(AuthenticatedUser { user, token_hash }) = viewer {
        db.delete_auth(&token_hash).await?;
        info!(user = %user, "Logged out");
    }

    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    Ok((jar, Found::to(IndexPath)))
}

use crate::server::{
    AuthSettings, IndexCache, ServerState,
    auth::issue_token,
    cache::PageCache,
    media::MediaStorage,
    routes::{
        auth::{LoginPath, LogoutPath, SignupPath},
        groups::GroupPostsPath,
        posts::{AddCommentPath, IndexPath, PostCreatePath, PostDetailPath, PostEditPath},
        profiles::{FollowIndexPath, ProfileFollowPath, ProfilePath, ProfileUnfollowPath},
    },
};
use axum::{
    Router,
    body::Body,
    http::{
        Method, Request, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
};
use axum_extra::extract::cookie::Cookie;
use http_body_util::BodyExt;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use yatube_common::{
    model::{
        Id, Text,
        auth::{AuthToken, Authentication, PasswordHash},
        group::{CreateGroup, Group, GroupSlug, GroupTitle},
        post::{CreatePost, PostContent, PostMarker},
        user::{CreateUser, Password, User, Username},
    },
    snowflake::{ProcessId, WorkerId},
    util::PositiveDuration,
};
use yatube_db::client::{DbClient, PostFilter};

const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00,
    0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];
const BOUNDARY: &str = "yatube-test-boundary";
const PASSWORD: &str = "password123";

struct TestApp {
    router: Router,
    db: Arc<DbClient>,
    index_cache: Arc<IndexCache>,
    settings: AuthSettings,
    media: TempDir,
}

/// A user and a bearer token for them.
struct Client {
    user: User,
    token: String,
}

impl TestApp {
    async fn new() -> Self {
        let db = DbClient::connect("sqlite::memory:", WorkerId::default(), ProcessId::default())
            .await
            .unwrap();
        db.migrate().await.unwrap();
        let db = Arc::new(db);

        let media = tempfile::tempdir().unwrap();
        let index_cache = Arc::new(PageCache::new(Duration::from_secs(20), 16));
        let settings = AuthSettings {
            token_lifetime: PositiveDuration::from_seconds(3600),
        };

        let state = ServerState {
            db_client: Arc::clone(&db),
            media: Arc::new(MediaStorage::new(media.path().to_owned())),
            index_cache: Arc::clone(&index_cache),
            auth_settings: settings,
        };

        Self {
            router: crate::server::routes().with_state(state),
            db,
            index_cache,
            settings,
            media,
        }
    }

    async fn user(&self, name: &str) -> Client {
        let password = Password::new(PASSWORD.to_owned()).unwrap();
        let user = self
            .db
            .create_user(&CreateUser {
                username: Username::new(name.to_owned()).unwrap(),
                password_hash: PasswordHash::generate(&password).unwrap(),
            })
            .await
            .unwrap()
            .unwrap();
        let token = issue_token(&self.db, self.settings, &user)
            .await
            .unwrap()
            .as_token_str();

        Client { user, token }
    }

    async fn group(&self, slug: &str) -> Group {
        self.db
            .create_group(&CreateGroup {
                title: GroupTitle::new("Тестовая группа".to_owned()).unwrap(),
                slug: GroupSlug::new(slug.to_owned()).unwrap(),
                description: "Тестовое описание".to_owned(),
            })
            .await
            .unwrap()
    }

    async fn post(&self, author: &User, text: &str, group: Option<&Group>) -> Id<PostMarker> {
        self.db
            .create_post(&CreatePost {
                author: author.id,
                content: PostContent {
                    text: Text::new(text.to_owned()).unwrap(),
                    group: group.map(|group| group.id),
                    image: None,
                },
            })
            .await
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: impl ToString, client: Option<&Client>) -> Response<Body> {
        let mut request = Request::builder().uri(uri.to_string());
        if let Some(client) = client {
            request = request.header(AUTHORIZATION, format!("Bearer {}", client.token));
        }

        self.send(request.body(Body::empty()).unwrap()).await
    }

    async fn post_form(
        &self,
        uri: impl ToString,
        client: Option<&Client>,
        body: &str,
    ) -> Response<Body> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri.to_string())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(client) = client {
            request = request.header(AUTHORIZATION, format!("Bearer {}", client.token));
        }

        self.send(request.body(Body::from(body.to_owned())).unwrap())
            .await
    }

    async fn post_multipart(
        &self,
        uri: impl ToString,
        client: &Client,
        fields: &[(&str, &str)],
        image: Option<&[u8]>,
    ) -> Response<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(image) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                    filename=\"small.gif\"\r\nContent-Type: image/gif\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(image);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.to_string())
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(AUTHORIZATION, format!("Bearer {}", client.token))
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }
}

async fn json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

fn object_list(context: &Value) -> &Vec<Value> {
    context["page_obj"]["object_list"].as_array().unwrap()
}

fn login_redirect(path: &str) -> String {
    format!("/auth/login/?next={path}")
}

#[test]
fn paths_reverse() {
    let id = Id::<PostMarker>::from(1);
    let username = Username::new("auth".to_owned()).unwrap();

    let cases = [
        (IndexPath.to_string(), "/"),
        (
            GroupPostsPath {
                slug: GroupSlug::new("test-slug".to_owned()).unwrap(),
            }
            .to_string(),
            "/group/test-slug/",
        ),
        (
            ProfilePath {
                username: username.clone(),
            }
            .to_string(),
            "/profile/auth/",
        ),
        (PostDetailPath { id }.to_string(), "/posts/1/"),
        (PostCreatePath.to_string(), "/create/"),
        (PostEditPath { id }.to_string(), "/posts/1/edit/"),
        (AddCommentPath { id }.to_string(), "/posts/1/comment/"),
        (FollowIndexPath.to_string(), "/follow/"),
        (
            ProfileFollowPath {
                username: username.clone(),
            }
            .to_string(),
            "/profile/auth/follow/",
        ),
        (
            ProfileUnfollowPath { username }.to_string(),
            "/profile/auth/unfollow/",
        ),
        (SignupPath.to_string(), "/auth/signup/"),
        (LoginPath.to_string(), "/auth/login/"),
        (LogoutPath.to_string(), "/auth/logout/"),
    ];

    for (path, expected) in cases {
        assert_eq!(path, expected);
    }
}

#[tokio::test]
async fn public_pages() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let group = app.group("test-slug").await;
    let post_id = app.post(&author.user, "Тестовый пост", Some(&group)).await;

    let pages = [
        "/".to_owned(),
        "/group/test-slug/".to_owned(),
        "/profile/auth/".to_owned(),
        format!("/posts/{post_id}/"),
        "/auth/signup/".to_owned(),
        "/auth/login/".to_owned(),
    ];
    for page in pages {
        let response = app.get(&page, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{page}");
    }
}

#[tokio::test]
async fn unknown_rows_and_routes_are_not_found() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;

    let pages = [
        "/unexisting_page/",
        "/group/missing/",
        "/profile/nobody/",
        "/posts/12345/",
        "/posts/not-a-number/",
    ];
    for page in pages {
        let response = app.get(page, Some(&author)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{page}");
        assert_eq!(json(response).await["status"], 404, "{page}");
    }

    let response = app.get("/posts/12345/edit/", Some(&author)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    for page in ["/profile/nobody/follow/", "/profile/nobody/unfollow/"] {
        let response = app.get(page, Some(&author)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{page}");
        let response = app.post_form(page, Some(&author), "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{page}");
    }

    let response = app.get("/posts/12345/comment/", Some(&author)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app
        .post_form("/posts/12345/comment/", Some(&author), "text=Привет")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guests_are_sent_to_login() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let post_id = app.post(&author.user, "Тестовый пост", None).await;

    let pages = [
        "/create/".to_owned(),
        "/follow/".to_owned(),
        "/follow/?page=2".to_owned(),
        format!("/posts/{post_id}/edit/"),
        format!("/posts/{post_id}/comment/"),
        "/profile/auth/follow/".to_owned(),
        "/profile/auth/unfollow/".to_owned(),
    ];
    for page in pages {
        let response = app.get(&page, None).await;
        assert_eq!(response.status(), StatusCode::FOUND, "{page}");

        let expected = login_redirect(&page.replace('?', "%3F").replace('=', "%3D"));
        assert_eq!(location(&response), expected);
    }
}

#[tokio::test]
async fn unusable_tokens_count_as_anonymous() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;

    let expired = AuthToken::generate_random(author.user.id);
    app.db
        .create_auth(&Authentication {
            user: author.user.id,
            token_hash: expired.hash().unwrap(),
            created_at: OffsetDateTime::now_utc() - time::Duration::hours(2),
            expires_after: PositiveDuration::from_seconds(3600),
        })
        .await
        .unwrap();
    let unknown = AuthToken::generate_random(author.user.id);

    let tokens = [
        "garbage".to_owned(),
        expired.as_token_str(),
        unknown.as_token_str(),
    ];
    for token in tokens {
        let client = Client {
            user: author.user.clone(),
            token,
        };
        let response = app.get("/create/", Some(&client)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), login_redirect("/create/"));
    }

    let response = app.get("/create/", Some(&author)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn only_author_may_edit() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let another = app.user("another").await;
    let post_id = app.post(&author.user, "Тестовый пост", None).await;

    let response = app.get(format!("/posts/{post_id}/edit/"), Some(&another)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), format!("/posts/{post_id}/"));

    let response = app
        .post_multipart(
            format!("/posts/{post_id}/edit/"),
            &another,
            &[("text", "Чужая правка")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let post = app.db.fetch_post(post_id).await.unwrap().unwrap();
    assert_eq!(post.text.get(), "Тестовый пост");

    let response = app.get(format!("/posts/{post_id}/edit/"), Some(&author)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let context = json(response).await;
    assert_eq!(context["is_edit"], true);
    assert_eq!(context["form"]["text"], "Тестовый пост");
    assert_eq!(context["post_id"], u64::from(post_id));
}

#[tokio::test]
async fn listings_paginate() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let group = app.group("test-slug").await;
    for n in 0..13 {
        app.post(&author.user, &format!("Пост {n}"), Some(&group)).await;
    }
    let reader = app.user("reader").await;
    app.db.follow(reader.user.id, author.user.id).await.unwrap();

    let listings = ["/", "/group/test-slug/", "/profile/auth/", "/follow/"];
    for listing in listings {
        let first = json(app.get(listing, Some(&reader)).await).await;
        assert_eq!(object_list(&first).len(), 10, "{listing}");
        assert_eq!(first["page_obj"]["num_pages"], 2);
        assert_eq!(first["page_obj"]["has_next"], true);
        assert_eq!(object_list(&first)[0]["text"], "Пост 12");

        let second = json(app.get(format!("{listing}?page=2"), Some(&reader)).await).await;
        assert_eq!(object_list(&second).len(), 3, "{listing}");
        assert_eq!(second["page_obj"]["number"], 2);

        let beyond = json(app.get(format!("{listing}?page=99"), Some(&reader)).await).await;
        assert_eq!(beyond["page_obj"]["number"], 2, "{listing}");

        let garbage = json(app.get(format!("{listing}?page=abc"), Some(&reader)).await).await;
        assert_eq!(garbage["page_obj"]["number"], 1, "{listing}");
    }
}

#[tokio::test]
async fn post_shows_up_where_it_belongs() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let group = app.group("test-slug").await;
    let other_group = app.group("other-slug").await;
    let post_id = app.post(&author.user, "Тестовый пост", Some(&group)).await;

    for listing in ["/", "/group/test-slug/", "/profile/auth/"] {
        let context = json(app.get(listing, None).await).await;
        let post = &object_list(&context)[0];
        assert_eq!(post["text"], "Тестовый пост", "{listing}");
        assert_eq!(post["author"]["username"], "auth");
        assert_eq!(post["group"]["slug"], "test-slug");
    }

    let context = json(app.get("/group/other-slug/", None).await).await;
    assert!(object_list(&context).is_empty());
    assert_eq!(context["group"]["slug"], other_group.slug.get());

    let context = json(app.get("/profile/auth/", None).await).await;
    assert_eq!(context["author"]["username"], "auth");
    assert_eq!(context["posts_count"], 1);
    assert_eq!(context["following"], false);

    let context = json(app.get(format!("/posts/{post_id}/"), None).await).await;
    assert_eq!(context["post"]["text"], "Тестовый пост");
    assert_eq!(context["posts_count"], 1);
    assert_eq!(context["form"]["text"], "");
}

#[tokio::test]
async fn create_post_with_image() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let group = app.group("test-slug").await;

    let response = app.get("/create/", Some(&author)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let context = json(response).await;
    assert_eq!(context["is_edit"], false);
    assert_eq!(context["groups"][0]["slug"], "test-slug");

    let group_id = group.id.to_string();
    let response = app
        .post_multipart(
            "/create/",
            &author,
            &[("text", "Тестовый текст"), ("group", group_id.as_str())],
            Some(SMALL_GIF),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/profile/auth/");

    let page = app
        .db
        .fetch_posts_page(PostFilter::All, 10, None)
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    let post = &page.object_list[0];
    assert_eq!(post.text.get(), "Тестовый текст");
    assert_eq!(post.group.as_ref(), Some(&group));

    let image = post.image.as_deref().unwrap();
    assert!(image.starts_with("posts/") && image.ends_with(".gif"), "{image}");
    let stored = std::fs::read(app.media.path().join(image)).unwrap();
    assert_eq!(stored, SMALL_GIF);
}

#[tokio::test]
async fn invalid_post_form_is_shown_again() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;

    let response = app
        .post_multipart(
            "/create/",
            &author,
            &[("text", "   "), ("group", "12345")],
            Some(b"not an image".as_slice()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let context = json(response).await;
    assert_eq!(context["form"]["text"], "   ");
    assert_eq!(context["form"]["group"], "12345");
    let errors = &context["form"]["errors"];
    assert_eq!(errors["text"][0], "This field is required.");
    assert!(errors["group"][0].as_str().unwrap().starts_with("Select a valid choice."));
    assert!(errors["image"][0].as_str().unwrap().starts_with("Upload a valid image."));

    assert_eq!(app.db.count_posts(PostFilter::All).await.unwrap(), 0);
}

#[tokio::test]
async fn edit_keeps_image_unless_replaced() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let group = app.group("test-slug").await;

    app.post_multipart("/create/", &author, &[("text", "Исходный")], Some(SMALL_GIF))
        .await;
    let post = app
        .db
        .fetch_posts_page(PostFilter::All, 10, None)
        .await
        .unwrap()
        .object_list
        .remove(0);

    let group_id = group.id.to_string();
    let response = app
        .post_multipart(
            PostEditPath { id: post.id },
            &author,
            &[("text", "Изменённый"), ("group", group_id.as_str())],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), PostDetailPath { id: post.id }.to_string());

    let edited = app.db.fetch_post(post.id).await.unwrap().unwrap();
    assert_eq!(edited.text.get(), "Изменённый");
    assert_eq!(edited.group.as_ref(), Some(&group));
    assert_eq!(edited.image, post.image);
    assert_eq!(edited.created, post.created);
}

#[tokio::test]
async fn edit_replaces_uploaded_image() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;

    app.post_multipart("/create/", &author, &[("text", "С картинкой")], Some(SMALL_GIF))
        .await;
    let post = app
        .db
        .fetch_posts_page(PostFilter::All, 10, None)
        .await
        .unwrap()
        .object_list
        .remove(0);
    let old_image = post.image.clone().unwrap();

    let response = app
        .post_multipart(
            PostEditPath { id: post.id },
            &author,
            &[("text", "С новой картинкой")],
            Some(SMALL_GIF),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let edited = app.db.fetch_post(post.id).await.unwrap().unwrap();
    let new_image = edited.image.unwrap();
    assert_ne!(new_image, old_image);
    assert!(new_image.starts_with("posts/"));
    assert_eq!(std::fs::read(app.media.path().join(&new_image)).unwrap(), SMALL_GIF);
    assert!(!app.media.path().join(&old_image).exists());
}

#[tokio::test]
async fn invalid_edit_form_is_shown_again() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let post_id = app.post(&author.user, "Исходный", None).await;

    let response = app
        .post_multipart(
            PostEditPath { id: post_id },
            &author,
            &[("text", "   "), ("group", "12345")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let context = json(response).await;
    assert_eq!(context["is_edit"], true);
    assert_eq!(context["post_id"], u64::from(post_id));
    assert_eq!(context["form"]["text"], "   ");
    let errors = &context["form"]["errors"];
    assert_eq!(errors["text"][0], "This field is required.");
    assert!(errors["group"][0].as_str().unwrap().starts_with("Select a valid choice."));

    let unchanged = app.db.fetch_post(post_id).await.unwrap().unwrap();
    assert_eq!(unchanged.text.get(), "Исходный");
    assert_eq!(unchanged.group, None);
}

#[tokio::test]
async fn comments() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let another = app.user("another").await;
    let post_id = app.post(&author.user, "Тестовый пост", None).await;
    let comment_path = AddCommentPath { id: post_id };
    let detail_path = PostDetailPath { id: post_id }.to_string();

    let response = app.post_form(&comment_path, None, "text=Гость").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with("/auth/login/"));

    let response = app.get(&comment_path, Some(&another)).await;
    assert_eq!(location(&response), detail_path);

    let response = app.post_form(&comment_path, Some(&another), "text=+++").await;
    assert_eq!(location(&response), detail_path);

    let response = app
        .post_form(&comment_path, Some(&another), "text=Nice+post")
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), detail_path);

    let context = json(app.get(&detail_path, None).await).await;
    let comments = context["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["text"], "Nice post");
    assert_eq!(comments[0]["author"]["username"], "another");
}

#[tokio::test]
async fn index_is_cached_until_cleared() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    app.post(&author.user, "Первый", None).await;

    let before = json(app.get("/", None).await).await;
    app.post(&author.user, "Второй", None).await;

    let cached = json(app.get("/", None).await).await;
    assert_eq!(cached, before);

    for page in ["/?page=1", "/?page=abc", "/?page=99"] {
        let same_page = json(app.get(page, None).await).await;
        assert_eq!(same_page, before, "{page}");
    }

    app.index_cache.clear();
    let fresh = json(app.get("/", None).await).await;
    assert_ne!(fresh, before);
    assert_eq!(object_list(&fresh)[0]["text"], "Второй");
}

#[tokio::test]
async fn follow_and_unfollow() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;
    let follower = app.user("follower").await;
    let stranger = app.user("stranger").await;
    app.post(&author.user, "Для подписчиков", None).await;

    let response = app.get("/profile/auth/follow/", Some(&follower)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/follow/");
    assert!(app.db.is_following(follower.user.id, author.user.id).await.unwrap());

    let again = app.post_form("/profile/auth/follow/", Some(&follower), "").await;
    assert_eq!(location(&again), "/follow/");
    assert_eq!(app.db.fetch_follow_counts(author.user.id).await.unwrap(), (1, 0));

    let feed = json(app.get("/follow/", Some(&follower)).await).await;
    assert_eq!(object_list(&feed)[0]["text"], "Для подписчиков");
    let feed = json(app.get("/follow/", Some(&stranger)).await).await;
    assert!(object_list(&feed).is_empty());

    let profile = json(app.get("/profile/auth/", Some(&follower)).await).await;
    assert_eq!(profile["following"], true);
    assert_eq!(profile["followers_count"], 1);

    let response = app.get("/profile/auth/unfollow/", Some(&follower)).await;
    assert_eq!(location(&response), "/follow/");
    assert!(!app.db.is_following(follower.user.id, author.user.id).await.unwrap());
    let feed = json(app.get("/follow/", Some(&follower)).await).await;
    assert!(object_list(&feed).is_empty());
}

#[tokio::test]
async fn cannot_follow_self() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;

    let response = app.get("/profile/auth/follow/", Some(&author)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/follow/");
    assert!(!app.db.is_following(author.user.id, author.user.id).await.unwrap());
}

fn session_cookie(response: &Response<Body>) -> Cookie<'static> {
    let header = response.headers()[SET_COOKIE].to_str().unwrap().to_owned();
    Cookie::parse(header).unwrap()
}

#[tokio::test]
async fn signup_login_logout() {
    let app = TestApp::new().await;
    app.user("taken").await;

    let response = app
        .post_form("/auth/signup/", None, "username=taken&password=password123")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let context = json(response).await;
    assert_eq!(
        context["form"]["errors"]["username"][0],
        "A user with that username already exists."
    );

    let response = app
        .post_form("/auth/signup/", None, "username=leo&password=short")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let context = json(response).await;
    assert!(context["form"]["errors"]["password"][0].is_string());
    assert!(context["form"].get("password").is_none());

    let response = app
        .post_form("/auth/signup/", None, "username=leo&password=password123")
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");
    assert_eq!(session_cookie(&response).name(), "auth_token");

    let response = app
        .post_form("/auth/login/", None, "username=leo&password=wrongpass")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let context = json(response).await;
    assert!(context["form"]["errors"]["__all__"][0].is_string());

    let response = app
        .post_form(
            "/auth/login/",
            None,
            "username=leo&password=password123&next=%2Fcreate%2F",
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/create/");
    let cookie = session_cookie(&response);
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.path(), Some("/"));
    let cookie_header = format!("{}={}", cookie.name(), cookie.value());

    let with_cookie = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(COOKIE, &cookie_header)
            .body(Body::empty())
            .unwrap()
    };
    let response = app.send(with_cookie("/create/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(with_cookie("/auth/logout/")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");
    assert_eq!(session_cookie(&response).value(), "");

    let response = app.send(with_cookie("/create/")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), login_redirect("/create/"));
}

#[tokio::test]
async fn login_ignores_foreign_next() {
    let app = TestApp::new().await;
    app.user("auth").await;

    let foreign = [
        "https%3A%2F%2Fevil.example%2F",
        "%2F%2Fevil.example%2F",
        "%2F%09%2Fevil.example%2F",
        "%2Fa%0Ab",
    ];
    for next in foreign {
        let body = format!("username=auth&password=password123&next={next}");
        let response = app.post_form("/auth/login/", None, &body).await;
        assert_eq!(response.status(), StatusCode::FOUND, "{next}");
        assert_eq!(location(&response), "/", "{next}");
    }

    let response = app
        .post_form(
            "/auth/login/",
            None,
            "username=auth&password=password123&next=%2Ffollow%2F%3Fpage%3D2",
        )
        .await;
    assert_eq!(location(&response), "/follow/?page=2");

    let context = json(app.get("/auth/login/?next=/follow/", None).await).await;
    assert_eq!(context["form"]["next"], "/follow/");
}

#[tokio::test]
async fn malformed_form_is_bad_request() {
    let app = TestApp::new().await;
    let author = app.user("auth").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/create/")
        .header(AUTHORIZATION, format!("Bearer {}", author.token))
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("text"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["status"], 400);
}

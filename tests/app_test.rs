//! End-to-end tests against a running server
//!
//! Tests cover:
//! - Registration, login, logout and their flash notices
//! - Upload, timeline, comments and the single post page
//! - CSRF enforcement on state-changing forms
//! - Image serving with the extension/MIME cross-check
//! - Admin banning and store reset
//! - Profiles, pager and static files

use rusqlite::params;
use tempfile::TempDir;

use iscogram::auth::password::calculate_passhash;
use iscogram::config::Config;
use iscogram::db::queries;
use iscogram::state::AppState;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9];

struct TestApp {
    base: String,
    state: AppState,
    _tmp: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn count(&self, sql: &str) -> i64 {
        let conn = self.state.db.get().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }
}

async fn spawn_app() -> TestApp {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    let state = iscogram::build_state(config).await.unwrap();
    let app = iscogram::routes::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base: format!("http://{}", addr),
        state,
        _tmp: tmp,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().cookie_store(true).build().unwrap()
}

/// Pull the first CSRF token out of a rendered form.
fn csrf_token(html: &str) -> String {
    let marker = r#"name="csrf_token" value=""#;
    let start = html.find(marker).expect("page has a csrf field") + marker.len();
    let end = html[start..].find('"').unwrap();
    html[start..start + end].to_string()
}

async fn register(app: &TestApp, client: &reqwest::Client, account: &str, password: &str) -> reqwest::Response {
    client
        .post(app.url("/register"))
        .form(&[("account_name", account), ("password", password)])
        .send()
        .await
        .unwrap()
}

async fn login(app: &TestApp, client: &reqwest::Client, account: &str, password: &str) -> reqwest::Response {
    client
        .post(app.url("/login"))
        .form(&[("account_name", account), ("password", password)])
        .send()
        .await
        .unwrap()
}

async fn upload(
    app: &TestApp,
    client: &reqwest::Client,
    csrf: &str,
    data: Vec<u8>,
    mime: &str,
    body: &str,
) -> reqwest::Response {
    let file = reqwest::multipart::Part::bytes(data)
        .file_name("upload")
        .mime_str(mime)
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("csrf_token", csrf.to_string())
        .text("body", body.to_string())
        .part("file", file);
    client
        .post(app.url("/"))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn get_text(app: &TestApp, client: &reqwest::Client, path: &str) -> String {
    client.get(app.url(path)).send().await.unwrap().text().await.unwrap()
}

/// Register, log in and return the CSRF token from the index page.
async fn signed_in(app: &TestApp, client: &reqwest::Client, account: &str) -> String {
    let resp = register(app, client, account, "password1").await;
    assert_eq!(resp.url().path(), "/");
    csrf_token(&get_text(app, client, "/").await)
}

fn post_id_from(resp: &reqwest::Response) -> i64 {
    resp.url()
        .path()
        .strip_prefix("/posts/")
        .expect("redirected to the new post")
        .parse()
        .unwrap()
}

// ============================================================================
// FULL SCENARIO
// ============================================================================

#[tokio::test]
async fn register_upload_and_comment() {
    let app = spawn_app().await;
    let alice = client();

    let resp = register(&app, &alice, "alice123", "password1").await;
    assert!(resp.status().is_success());
    assert_eq!(resp.url().path(), "/");

    // Log out and back in to exercise the login path too.
    alice.get(app.url("/logout")).send().await.unwrap();
    let resp = login(&app, &alice, "alice123", "password1").await;
    assert_eq!(resp.url().path(), "/");

    let index = resp.text().await.unwrap();
    assert!(index.contains("alice123"));
    let csrf = csrf_token(&index);
    assert_eq!(csrf.len(), 32);

    let resp = upload(&app, &alice, &csrf, JPEG.to_vec(), "image/jpeg", "hello").await;
    assert!(resp.status().is_success());
    let post_id = post_id_from(&resp);

    let index = get_text(&app, &alice, "/").await;
    assert!(index.contains("hello"));
    assert!(index.contains(&format!("/image/{}.jpg", post_id)));
    assert!(index.contains("comments: <b>0</b>"));

    let resp = alice
        .post(app.url("/comment"))
        .form(&[
            ("post_id", post_id.to_string()),
            ("comment", "nice!".to_string()),
            ("csrf_token", csrf.clone()),
        ])
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.url().path(), format!("/posts/{}", post_id));

    let page = resp.text().await.unwrap();
    assert!(page.contains("comments: <b>1</b>"));
    assert!(page.contains(r#"<span class="isu-comment-text">nice!</span>"#));
}

#[tokio::test]
async fn anonymous_visitor_sees_posts_without_forms() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;
    upload(&app, &alice, &csrf, JPEG.to_vec(), "image/jpeg", "public caption").await;

    let anonymous = client();
    let index = get_text(&app, &anonymous, "/").await;
    assert!(index.contains("public caption"));
    assert!(index.contains(r#"href="/login""#));
    assert!(!index.contains("csrf_token"));
}

// ============================================================================
// ACCOUNTS
// ============================================================================

#[tokio::test]
async fn login_failure_leaves_a_notice() {
    let app = spawn_app().await;
    register(&app, &client(), "alice123", "password1").await;

    let visitor = client();
    let resp = login(&app, &visitor, "alice123", "wrongpass").await;
    assert_eq!(resp.url().path(), "/login");
    assert!(resp
        .text()
        .await
        .unwrap()
        .contains("Account name or password is incorrect"));

    // The notice is shown once.
    let again = get_text(&app, &visitor, "/login").await;
    assert!(!again.contains("Account name or password is incorrect"));
}

#[tokio::test]
async fn register_rejects_invalid_and_duplicate_accounts() {
    let app = spawn_app().await;

    let visitor = client();
    let resp = register(&app, &visitor, "ab", "password1").await;
    assert_eq!(resp.url().path(), "/register");
    assert!(resp.text().await.unwrap().contains("at least 3 characters"));

    let resp = register(&app, &visitor, "alice123", "short").await;
    assert_eq!(resp.url().path(), "/register");

    register(&app, &client(), "alice123", "password1").await;
    let resp = register(&app, &visitor, "alice123", "password2").await;
    assert_eq!(resp.url().path(), "/register");
    assert!(resp.text().await.unwrap().contains("already taken"));

    assert_eq!(app.count("SELECT COUNT(*) FROM users"), 1);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = spawn_app().await;
    let alice = client();
    signed_in(&app, &alice, "alice123").await;

    let resp = alice.get(app.url("/logout")).send().await.unwrap();
    assert_eq!(resp.url().path(), "/");
    let index = resp.text().await.unwrap();
    assert!(index.contains(r#"href="/login""#));
    assert!(!index.contains("/logout"));
}

// ============================================================================
// UPLOADS AND IMAGES
// ============================================================================

#[tokio::test]
async fn oversized_upload_is_rejected_with_notice() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;

    let big = vec![0u8; 15 * 1024 * 1024];
    let resp = upload(&app, &alice, &csrf, big, "image/jpeg", "too big").await;
    assert!(resp.status().is_success());
    assert_eq!(resp.url().path(), "/");
    assert!(resp.text().await.unwrap().contains("The file is too large"));

    assert_eq!(app.count("SELECT COUNT(*) FROM posts"), 0);
}

#[tokio::test]
async fn upload_over_body_limit_is_rejected_with_notice() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;

    let limit = app.state.config.storage.body_limit_bytes;
    let huge = vec![0u8; limit + 8 * 1024 * 1024];
    let resp = upload(&app, &alice, &csrf, huge, "image/jpeg", "way too big").await;
    assert!(resp.status().is_success());
    assert_eq!(resp.url().path(), "/");
    assert!(resp.text().await.unwrap().contains("The file is too large"));

    assert_eq!(app.count("SELECT COUNT(*) FROM posts"), 0);
}

#[tokio::test]
async fn unsupported_type_is_rejected_with_notice() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;

    let resp = upload(&app, &alice, &csrf, b"%PDF-1.4".to_vec(), "application/pdf", "doc").await;
    assert_eq!(resp.url().path(), "/");
    assert!(resp
        .text()
        .await
        .unwrap()
        .contains("Only jpg, png and gif images can be posted"));
    assert_eq!(app.count("SELECT COUNT(*) FROM posts"), 0);
}

#[tokio::test]
async fn upload_requires_login_and_csrf() {
    let app = spawn_app().await;

    let anonymous = client();
    let resp = upload(&app, &anonymous, "", JPEG.to_vec(), "image/jpeg", "x").await;
    assert_eq!(resp.url().path(), "/login");

    let alice = client();
    signed_in(&app, &alice, "alice123").await;
    let resp = upload(&app, &alice, "not-the-token", JPEG.to_vec(), "image/jpeg", "x").await;
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.count("SELECT COUNT(*) FROM posts"), 0);
}

#[tokio::test]
async fn image_is_served_with_matching_extension_only() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;
    let resp = upload(&app, &alice, &csrf, JPEG.to_vec(), "image/jpeg", "pic").await;
    let post_id = post_id_from(&resp);

    let mirror = app.state.images.dir().join(format!("{}.jpg", post_id));
    assert!(mirror.exists());
    std::fs::remove_file(&mirror).unwrap();

    let resp = client()
        .get(app.url(&format!("/image/{}.jpg", post_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), JPEG);

    // Reads restore a missing mirror.
    assert_eq!(std::fs::read(&mirror).unwrap(), JPEG);

    for path in [
        format!("/image/{}.png", post_id),
        format!("/image/{}.jpeg", post_id),
        format!("/image/{}.jpg", post_id + 100),
        "/image/abc.jpg".to_string(),
    ] {
        let resp = client().get(app.url(&path)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND, "{}", path);
    }
}

// ============================================================================
// COMMENTS AND POSTS
// ============================================================================

#[tokio::test]
async fn comment_with_wrong_csrf_returns_422() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;
    let post_id = post_id_from(&upload(&app, &alice, &csrf, JPEG.to_vec(), "image/jpeg", "hi").await);

    let resp = alice
        .post(app.url("/comment"))
        .form(&[
            ("post_id", post_id.to_string()),
            ("comment", "sneaky".to_string()),
            ("csrf_token", "0".repeat(32)),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    assert!(resp.text().await.unwrap().is_empty());
    assert_eq!(app.count("SELECT COUNT(*) FROM comments"), 0);
}

#[tokio::test]
async fn unknown_post_is_404() {
    let app = spawn_app().await;
    for path in ["/posts/999", "/posts/abc"] {
        let resp = client().get(app.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn pager_returns_older_posts() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;
    upload(&app, &alice, &csrf, JPEG.to_vec(), "image/jpeg", "paged caption").await;

    let resp = client()
        .get(app.url("/posts"))
        .query(&[("max_created_at", "2999-01-01T00:00:00+00:00")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let fragment = resp.text().await.unwrap();
    assert!(fragment.contains("paged caption"));
    assert!(!fragment.contains("<html>"));

    let resp = client()
        .get(app.url("/posts"))
        .query(&[("max_created_at", "2000-01-01T00:00:00+00:00")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let resp = client()
        .get(app.url("/posts?max_created_at=yesterday"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client().get(app.url("/posts")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(resp.text().await.unwrap().is_empty());
}

// ============================================================================
// PROFILES AND STATIC FILES
// ============================================================================

#[tokio::test]
async fn profile_shows_posts_and_counts() {
    let app = spawn_app().await;
    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;
    let post_id = post_id_from(&upload(&app, &alice, &csrf, JPEG.to_vec(), "image/jpeg", "mine").await);

    let bob = client();
    let bob_csrf = signed_in(&app, &bob, "bob_the_2nd").await;
    bob.post(app.url("/comment"))
        .form(&[
            ("post_id", post_id.to_string()),
            ("comment", "hey".to_string()),
            ("csrf_token", bob_csrf),
        ])
        .send()
        .await
        .unwrap();

    let page = get_text(&app, &client(), "/@alice123").await;
    assert!(page.contains("mine"));
    assert!(page.contains(r#"<span class="isu-post-count">1</span>"#));
    assert!(page.contains(r#"<span class="isu-comment-count">0</span>"#));
    assert!(page.contains(r#"<span class="isu-commented-count">1</span>"#));

    let resp = client().get(app.url("/@nobody_here")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn public_files_are_served_as_fallback() {
    let app = spawn_app().await;
    let css_dir = app.state.config.public_dir().join("css");
    std::fs::create_dir_all(&css_dir).unwrap();
    std::fs::write(css_dir.join("style.css"), "body { margin: 0; }").unwrap();

    let resp = client().get(app.url("/css/style.css")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "body { margin: 0; }");

    let resp = client().get(app.url("/missing.txt")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

// ============================================================================
// ADMINISTRATION
// ============================================================================

fn seed_admin(app: &TestApp, account: &str, password: &str) -> i64 {
    let conn = app.state.db.get().unwrap();
    let id = queries::insert_user(&conn, account, &calculate_passhash(account, password)).unwrap();
    conn.execute("UPDATE users SET authority = 1 WHERE id = ?1", params![id])
        .unwrap();
    id
}

#[tokio::test]
async fn non_admins_are_refused() {
    let app = spawn_app().await;

    let resp = client().get(app.url("/admin/banned")).send().await.unwrap();
    assert_eq!(resp.url().path(), "/login");

    let alice = client();
    signed_in(&app, &alice, "alice123").await;
    let resp = alice.get(app.url("/admin/banned")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_bans_and_initialize_restores() {
    let app = spawn_app().await;
    seed_admin(&app, "root_admin", "rootpass");

    let alice = client();
    let csrf = signed_in(&app, &alice, "alice123").await;
    let post_id = post_id_from(&upload(&app, &alice, &csrf, JPEG.to_vec(), "image/jpeg", "soon hidden").await);
    let alice_id: i64 = {
        let conn = app.state.db.get().unwrap();
        conn.query_row(
            "SELECT id FROM users WHERE account_name = 'alice123'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    };

    let admin = client();
    login(&app, &admin, "root_admin", "rootpass").await;
    let page = get_text(&app, &admin, "/admin/banned").await;
    assert!(page.contains(r#"data-account-name="alice123""#));
    assert!(!page.contains(r#"data-account-name="root_admin""#));
    let admin_csrf = csrf_token(&page);

    let resp = admin
        .post(app.url("/admin/banned"))
        .form(&[("uid[]", alice_id.to_string()), ("csrf_token", "wrong".to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    let resp = admin
        .post(app.url("/admin/banned"))
        .form(&[("uid[]", alice_id.to_string()), ("csrf_token", admin_csrf)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.url().path(), "/admin/banned");
    assert!(!resp.text().await.unwrap().contains("alice123"));

    // Listings hide the banned owner; the raw image stays reachable.
    assert!(!get_text(&app, &client(), "/").await.contains("soon hidden"));
    let resp = client().get(app.url(&format!("/posts/{}", post_id))).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let resp = client().get(app.url("/@alice123")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let resp = client()
        .get(app.url(&format!("/image/{}.jpg", post_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let resp = client().get(app.url("/initialize")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(app.count("SELECT COUNT(*) FROM users WHERE del_flg = 1"), 0);
    assert!(get_text(&app, &client(), "/").await.contains("soon hidden"));
}

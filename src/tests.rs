use actix_web::{http::StatusCode, test, web};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::build_app;
use crate::config::test_config;
use crate::store::{MemoryStore, MockUserStore, StoreError};
use crate::AppState;

fn state() -> web::Data<AppState> {
    let store = Arc::new(MemoryStore::new());
    web::Data::new(AppState::new(test_config(), store.clone(), store))
}

fn post(uri: &str, ip: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header(("X-Forwarded-For", ip.to_string()))
        .set_json(body)
}

fn get(uri: &str, ip: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .insert_header(("X-Forwarded-For", ip.to_string()))
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

fn header(res: &actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>, name: &str) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[actix_web::test]
async fn repeated_bad_passwords_block_the_ip() {
    let app = test::init_service(build_app(state())).await;
    let ip = "1.2.3.4";

    let res = test::call_service(
        &app,
        post(
            "/auth/register",
            ip,
            json!({"name": "Zhang", "email": "zhang@example.com", "password": "correct-horse"}),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    for _ in 0..5 {
        let res = test::call_service(
            &app,
            post("/auth/login", ip, json!({"email": "zhang@example.com", "password": "wrong"}))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(res).await;
        assert!(body["error"].is_string());
        assert!(body["message"].is_string());
    }

    // 正确的凭据也会被拒绝
    let res = test::call_service(
        &app,
        post(
            "/auth/login",
            ip,
            json!({"email": "zhang@example.com", "password": "correct-horse"}),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = test::read_body_json(res).await;
    let first = body["remainingSeconds"].as_i64().unwrap();
    assert!((299..=300).contains(&first), "remainingSeconds = {}", first);
    assert!(body["message"].is_string());

    actix_web::rt::time::sleep(std::time::Duration::from_millis(1100)).await;
    let res = test::call_service(
        &app,
        post("/auth/login", ip, json!({"email": "zhang@example.com", "password": "x"})).to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = test::read_body_json(res).await;
    assert!(body["remainingSeconds"].as_i64().unwrap() < first);

    // 其他 IP 不受影响
    let res = test::call_service(
        &app,
        post(
            "/auth/login",
            "5.6.7.8",
            json!({"email": "zhang@example.com", "password": "correct-horse"}),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn successful_login_resets_failure_count() {
    let app = test::init_service(build_app(state())).await;
    let ip = "10.1.1.1";
    let creds = json!({"email": "wang@example.com", "password": "right-password"});
    let wrong = json!({"email": "wang@example.com", "password": "nope"});

    test::call_service(
        &app,
        post(
            "/auth/register",
            ip,
            json!({"name": "Wang", "email": "wang@example.com", "password": "right-password"}),
        )
        .to_request(),
    )
    .await;

    for _ in 0..4 {
        let res = test::call_service(&app, post("/auth/login", ip, wrong.clone()).to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
    let res = test::call_service(&app, post("/auth/login", ip, creds).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 86_400);

    for _ in 0..4 {
        let res = test::call_service(&app, post("/auth/login", ip, wrong.clone()).to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}

#[actix_web::test]
async fn global_limiter_blocks_twenty_first_request() {
    let app = test::init_service(build_app(state())).await;

    for i in 1..=20u32 {
        let res = test::call_service(&app, get("/health", "9.9.9.9").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header(&res, "x-ratelimit-limit").as_deref(), Some("20"));
        assert_eq!(header(&res, "x-ratelimit-remaining"), Some((20 - i).to_string()));
    }

    let res = test::call_service(&app, get("/health", "9.9.9.9").to_request()).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&res, "retry-after").as_deref(), Some("30"));
    // 拦截响应同样带加固头
    assert_eq!(header(&res, "x-frame-options").as_deref(), Some("DENY"));
    assert!(header(&res, "x-ratelimit-remaining").is_none());
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["remainingSeconds"], 30);

    // 任意路由都被拦截
    let res = test::call_service(
        &app,
        post("/auth/login", "9.9.9.9", json!({"email": "a@b.co", "password": "x"})).to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    let res = test::call_service(&app, get("/health", "8.8.8.8").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn disabled_limiter_adds_no_headers() {
    let mut config = test_config();
    config.rate_limit.enabled = false;
    let store = Arc::new(MemoryStore::new());
    let state = web::Data::new(AppState::new(config, store.clone(), store));
    let app = test::init_service(build_app(state)).await;

    for _ in 0..25 {
        let res = test::call_service(&app, get("/health", "9.9.9.9").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(header(&res, "x-ratelimit-limit").is_none());
    }
}

#[actix_web::test]
async fn register_validates_and_rejects_duplicates() {
    let app = test::init_service(build_app(state())).await;
    let ip = "3.3.3.3";

    let res = test::call_service(
        &app,
        post(
            "/auth/register",
            ip,
            json!({"name": "Li", "email": "not-an-email", "password": "secret1"}),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/register")
            .insert_header(("X-Forwarded-For", ip))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"name\": ")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "Bad Request");

    let user = json!({"name": "Li", "email": "li@example.com", "password": "secret1"});
    let res = test::call_service(&app, post("/auth/register", ip, user.clone()).to_request()).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["email"], "li@example.com");
    assert!(body.get("password_hash").is_none());

    let res = test::call_service(&app, post("/auth/register", ip, user).to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// 注册并登录，返回令牌
macro_rules! register_and_login {
    ($app:expr, $ip:expr, $email:expr) => {{
        let res = test::call_service(
            $app,
            post(
                "/auth/register",
                $ip,
                json!({"name": "Reader", "email": $email, "password": "password1"}),
            )
            .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = test::call_service(
            $app,
            post("/auth/login", $ip, json!({"email": $email, "password": "password1"})).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = test::read_body_json(res).await;
        body["token"].as_str().unwrap().to_string()
    }};
}

#[actix_web::test]
async fn token_gates_protected_routes() {
    let app = test::init_service(build_app(state())).await;
    let ip = "4.4.4.4";
    let token = register_and_login!(&app, ip, "chen@example.com");

    let res = test::call_service(&app, get("/auth/me", ip).insert_header(bearer(&token)).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["roles"], json!(["user"]));
    assert_eq!(body["email"], "chen@example.com");

    let res = test::call_service(&app, get("/auth/me", ip).to_request()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = test::call_service(
        &app,
        get("/auth/me", ip).insert_header(bearer("abc.def.ghi")).to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // 公开路由带无效令牌仍可访问
    let res = test::call_service(
        &app,
        get("/documents", ip).insert_header(bearer("abc.def.ghi")).to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn document_lifecycle_with_ownership() {
    let app = test::init_service(build_app(state())).await;
    let ip = "6.6.6.6";
    let owner = register_and_login!(&app, ip, "owner@example.com");
    let other = register_and_login!(&app, ip, "other@example.com");

    let res = test::call_service(
        &app,
        post(
            "/documents",
            ip,
            json!({
                "title": "高等数学期末复习",
                "description": "<p>第一章</p><script>steal()</script>",
                "category": "university",
                "fileName": "calculus.pdf",
                "storageUrl": "https://firebasestorage.googleapis.com/v0/b/docs/o/calculus.pdf"
            }),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = test::call_service(
        &app,
        post(
            "/documents",
            ip,
            json!({
                "title": "高等数学期末复习",
                "description": "<p>第一章</p><script>steal()</script>",
                "category": "university",
                "fileName": "calculus.pdf",
                "storageUrl": "https://firebasestorage.googleapis.com/v0/b/docs/o/calculus.pdf"
            }),
        )
        .insert_header(bearer(&owner))
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let doc: Value = test::read_body_json(res).await;
    assert_eq!(doc["description"], "<p>第一章</p>");
    assert_eq!(doc["contentType"], "application/pdf");
    let id = doc["id"].as_str().unwrap().to_string();

    let listed: Value = test::call_and_read_body_json(
        &app,
        get("/documents?category=university", ip).to_request(),
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let listed: Value =
        test::call_and_read_body_json(&app, get("/documents?category=vocational", ip).to_request()).await;
    assert!(listed.as_array().unwrap().is_empty());

    let res = test::call_service(&app, get("/documents?category=kindergarten", ip).to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/documents/{}", id))
            .insert_header(("X-Forwarded-For", ip))
            .insert_header(bearer(&other))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/documents/{}", id))
            .insert_header(("X-Forwarded-For", ip))
            .insert_header(bearer(&owner))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = test::call_service(&app, get(&format!("/documents/{}", id), ip).to_request()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn unknown_route_is_json_404_with_hardening_headers() {
    let app = test::init_service(build_app(state())).await;
    let res = test::call_service(&app, get("/nowhere", "2.2.2.2").to_request()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&res, "x-content-type-options").as_deref(), Some("nosniff"));
    assert!(header(&res, "content-security-policy").is_some());
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "Not Found");
}

#[actix_web::test]
async fn unexpected_failure_becomes_generic_500_with_path() {
    let mut users = MockUserStore::new();
    users
        .expect_find_by_email()
        .returning(|_| Err(StoreError::Backend("pool timed out at 10.0.0.5".to_string())));
    let state = web::Data::new(AppState::new(
        test_config(),
        Arc::new(users),
        Arc::new(MemoryStore::new()),
    ));
    let app = test::init_service(build_app(state)).await;

    let res = test::call_service(
        &app,
        post("/auth/login", "1.1.1.1", json!({"email": "a@example.com", "password": "pw"})).to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header(&res, "x-frame-options").as_deref(), Some("DENY"));
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], 500);
    assert_eq!(body["path"], "/auth/login");
    assert!(body["timestamp"].is_string());
    assert!(body["message"].is_string());
    assert!(!body.to_string().contains("10.0.0.5"));
}

#[actix_web::test]
async fn storage_url_with_query_round_trips_verbatim() {
    let app = test::init_service(build_app(state())).await;
    let ip = "11.11.11.11";
    let token = register_and_login!(&app, ip, "url@example.com");
    let url = "https://firebasestorage.googleapis.com/v0/b/docs/o/a.pdf?alt=media&token=abc";

    let res = test::call_service(
        &app,
        post(
            "/documents",
            ip,
            json!({
                "title": "Tom & Jerry notes",
                "category": "other",
                "fileName": "a.pdf",
                "storageUrl": url
            }),
        )
        .insert_header(bearer(&token))
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let doc: Value = test::read_body_json(res).await;
    assert_eq!(doc["storageUrl"], url);
    assert_eq!(doc["title"], "Tom & Jerry notes");

    let id = doc["id"].as_str().unwrap().to_string();
    let fetched: Value =
        test::call_and_read_body_json(&app, get(&format!("/documents/{}", id), ip).to_request()).await;
    assert_eq!(fetched["storageUrl"], url);
}

#[actix_web::test]
async fn password_with_ampersands_registers_and_logs_in() {
    let app = test::init_service(build_app(state())).await;
    let ip = "12.12.12.12";
    let password = format!("&&{}", "a".repeat(68));

    let res = test::call_service(
        &app,
        post(
            "/auth/register",
            ip,
            json!({"name": "Amp", "email": "amp@example.com", "password": password}),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = test::call_service(
        &app,
        post("/auth/login", ip, json!({"email": "amp@example.com", "password": password})).to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    // 转义后的形式不是同一个密码
    let res = test::call_service(
        &app,
        post(
            "/auth/login",
            ip,
            json!({"email": "amp@example.com", "password": format!("&amp;&amp;{}", "a".repeat(68))}),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn oversized_body_is_rejected_with_400() {
    let app = test::init_service(build_app(state())).await;
    let res = test::call_service(
        &app,
        post(
            "/auth/register",
            "13.13.13.13",
            json!({"name": "x".repeat(100 * 1024), "email": "big@example.com", "password": "secret1"}),
        )
        .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&res, "x-content-type-options").as_deref(), Some("nosniff"));
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "Bad Request");
}

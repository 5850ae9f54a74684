use api::{AppState, router};
use axum::Router;
use axum::body::Body;
use course_core::model::Role;
use course_core::time::fixed_clock;
use http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use services::{AppServices, AuthSettings, ServiceConfig};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    services: AppServices,
}

fn test_app() -> TestApp {
    let mut config = ServiceConfig::new("http-test-secret");
    config.clock = fixed_clock();
    config.auth = AuthSettings {
        bcrypt_cost: 4,
        ..AuthSettings::default()
    };
    let services = AppServices::in_memory(config);
    let state = AppState::new(services.clone(), fixed_clock());
    TestApp {
        router: router(state, Vec::new()),
        services,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn admin_token(&self) -> String {
        self.services
            .auth()
            .create_account("admin@example.com", "Admin", "adminpass1", Role::Admin)
            .await
            .unwrap();
        self.login("admin@example.com", "adminpass1").await
    }

    async fn learner_token(&self, email: &str) -> String {
        let (status, _) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "name": "Learner", "password": "learnpass1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        self.login(email, "learnpass1").await
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn published_course(&self, admin: &str) -> Value {
        let (status, course) = self
            .send(
                Method::POST,
                "/api/admin/courses",
                Some(admin),
                Some(json!({
                    "title": "Async Rust",
                    "price_cents": 2500,
                    "chapters": [
                        { "title": "Futures" },
                        { "title": "Executors" }
                    ],
                    "quizzes": [{
                        "title": "Final exam",
                        "is_final": true,
                        "questions": [{
                            "prompt": "What does poll return?",
                            "options": ["Poll", "Option"],
                            "correct_option": 0
                        }]
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/admin/courses/{}/publish", course["id"]);
        let (status, course) = self
            .send(
                Method::POST,
                &uri,
                Some(admin),
                Some(json!({ "published": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        course
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app();
    let (status, body) = app.send(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = test_app();
    let (status, body) = app.send(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app
        .send(Method::GET, "/api/auth/me", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_sets_http_only_cookie_that_authenticates() {
    let app = test_app();
    app.learner_token("cookie@example.com").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "cookie@example.com", "password": "learnpass1" }).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    let pair = set_cookie.split(';').next().unwrap().to_string();
    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::COOKIE, pair)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_registration_conflicts_and_weak_password_is_rejected() {
    let app = test_app();
    app.learner_token("dup@example.com").await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "DUP@example.com", "name": "Again", "password": "learnpass1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "weak@example.com", "name": "Weak", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn admin_routes_reject_learners() {
    let app = test_app();
    let learner = app.learner_token("nosy@example.com").await;
    let (status, body) = app
        .send(Method::GET, "/api/admin/users", Some(&learner), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn purchase_progress_and_certificate_over_http() {
    let app = test_app();
    let admin = app.admin_token().await;
    let course = app.published_course(&admin).await;
    let course_id = &course["id"];
    let chapters: Vec<Value> = course["chapters"].as_array().unwrap().clone();
    let quiz_id = &course["quizzes"][0]["id"];

    let learner = app.learner_token("student@example.com").await;

    let (status, listed) = app.send(Method::GET, "/api/courses", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, detail) = app
        .send(Method::GET, &format!("/api/courses/{course_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail["quizzes"][0].get("questions").is_none());

    let first_chapter = format!(
        "/api/courses/{course_id}/chapters/{}/complete",
        chapters[0]["id"]
    );
    let (status, body) = app
        .send(Method::POST, &first_chapter, Some(&learner), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, receipt) = app
        .send(
            Method::POST,
            &format!("/api/courses/{course_id}/purchase"),
            Some(&learner),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["amount_cents"], 2500);

    for chapter in &chapters {
        let uri = format!(
            "/api/courses/{course_id}/chapters/{}/complete",
            chapter["id"]
        );
        let (status, _) = app.send(Method::POST, &uri, Some(&learner), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, progress) = app
        .send(
            Method::GET,
            &format!("/api/courses/{course_id}/progress"),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["completion_percentage"], 67);

    let (status, quiz) = app
        .send(
            Method::GET,
            &format!("/api/courses/{course_id}/quizzes/{quiz_id}"),
            Some(&learner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(quiz["questions"][0].get("correct_option").is_none());

    let (status, submission) = app
        .send(
            Method::POST,
            &format!("/api/courses/{course_id}/quizzes/{quiz_id}/submit"),
            Some(&learner),
            Some(json!({ "answers": [0] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submission["completion_percentage"], 100);
    assert_eq!(submission["is_completed"], true);
    let certificate_id = submission["certificate"]["id"].as_str().unwrap().to_string();

    let (status, record) = app
        .send(
            Method::GET,
            &format!("/api/certificates/{certificate_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["course_title"], "Async Rust");

    let (status, notifications) = app
        .send(Method::GET, "/api/notifications", Some(&learner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notifications["unread_count"], 2);

    let (status, marked) = app
        .send(Method::POST, "/api/notifications/read-all", Some(&learner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["updated"], 2);
}

#[tokio::test]
async fn submitted_score_out_of_range_is_a_validation_error() {
    let app = test_app();
    let admin = app.admin_token().await;
    let course = app.published_course(&admin).await;
    let learner = app.learner_token("range@example.com").await;
    let course_id = &course["id"];
    let quiz_id = &course["quizzes"][0]["id"];
    app.send(
        Method::POST,
        &format!("/api/courses/{course_id}/purchase"),
        Some(&learner),
        Some(json!({})),
    )
    .await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/courses/{course_id}/quizzes/{quiz_id}/submit"),
            Some(&learner),
            Some(json!({ "score": 150, "passed": true })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn promo_code_redemption_grants_course_once() {
    let app = test_app();
    let admin = app.admin_token().await;
    let course = app.published_course(&admin).await;
    let course_id = course["id"].clone();

    let (status, promo) = app
        .send(
            Method::POST,
            "/api/admin/promo-codes",
            Some(&admin),
            Some(json!({
                "code": "freebie",
                "discount_percent": 100,
                "course_id": course_id,
                "max_uses": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(promo["code"], "FREEBIE");
    assert_eq!(promo["status"], "active");

    let first = app.learner_token("one@example.com").await;
    let second = app.learner_token("two@example.com").await;

    let (status, quote) = app
        .send(
            Method::POST,
            "/api/promo-codes/validate",
            Some(&first),
            Some(json!({ "code": "FREEBIE" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["discounted_price_cents"], 0);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/promo-codes/redeem",
            Some(&first),
            Some(json!({ "code": "freebie" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/promo-codes/redeem",
            Some(&second),
            Some(json!({ "code": "freebie" })),
        )
        .await;
    assert!(status.is_client_error());

    let (status, mine) = app
        .send(Method::GET, "/api/me/courses", Some(&first), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine[0]["course"]["id"], course_id);
}

#[tokio::test]
async fn admin_user_management() {
    let app = test_app();
    let admin = app.admin_token().await;
    let learner = app.learner_token("managed@example.com").await;

    let (_, me) = app
        .send(Method::GET, "/api/auth/me", Some(&learner), None)
        .await;
    let learner_id = me["id"].clone();
    let (_, admin_me) = app
        .send(Method::GET, "/api/auth/me", Some(&admin), None)
        .await;
    let admin_id = admin_me["id"].clone();

    let (status, updated) = app
        .send(
            Method::PUT,
            &format!("/api/admin/users/{learner_id}/role"),
            Some(&admin),
            Some(json!({ "role": "instructor" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "instructor");

    let (status, body) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/users/{admin_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/admin/users/{learner_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/api/admin/users/{learner_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::Duration;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use hush_db::{Database, PageCursor, PageRequest};

use crate::error::{INVALID_CREDENTIALS, INVALID_TOKEN};
use crate::push::{BatchResponse, FcmClient, MulticastMessage, PushProvider, SendOutcome};
use crate::router::build_router;
use crate::sending::MAX_MESSAGE_BYTES;
use crate::state::{AppState, AppStateInner};
use crate::telemetry::LoopMonitor;
use crate::tokens::{TokenConfig, TokenService};

const PASSWORD: &str = "correct horse battery staple";

#[derive(Default)]
struct ScriptedPush {
    reject: Vec<String>,
    fail: bool,
    sent: Mutex<Vec<MulticastMessage>>,
}

impl PushProvider for ScriptedPush {
    fn send_multicast<'a>(
        &'a self,
        message: &'a MulticastMessage,
    ) -> BoxFuture<'a, anyhow::Result<BatchResponse>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                anyhow::bail!("provider unreachable");
            }
            let responses = message
                .tokens
                .iter()
                .map(|t| {
                    if self.reject.contains(t) {
                        SendOutcome::Rejected("UNREGISTERED".into())
                    } else {
                        SendOutcome::Delivered
                    }
                })
                .collect();
            Ok(BatchResponse { responses })
        })
    }
}

struct TestApp {
    _dir: TempDir,
    state: AppState,
    router: Router,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        Self::with_push(None)
    }

    fn with_push(push: Option<Arc<dyn PushProvider>>) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open_with_readers(&dir.path().join("hush.db"), 2).unwrap();
        let tokens =
            TokenService::new(TokenConfig::new("test-access-secret", "test-refresh-secret"))
                .unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db,
            tokens,
            push,
            monitor: LoopMonitor::new(),
            cookie_secure: false,
        });
        let router = build_router(state.clone());
        Self {
            _dir: dir,
            state,
            router,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(payload) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn signup(&self, id: &str) -> String {
        let resp = self
            .call(
                "POST",
                "/authentication/signup",
                None,
                Some(json!({ "id": id, "name": "Test User", "password": PASSWORD })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{:?}", resp.body);
        resp.body["access_token"].as_str().unwrap().to_owned()
    }

    async fn login(&self, id: &str, fcm_token: Option<&str>) -> TestResponse {
        self.call(
            "PATCH",
            "/authentication/login",
            None,
            Some(json!({ "id": id, "password": PASSWORD, "fcm_token": fcm_token })),
        )
        .await
    }

    async fn post_message(&self, to: &str, message: &str) -> StatusCode {
        let message = urlencoding::encode(message);
        self.call("POST", &format!("/sending/{to}?message={message}"), None, None)
            .await
            .status
    }

    async fn inbox(&self, token: &str, query: &str) -> Value {
        let resp = self
            .call("GET", &format!("/recieving/inbox{query}"), Some(token), None)
            .await;
        assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.body);
        resp.body
    }

    fn endpoints(&self, user_id: &str) -> Vec<String> {
        self.state.db.list_push_endpoints(user_id).unwrap()
    }
}

/// Serves `body` with `status` for every request, standing in for the FCM API.
async fn fcm_stub(status: StatusCode, body: Value) -> String {
    let app: Router = Router::new().fallback(move || {
        let body = body.clone();
        async move { (status, axum::Json(body)) }
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn fcm_error(code: u16, status: &str, error_code: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": "error",
            "status": status,
            "details": [{
                "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                "errorCode": error_code,
            }],
        }
    })
}

async fn fcm_app(status: StatusCode, body: Value) -> TestApp {
    let base_url = fcm_stub(status, body).await;
    let client = FcmClient::with_base_url(&base_url, "demo", "expired-token").unwrap();
    TestApp::with_push(Some(Arc::new(client) as Arc<dyn PushProvider>))
}

fn ids(inbox: &Value) -> Vec<i64> {
    inbox["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn health_check() {
    let app = TestApp::new();
    let resp = app.call("GET", "/", None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["health"], "Good");
}

#[tokio::test]
async fn signup_lowercases_and_rejects_duplicates() {
    let app = TestApp::new();
    let resp = app
        .call(
            "POST",
            "/authentication/signup",
            None,
            Some(json!({ "id": "AliCe", "password": PASSWORD })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["id"], "alice");
    assert_eq!(resp.body["token_type"], "bearer");

    let cookie = resp.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/authentication/refresh"));

    let again = app
        .call(
            "POST",
            "/authentication/signup",
            None,
            Some(json!({ "id": "ALICE", "password": "other" })),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert!(again.body["detail"].is_string());
}

#[tokio::test]
async fn send_then_mark_read() {
    let app = TestApp::new();
    let token = app.signup("alice").await;

    assert_eq!(app.post_message("alice", "hi").await, StatusCode::ACCEPTED);

    let inbox = app.inbox(&token, "").await;
    assert_eq!(inbox["message_count"], 1);
    assert_eq!(inbox["unread_count"], 1);
    let message = &inbox["messages"][0];
    assert_eq!(message["content"], "hi");
    assert_eq!(message["unread"], true);
    let id = message["id"].as_i64().unwrap();

    for _ in 0..2 {
        let resp = app
            .call("PATCH", &format!("/recieving/mark_read/{id}"), Some(&token), None)
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        let inbox = app.inbox(&token, "").await;
        assert_eq!(inbox["unread_count"], 0);
        assert_eq!(inbox["messages"][0]["unread"], false);
    }

    let resp = app
        .call("PATCH", &format!("/recieving/mark_unread/{id}"), Some(&token), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(app.inbox(&token, "").await["unread_count"], 1);

    let resp = app
        .call("DELETE", &format!("/recieving/delete_message/{id}"), Some(&token), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(app.inbox(&token, "").await["message_count"], 0);
}

#[tokio::test]
async fn recipient_lookup_and_unknown_recipient() {
    let app = TestApp::new();
    app.signup("alice").await;

    let resp = app.call("GET", "/sending/ALICE", None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["id"], "alice");
    assert_eq!(resp.body["name"], "Test User");

    let resp = app.call("GET", "/sending/nobody", None, None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    assert_eq!(app.post_message("nobody", "hi").await, StatusCode::BAD_REQUEST);
    // Recipient ids are case-insensitive on send too.
    assert_eq!(app.post_message("Alice", "hi").await, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn wrong_password_looks_like_unknown_user() {
    let app = TestApp::new();
    app.signup("alice").await;

    let wrong = app
        .call(
            "PATCH",
            "/authentication/login",
            None,
            Some(json!({ "id": "alice", "password": "nope" })),
        )
        .await;
    let missing = app
        .call(
            "PATCH",
            "/authentication/login",
            None,
            Some(json!({ "id": "bob", "password": "nope" })),
        )
        .await;

    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body, missing.body);
    assert_eq!(wrong.body["detail"], INVALID_CREDENTIALS);

    let ok = app.login("ALICE", None).await;
    assert_eq!(ok.status, StatusCode::ACCEPTED);
    assert_eq!(ok.body["name"], "Test User");
}

#[tokio::test]
async fn inbox_pagination() {
    let app = TestApp::new();
    let token = app.signup("alice").await;
    for i in 0..5 {
        assert_eq!(app.post_message("alice", &format!("m{i}")).await, StatusCode::ACCEPTED);
    }

    let all = ids(&app.inbox(&token, "?limit=0").await);
    assert_eq!(all.len(), 5);
    assert!(all.windows(2).all(|w| w[0] > w[1]), "newest first");

    app.call("PATCH", &format!("/recieving/mark_read/{}", all[4]), Some(&token), None)
        .await;

    let page = app.inbox(&token, "?limit=2").await;
    assert_eq!(ids(&page), all[..2].to_vec());
    assert_eq!(page["message_count"], 5);
    assert_eq!(page["unread_count"], 4);

    let keyset = app
        .inbox(&token, &format!("?limit=2&last_seen_id={}", all[1]))
        .await;
    assert_eq!(ids(&keyset), all[2..4].to_vec());

    let offset_wins = app
        .inbox(&token, &format!("?skip=4&limit=2&last_seen_id={}", all[0]))
        .await;
    assert_eq!(ids(&offset_wins), vec![all[4]]);
}

#[tokio::test]
async fn other_users_messages_are_invisible() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    app.post_message("bob", "for bob").await;
    let bob_id = ids(&app.inbox(&bob, "").await)[0];
    let missing_id = bob_id + 1000;

    for (method, path) in [
        ("PATCH", "mark_read"),
        ("PATCH", "mark_unread"),
        ("DELETE", "delete_message"),
    ] {
        let theirs = app
            .call(method, &format!("/recieving/{path}/{bob_id}"), Some(&alice), None)
            .await;
        let nothing = app
            .call(method, &format!("/recieving/{path}/{missing_id}"), Some(&alice), None)
            .await;
        assert_eq!(theirs.status, nothing.status);
        assert_eq!(theirs.body, nothing.body);
    }

    let theirs = app
        .call("GET", &format!("/recieving/get_message/{bob_id}"), Some(&alice), None)
        .await;
    let nothing = app
        .call("GET", &format!("/recieving/get_message/{missing_id}"), Some(&alice), None)
        .await;
    assert_eq!(theirs.status, StatusCode::NOT_FOUND);
    assert_eq!(theirs.body, nothing.body);

    let inbox = app.inbox(&bob, "").await;
    assert_eq!(inbox["message_count"], 1);
    assert_eq!(inbox["unread_count"], 1);

    let own = app
        .call("GET", &format!("/recieving/get_message/{bob_id}"), Some(&bob), None)
        .await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["content"], "for bob");
    assert_eq!(own.body["unread"], true);
}

#[tokio::test]
async fn rejected_push_endpoint_is_pruned() {
    let push = Arc::new(ScriptedPush {
        reject: vec!["stale-device".into()],
        ..Default::default()
    });
    let app = TestApp::with_push(Some(push.clone() as Arc<dyn PushProvider>));
    let token = app.signup("alice").await;
    app.login("alice", Some("live-device")).await;
    app.login("alice", Some("stale-device")).await;
    // Registering the same endpoint twice keeps one copy.
    app.login("alice", Some("live-device")).await;
    assert_eq!(app.endpoints("alice"), vec!["live-device", "stale-device"]);

    assert_eq!(app.post_message("alice", "ping").await, StatusCode::ACCEPTED);

    assert_eq!(app.endpoints("alice"), vec!["live-device"]);
    assert_eq!(app.inbox(&token, "").await["message_count"], 1);

    let sent = push.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tokens, vec!["live-device", "stale-device"]);
    assert_eq!(sent[0].data["user_id"], "alice");
    assert_eq!(sent[0].data["content"], "ping");
    assert!(sent[0].data.contains_key("time"));
}

#[tokio::test]
async fn push_failure_keeps_message_and_endpoints() {
    let push = Arc::new(ScriptedPush {
        fail: true,
        ..Default::default()
    });
    let app = TestApp::with_push(Some(push.clone() as Arc<dyn PushProvider>));
    let token = app.signup("alice").await;
    app.login("alice", Some("device")).await;

    assert_eq!(app.post_message("alice", "ping").await, StatusCode::ACCEPTED);

    assert_eq!(app.inbox(&token, "").await["message_count"], 1);
    assert_eq!(app.endpoints("alice"), vec!["device"]);
    assert_eq!(push.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn no_endpoints_means_no_push() {
    let push = Arc::new(ScriptedPush::default());
    let app = TestApp::with_push(Some(push.clone() as Arc<dyn PushProvider>));
    app.signup("alice").await;

    assert_eq!(app.post_message("alice", "ping").await, StatusCode::ACCEPTED);
    assert!(push.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn refresh_rotates_tokens() {
    let app = TestApp::new();
    app.signup("alice").await;
    let login = app.login("alice", None).await;
    let refresh_token = login.body["refresh_token"].as_str().unwrap().to_owned();
    let access_token = login.body["access_token"].as_str().unwrap().to_owned();

    let rotated = app
        .call(
            "POST",
            "/authentication/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
    assert_eq!(rotated.status, StatusCode::OK);
    let new_refresh = rotated.body["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, refresh_token);
    app.inbox(rotated.body["access_token"].as_str().unwrap(), "").await;

    // Cookie fallback with an empty body.
    let request = Request::builder()
        .method("POST")
        .uri("/authentication/refresh")
        .header(header::COOKIE, format!("refresh_token={new_refresh}"))
        .body(Body::empty())
        .unwrap();
    let via_cookie = app.send(request).await;
    assert_eq!(via_cookie.status, StatusCode::OK);
    assert!(via_cookie.headers.contains_key(header::SET_COOKIE));

    let wrong_kind = app
        .call(
            "POST",
            "/authentication/refresh",
            None,
            Some(json!({ "refresh_token": access_token })),
        )
        .await;
    assert_eq!(wrong_kind.status, StatusCode::UNAUTHORIZED);

    let missing = app.call("POST", "/authentication/refresh", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_fails_once_user_is_gone() {
    let app = TestApp::new();
    app.signup("alice").await;
    let login = app.login("alice", None).await;
    let refresh_token = login.body["refresh_token"].as_str().unwrap().to_owned();

    app.state.db.delete_user("alice").unwrap();

    let resp = app
        .call(
            "POST",
            "/authentication/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = TestApp::new();
    app.signup("alice").await;

    let none = app.call("GET", "/recieving/inbox", None, None).await;
    assert_eq!(none.status, StatusCode::UNAUTHORIZED);
    assert_eq!(none.body["detail"], INVALID_TOKEN);

    let expired = app
        .state
        .tokens
        .issue_access_token_with_ttl("alice", Duration::seconds(-1))
        .unwrap();
    let resp = app.call("GET", "/recieving/inbox", Some(&expired), None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body, none.body);

    let refresh = app.state.tokens.issue_refresh_token("alice").unwrap();
    let resp = app.call("GET", "/recieving/inbox", Some(&refresh), None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = TestApp::new();
    let token = app.signup("alice").await;
    app.login("alice", Some("device")).await;

    let body = json!({ "fcm_token": "device" });
    let first = app
        .call("PATCH", "/authentication/logout", Some(&token), Some(body.clone()))
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["removed"], true);
    assert!(app.endpoints("alice").is_empty());

    let second = app
        .call("PATCH", "/authentication/logout", Some(&token), Some(body))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["removed"], false);

    let bare = app.call("PATCH", "/authentication/logout", Some(&token), None).await;
    assert_eq!(bare.status, StatusCode::OK);
    assert_eq!(bare.body["removed"], false);
}

#[tokio::test]
async fn update_fcm_token_requires_registered_previous() {
    let app = TestApp::new();
    let token = app.signup("alice").await;
    app.login("alice", Some("old")).await;
    app.login("alice", Some("other")).await;

    let unknown = app
        .call(
            "PATCH",
            "/authentication/update_fcm_token",
            Some(&token),
            Some(json!({ "previous_token": "never-seen", "new_token": "new" })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

    let ok = app
        .call(
            "PATCH",
            "/authentication/update_fcm_token",
            Some(&token),
            Some(json!({ "previous_token": "old", "new_token": "new" })),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(app.endpoints("alice"), vec!["new", "other"]);
}

#[tokio::test]
async fn delete_account_checks_identity_and_password() {
    let app = TestApp::new();
    let token = app.signup("alice").await;
    app.signup("bob").await;
    app.post_message("alice", "bye").await;

    let other_user = app
        .call(
            "DELETE",
            "/authentication/delete_account",
            Some(&token),
            Some(json!({ "user_id": "bob", "password": PASSWORD })),
        )
        .await;
    assert_eq!(other_user.status, StatusCode::UNAUTHORIZED);

    let wrong_password = app
        .call(
            "DELETE",
            "/authentication/delete_account",
            Some(&token),
            Some(json!({ "user_id": "alice", "password": "nope" })),
        )
        .await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);

    let ok = app
        .call(
            "DELETE",
            "/authentication/delete_account",
            Some(&token),
            Some(json!({ "user_id": "Alice", "password": PASSWORD })),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    assert_eq!(app.login("alice", None).await.status, StatusCode::UNAUTHORIZED);
    let (counts, _) = app
        .state
        .db
        .get_inbox("alice", PageRequest { cursor: PageCursor::Newest, limit: None })
        .unwrap();
    assert_eq!(counts.total, 0);
    let inbox = app.call("GET", "/recieving/inbox", Some(&token), None).await;
    assert_eq!(inbox.status, StatusCode::BAD_REQUEST);

    let again = app
        .call(
            "DELETE",
            "/authentication/delete_account",
            Some(&token),
            Some(json!({ "user_id": "alice", "password": PASSWORD })),
        )
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oauth_signup_then_set_password() {
    let app = TestApp::new();
    let bridge = app
        .state
        .tokens
        .issue_oauth_bridge_token(Some("carol@example.com"), "Carol")
        .unwrap();

    let resp = app
        .call(
            "POST",
            "/authentication/oauth_signup",
            None,
            Some(json!({ "user_id": "Carol", "name": "", "bridge_token": bridge })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{:?}", resp.body);
    assert_eq!(resp.body["id"], "carol");
    let token = resp.body["access_token"].as_str().unwrap().to_owned();

    let user = app.state.db.get_user("carol").unwrap().unwrap();
    assert_eq!(user.name.as_deref(), Some("Carol"));
    assert_eq!(user.email.as_deref(), Some("carol@example.com"));
    assert!(user.password_hash.is_none());

    // No password yet, so password login is refused.
    assert_eq!(app.login("carol", None).await.status, StatusCode::UNAUTHORIZED);

    let set = app
        .call(
            "PATCH",
            "/authentication/set_password",
            Some(&token),
            Some(json!({ "user_id": "carol", "password": PASSWORD })),
        )
        .await;
    assert_eq!(set.status, StatusCode::OK);
    assert_eq!(app.login("carol", None).await.status, StatusCode::ACCEPTED);

    let forged = app.state.tokens.issue_access_token("carol").unwrap();
    let resp = app
        .call(
            "POST",
            "/authentication/oauth_signup",
            None,
            Some(json!({ "user_id": "dave", "name": "Dave", "bridge_token": forged })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_provider_credentials_keep_endpoints() {
    let app = fcm_app(
        StatusCode::UNAUTHORIZED,
        json!({
            "error": {
                "code": 401,
                "message": "Request had invalid authentication credentials.",
                "status": "UNAUTHENTICATED",
            }
        }),
    )
    .await;
    let token = app.signup("alice").await;
    app.login("alice", Some("phone")).await;
    app.login("alice", Some("tablet")).await;

    assert_eq!(app.post_message("alice", "hi").await, StatusCode::ACCEPTED);

    assert_eq!(app.endpoints("alice"), vec!["phone", "tablet"]);
    assert_eq!(app.inbox(&token, "").await["message_count"], 1);
}

#[tokio::test]
async fn provider_quota_errors_keep_endpoints() {
    let app = fcm_app(
        StatusCode::TOO_MANY_REQUESTS,
        fcm_error(429, "RESOURCE_EXHAUSTED", "QUOTA_EXCEEDED"),
    )
    .await;
    app.signup("alice").await;
    app.login("alice", Some("phone")).await;

    assert_eq!(app.post_message("alice", "hi").await, StatusCode::ACCEPTED);
    assert_eq!(app.endpoints("alice"), vec!["phone"]);
}

#[tokio::test]
async fn unregistered_endpoints_are_pruned_by_fcm_client() {
    let app = fcm_app(StatusCode::NOT_FOUND, fcm_error(404, "NOT_FOUND", "UNREGISTERED")).await;
    app.signup("alice").await;
    app.login("alice", Some("phone")).await;
    app.login("alice", Some("tablet")).await;

    assert_eq!(app.post_message("alice", "hi").await, StatusCode::ACCEPTED);
    assert!(app.endpoints("alice").is_empty());
}

#[tokio::test]
async fn oversized_message_is_refused() {
    let push = Arc::new(ScriptedPush::default());
    let app = TestApp::with_push(Some(push.clone() as Arc<dyn PushProvider>));
    let token = app.signup("alice").await;
    app.login("alice", Some("phone")).await;

    let long = "x".repeat(MAX_MESSAGE_BYTES + 1);
    assert_eq!(app.post_message("alice", &long).await, StatusCode::BAD_REQUEST);

    assert_eq!(app.inbox(&token, "").await["message_count"], 0);
    assert!(push.sent.lock().unwrap().is_empty());
    assert_eq!(app.endpoints("alice"), vec!["phone"]);

    let fits = "x".repeat(MAX_MESSAGE_BYTES);
    assert_eq!(app.post_message("alice", &fits).await, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn malformed_requests_get_a_detail() {
    let app = TestApp::new();
    let token = app.signup("alice").await;

    let missing_message = app.call("POST", "/sending/alice", None, None).await;
    assert_eq!(missing_message.status, StatusCode::BAD_REQUEST);
    assert!(missing_message.body["detail"].is_string());

    let bad_id = app
        .call("PATCH", "/recieving/mark_read/abc", Some(&token), None)
        .await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert!(bad_id.body["detail"].is_string());

    let bad_limit = app
        .call("GET", "/recieving/inbox?limit=lots", Some(&token), None)
        .await;
    assert_eq!(bad_limit.status, StatusCode::BAD_REQUEST);
    assert!(bad_limit.body["detail"].is_string());

    let bad_json = Request::builder()
        .method("POST")
        .uri("/authentication/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"id\": "))
        .unwrap();
    let resp = app.send(bad_json).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.body["detail"].is_string());

    let missing_field = app
        .call("POST", "/authentication/signup", None, Some(json!({ "id": "bob" })))
        .await;
    assert_eq!(missing_field.status, StatusCode::BAD_REQUEST);
    assert!(missing_field.body["detail"].is_string());
}

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use flowrack_auth::{JwtClaims, NewUser, Role};
use flowrack_core::UserId;
use flowrack_infra::store::UserStore;
use flowrack_infra::{AppConfig, InMemoryStore, Services};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let config = AppConfig {
            jwt_secret: SECRET.to_string(),
            ..AppConfig::default()
        };
        let app = flowrack_api::app::build_app(Services::new(store.clone(), &config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            store,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Seed an account directly and hand back a token for it.
    async fn login_as(&self, registration_number: &str, role: Role) -> (UserId, String) {
        let new = NewUser {
            registration_number: registration_number.to_string(),
            password: "unused".to_string(),
            first_name: "Test".to_string(),
            last_name: registration_number.to_string(),
            email: None,
            phone: None,
            role,
            department: None,
        };
        let user = self.store.insert_user(&new, "not-a-hash", Utc::now()).await.unwrap();
        (user.id, mint_jwt(user.id, role))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user_id: UserId, role: Role) -> String {
    let claims = JwtClaims::new(user_id, role, Utc::now(), ChronoDuration::minutes(10));
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn token_for_unknown_user_is_rejected() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(UserId::new(999), Role::Admin);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reports_stored_role() {
    let srv = TestServer::spawn().await;
    let (user_id, token) = srv.login_as("OP-1", Role::Operator).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], json!(user_id.get()));
    assert_eq!(body["role"], "operator");
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "stock.adjust"));
}

#[tokio::test]
async fn users_cannot_adjust_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, operator) = srv.login_as("OP-1", Role::Operator).await;
    let (_, user) = srv.login_as("U-1", Role::User).await;

    let product: serde_json::Value = client
        .post(srv.url("/products"))
        .bearer_auth(&operator)
        .json(&json!({"name": "Copper wire", "unit_of_measure": "kg", "minimum_stock": "5"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = product["id"].as_i64().unwrap();

    let res = client
        .post(srv.url(&format!("/products/{id}/adjust")))
        .bearer_auth(&user)
        .json(&json!({"transaction_type": "in", "quantity": "10"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url(&format!("/products/{id}/adjust")))
        .bearer_auth(&operator)
        .json(&json!({"transaction_type": "in", "quantity": "10"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["product"]["stock_status"], "in_stock");
}

#[tokio::test]
async fn bad_path_id_is_a_bad_request() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.login_as("OP-1", Role::Operator).await;

    let res = reqwest::Client::new()
        .get(srv.url("/products/not-a-number"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn request_is_approved_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, operator) = srv.login_as("OP-1", Role::Operator).await;
    let (_, user) = srv.login_as("U-1", Role::User).await;

    let product: serde_json::Value = client
        .post(srv.url("/products"))
        .bearer_auth(&operator)
        .json(&json!({"name": "Flux", "unit_of_measure": "g", "stock_quantity": "100"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let res = client
        .post(srv.url("/requests"))
        .bearer_auth(&user)
        .json(&json!({
            "requested_date": today,
            "requested_time": "10:00",
            "items": [{"product_id": product["id"], "requested_quantity": "12.5"}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let request: serde_json::Value = res.json().await.unwrap();
    assert_eq!(request["status"], "pending");
    let request_id = request["id"].as_i64().unwrap();
    let item_id = request["items"][0]["id"].clone();

    let approval = json!({"item_approvals": [{"item_id": item_id, "approved_quantity": "10"}]});

    let res = client
        .post(srv.url(&format!("/requests/{request_id}/approve")))
        .bearer_auth(&user)
        .json(&approval)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url(&format!("/requests/{request_id}/approve")))
        .bearer_auth(&operator)
        .json(&approval)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "approved");

    let res = client
        .post(srv.url(&format!("/requests/{request_id}/approve")))
        .bearer_auth(&operator)
        .json(&approval)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["current_status"], "approved");
}

#[tokio::test]
async fn register_login_logout() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/register"))
        .json(&json!({
            "registration_number": "2026001",
            "password": "hunter22",
            "first_name": "Ada",
            "last_name": "Byron",
            "role": "admin",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let user: serde_json::Value = res.json().await.unwrap();
    assert_eq!(user["role"], "user");
    assert!(user.get("password_hash").is_none());

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({"registration_number": "2026001", "password": "wrong-one"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let issued: serde_json::Value = client
        .post(srv.url("/auth/login"))
        .json(&json!({"registration_number": "2026001", "password": "hunter22"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = issued["token"].as_str().unwrap().to_string();

    let res = client.get(srv.url("/auth/profile")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.post(srv.url("/auth/logout")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/auth/profile")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn realtime_stream_opens_for_an_authenticated_user() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.login_as("U-1", Role::User).await;

    let res = reqwest::Client::new()
        .get(srv.url("/stream"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn debts_resolve_as_disputed_and_reject_out_of_range_totals() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, operator) = srv.login_as("OP-1", Role::Operator).await;
    let (debtor, _) = srv.login_as("U-1", Role::User).await;

    let product: serde_json::Value = client
        .post(srv.url("/products"))
        .bearer_auth(&operator)
        .json(&json!({"name": "Beaker", "unit_of_measure": "pcs", "stock_quantity": "3"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let res = client
        .post(srv.url("/debts"))
        .bearer_auth(&operator)
        .json(&json!({
            "user_id": debtor.get(),
            "product_id": product["id"],
            "quantity": "79228162514264337593543950335",
            "unit_price": "2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/debts"))
        .bearer_auth(&operator)
        .json(&json!({
            "user_id": debtor.get(),
            "product_id": product["id"],
            "quantity": "1",
            "unit_price": "2.50",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let debt: serde_json::Value = res.json().await.unwrap();
    let debt_id = debt["id"].as_i64().unwrap();

    let res = client
        .post(srv.url(&format!("/debts/{debt_id}/resolve")))
        .bearer_auth(&operator)
        .json(&json!({"status": "disputed", "notes": "contested at the desk"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let resolved: serde_json::Value = res.json().await.unwrap();
    assert_eq!(resolved["status"], "disputed");

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

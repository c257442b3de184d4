use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use super::middleware_auth::issue_token;
use crate::config::Config;
use crate::state::AppState;
use crate::store::MemoryStore;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_rate_limit(1_000)
    }

    pub fn with_rate_limit(max: u32) -> Self {
        let max = max.to_string();
        let config = Config::from_lookup(|key| match key {
            "JWT_SECRET" => Some("test-secret".to_string()),
            "RATE_LIMIT_MAX" => Some(max.clone()),
            _ => None,
        })
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(&config, store.clone(), store);
        let router = super::app(state.clone(), config.body_limit_bytes);
        Self { router, state }
    }

    pub fn token(&self, user_id: Uuid) -> String {
        issue_token(&self.state.jwt_secret, user_id, chrono::Duration::hours(1)).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn create_task(&self, owner: Uuid, body: Value) -> Value {
        let response = self
            .send(json_req(Method::POST, "/api/tasks", Some(&self.token(owner)), body))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }
}

fn with_auth(builder: axum::http::request::Builder, token: Option<&str>) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
        None => builder,
    }
}

pub fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
    with_auth(Request::builder().method(Method::GET).uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn delete_req(uri: &str, token: Option<&str>) -> Request<Body> {
    with_auth(Request::builder().method(Method::DELETE).uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn json_req(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    with_auth(Request::builder().method(method).uri(uri), token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

/// Marks the request as coming from `10.0.0.<last>`.
pub fn from_addr(mut request: Request<Body>, last: u8) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, last], 40_000))));
    request
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

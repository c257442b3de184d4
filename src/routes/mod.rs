use std::any::Any;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};

mod health;
mod middleware_auth;
pub mod rate_limit;
mod security_headers;
pub mod tasks;
pub mod users;

#[cfg(test)]
mod test_support;

pub use health::health;

use crate::error::ApiError;
use crate::state::AppState;

/// Builds the whole application: routes, auth, and the middleware chain.
///
/// Outermost first: trace, panic catcher, security headers, CORS, rate limit,
/// body limit. Unmatched paths and methods fall through to a uniform 404.
pub fn app(state: AppState, body_limit: usize) -> Router {
    let task_router = Router::new()
        .route("/", get(tasks::routes::list).post(tasks::routes::create))
        .route(
            "/{id}",
            axum::routing::put(tasks::routes::update)
                .patch(tasks::routes::update)
                .delete(tasks::routes::delete),
        );

    let protected = Router::new()
        .nest("/api/tasks", task_router)
        .route(
            "/api/users/me",
            get(users::routes::me)
                .put(users::routes::update_me)
                .patch(users::routes::update_me)
                .delete(users::routes::delete_me),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::require_auth,
        ));

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/users/register", post(users::routes::register))
        .route("/api/users/login", post(users::routes::login))
        .merge(protected)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit,
        ))
        .layer(cors());

    security_headers::apply(router)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(AnyOrigin)
}

async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

/// Terminal handler: log the panic, answer with the generic 500 body.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::Internal(format!("handler panicked: {}", detail)).into_response()
}

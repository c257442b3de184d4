use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use rand::rngs::OsRng;

use super::dto::{
    normalize_email, validate_password, LoginRequest, LoginResponse, RegistrationRequest,
    UpdateUserRequest,
};
use super::model::{NewUser, UserChanges};
use crate::error::ApiError;
use crate::routes::middleware_auth::{issue_token, JwtUser};
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hash error: {}", e)))
}

fn password_matches(password: &str, stored_hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Internal(format!("stored password hash is unreadable: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email).map_err(ApiError::Validation)?;
    validate_password(&payload.password).map_err(ApiError::Validation)?;

    let user = state
        .users
        .insert(NewUser {
            email,
            name: payload.name,
            password_hash: hash_password(&payload.password)?,
        })
        .await?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Unknown email and wrong password get the same answer.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email).map_err(ApiError::Validation)?;

    let credentials = state
        .users
        .find_credentials(&email)
        .await?
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;

    if !password_matches(&payload.password, &credentials.password_hash)? {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    let token = issue_token(
        &state.jwt_secret,
        credentials.user.id,
        Duration::hours(state.jwt_ttl_hours),
    )?;

    Ok(Json(LoginResponse {
        token,
        user: credentials.user,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
) -> Result<impl IntoResponse, ApiError> {
    match state.users.find(user_id).await? {
        Some(user) => Ok(Json(user)),
        None => Err(ApiError::NotFound("User")),
    }
}

pub async fn update_me(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;

    let email = payload
        .email
        .as_deref()
        .map(normalize_email)
        .transpose()
        .map_err(ApiError::Validation)?;
    let password_hash = match payload.password.as_deref() {
        Some(password) => {
            validate_password(password).map_err(ApiError::Validation)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let changes = UserChanges {
        email,
        name: payload.name,
        password_hash,
    };

    match state.users.update(user_id, changes).await? {
        Some(user) => Ok(Json(user)),
        None => Err(ApiError::NotFound("User")),
    }
}

/// Removes the caller's account. Their tasks are left in place.
pub async fn delete_me(
    State(state): State<AppState>,
    JwtUser(user_id): JwtUser,
) -> Result<impl IntoResponse, ApiError> {
    if state.users.delete(user_id).await? {
        tracing::info!(%user_id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("User"))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::test_support::*;

    const PASSWORD: &str = "correct horse";

    async fn register_and_login(ctx: &TestApp, email: &str) -> (String, serde_json::Value) {
        let response = ctx
            .send(json_req(
                Method::POST,
                "/api/users/register",
                None,
                json!({ "email": email, "password": PASSWORD, "name": "Ada" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let user = json_body(response).await;
        assert!(user.get("password").is_none());
        assert!(user.get("passwordHash").is_none());

        let response = ctx
            .send(json_req(
                Method::POST,
                "/api/users/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["user"], user);

        (body["token"].as_str().unwrap().to_string(), user)
    }

    #[tokio::test]
    async fn test_registered_user_can_log_in_and_read_themselves() {
        let ctx = TestApp::new();
        let (token, user) = register_and_login(&ctx, "Ada@Example.com").await;
        assert_eq!(user["email"], "ada@example.com");

        let response = ctx.send(get_req("/api/users/me", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, user);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let ctx = TestApp::new();
        register_and_login(&ctx, "ada@example.com").await;

        for body in [
            json!({ "email": "ada@example.com", "password": "wrong password" }),
            json!({ "email": "nobody@example.com", "password": PASSWORD }),
        ] {
            let response = ctx
                .send(json_req(Method::POST, "/api/users/login", None, body))
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                json_body(response).await,
                json!({ "error": "Invalid credentials" })
            );
        }
    }

    #[tokio::test]
    async fn test_registration_validation_and_conflict() {
        let ctx = TestApp::new();
        register_and_login(&ctx, "ada@example.com").await;

        let response = ctx
            .send(json_req(
                Method::POST,
                "/api/users/register",
                None,
                json!({ "email": "ADA@example.com", "password": "another password" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ctx
            .send(json_req(
                Method::POST,
                "/api/users/register",
                None,
                json!({ "email": "bob@example.com", "password": "short" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_me_changes_name_only() {
        let ctx = TestApp::new();
        let (token, user) = register_and_login(&ctx, "ada@example.com").await;

        let response = ctx
            .send(json_req(
                Method::PATCH,
                "/api/users/me",
                Some(&token),
                json!({ "name": "Ada Lovelace" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let updated = json_body(response).await;
        assert_eq!(updated["name"], "Ada Lovelace");
        assert_eq!(updated["email"], user["email"]);
        assert_eq!(updated["id"], user["id"]);
    }

    #[tokio::test]
    async fn test_delete_me_leaves_tasks_behind() {
        let ctx = TestApp::new();
        let (token, user) = register_and_login(&ctx, "ada@example.com").await;
        let user_id: uuid::Uuid = user["id"].as_str().unwrap().parse().unwrap();
        ctx.create_task(user_id, json!({ "title": "outlives its owner" }))
            .await;

        let response = ctx.send(delete_req("/api/users/me", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = ctx.send(get_req("/api/users/me", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await, json!({ "error": "User not found" }));

        let response = ctx.send(get_req("/api/tasks", Some(&token))).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }
}

use axum::{extract::State, http::StatusCode, Extension, Json};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::auth::password::{self, MIN_PASSWORD_LEN};
use crate::error::{AppError, AppResult};
use crate::models::{normalize_email, User, UserPublic};
use crate::routes::AppState;
use crate::services::users::{self, ProfileUpdate};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub token: String,
    pub user: UserPublic,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub user: UserPublic,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn signup(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<SignupRequest>, AppError>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let (Some(name), Some(email), Some(password)) = (
        present(body.name),
        present(body.email),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Please provide name, email, and password".to_string(),
        ));
    };

    if !normalize_email(&email).contains('@') {
        return Err(AppError::validation("Please provide a valid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = password::hash_password(&password)?;
    let user = users::create_user(&state.db, &name, &email, &password_hash)?;
    tracing::info!(user_id = %user.id, "User signed up");

    let token = state.tokens.issue(&user.id)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully",
            token,
            user: user.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<Json<AuthResponse>> {
    let (Some(email), Some(password)) = (
        present(body.email),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Please provide email and password".to_string(),
        ));
    };

    let Some(user) = users::find_by_email(&state.db, &email)? else {
        tracing::debug!("Login attempt for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !password::verify_password(&password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login attempt with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!(user_id = %user.id, "User logged in");
    let token = state.tokens.issue(&user.id)?;
    Ok(Json(AuthResponse {
        message: "Login successful",
        token,
        user: user.into(),
    }))
}

/// Tokens are stateless, so there is nothing to revoke here. An issued token
/// stays valid until it expires; the client is expected to discard it.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Logged out successfully",
    })
}

pub async fn me(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse {
        message: None,
        user: user.into(),
    })
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    WithRejection(Json(body), _): WithRejection<Json<ProfileRequest>, AppError>,
) -> AppResult<Json<UserResponse>> {
    if let Some(email) = present(body.email.clone()) {
        if !normalize_email(&email).contains('@') {
            return Err(AppError::validation("Please provide a valid email address"));
        }
    }

    let updated = users::update_profile(
        &state.db,
        user,
        ProfileUpdate {
            name: body.name,
            email: body.email,
        },
    )?;
    tracing::info!(user_id = %updated.id, "Profile updated");

    Ok(Json(UserResponse {
        message: Some("Profile updated successfully"),
        user: updated.into(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use crate::error::INVALID_CREDENTIALS_MESSAGE;
    use crate::routes::{create_router, test_state};

    fn server() -> TestServer {
        TestServer::new(create_router(test_state())).expect("Could not create test server.")
    }

    async fn signup(server: &TestServer, email: &str) -> Value {
        let response = server
            .post("/api/auth/signup")
            .json(&json!({ "name": "Jane", "email": email, "password": "hunter22" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()
    }

    #[tokio::test]
    async fn signup_returns_token_and_public_user() {
        let server = server();
        let body = signup(&server, " Jane@Example.com ").await;

        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(body["user"]["email"], "jane@example.com");
        assert_eq!(body["user"]["name"], "Jane");
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn signup_rejects_missing_fields_and_short_passwords() {
        let server = server();

        server
            .post("/api/auth/signup")
            .json(&json!({ "email": "jane@example.com", "password": "hunter22" }))
            .await
            .assert_status_bad_request();

        let response = server
            .post("/api/auth/signup")
            .json(&json!({ "name": "Jane", "email": "jane@example.com", "password": "12345" }))
            .await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["message"],
            "Password must be at least 6 characters"
        );
    }

    #[tokio::test]
    async fn signup_with_taken_email_is_rejected() {
        let server = server();
        signup(&server, "jane@example.com").await;

        let response = server
            .post("/api/auth/signup")
            .json(&json!({ "name": "Other", "email": "JANE@example.com", "password": "hunter22" }))
            .await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["message"],
            "User already exists with this email"
        );
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let server = server();
        signup(&server, "jane@example.com").await;

        let wrong_password = server
            .post("/api/auth/login")
            .json(&json!({ "email": "jane@example.com", "password": "wrong-pass" }))
            .await;
        let unknown_user = server
            .post("/api/auth/login")
            .json(&json!({ "email": "nobody@example.com", "password": "hunter22" }))
            .await;

        wrong_password.assert_status_unauthorized();
        unknown_user.assert_status_unauthorized();
        assert_eq!(wrong_password.text(), unknown_user.text());
        assert_eq!(
            wrong_password.json::<Value>()["message"],
            INVALID_CREDENTIALS_MESSAGE
        );
    }

    #[tokio::test]
    async fn wrong_typed_login_body_is_a_validation_error() {
        let server = server();
        let response = server
            .post("/api/auth/login")
            .json(&json!({ "email": 5, "password": "hunter22" }))
            .await;

        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["message"], "Validation error");
    }

    #[tokio::test]
    async fn login_then_me() {
        let server = server();
        signup(&server, "jane@example.com").await;

        let login = server
            .post("/api/auth/login")
            .json(&json!({ "email": "JANE@example.com", "password": "hunter22" }))
            .await;
        login.assert_status_ok();
        let token = login.json::<Value>()["token"].as_str().unwrap().to_string();

        let me = server
            .get("/api/auth/me")
            .add_header("Authorization", format!("Bearer {token}"))
            .await;
        me.assert_status_ok();
        assert_eq!(me.json::<Value>()["user"]["email"], "jane@example.com");

        server.get("/api/auth/me").await.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn token_survives_logout() {
        let server = server();
        let token = signup(&server, "jane@example.com").await["token"]
            .as_str()
            .unwrap()
            .to_string();

        server
            .post("/api/auth/logout")
            .add_header("Authorization", format!("Bearer {token}"))
            .await
            .assert_status_ok();

        server
            .get("/api/auth/me")
            .add_header("Authorization", format!("Bearer {token}"))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn profile_update_and_duplicate_email() {
        let server = server();
        let jane = signup(&server, "jane@example.com").await;
        signup(&server, "bob@example.com").await;
        let token = jane["token"].as_str().unwrap().to_string();

        let renamed = server
            .put("/api/auth/profile")
            .add_header("Authorization", format!("Bearer {token}"))
            .json(&json!({ "name": "  Janet " }))
            .await;
        renamed.assert_status_ok();
        assert_eq!(renamed.json::<Value>()["user"]["name"], "Janet");
        assert_eq!(renamed.json::<Value>()["user"]["email"], "jane@example.com");

        let duplicate = server
            .put("/api/auth/profile")
            .add_header("Authorization", format!("Bearer {token}"))
            .json(&json!({ "email": "Bob@example.com" }))
            .await;
        duplicate.assert_status_bad_request();
        assert_eq!(duplicate.json::<Value>()["message"], "Email already exists");
    }

    #[tokio::test]
    async fn blank_profile_name_is_rejected() {
        let server = server();
        let token = signup(&server, "jane@example.com").await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = server
            .put("/api/auth/profile")
            .add_header("Authorization", format!("Bearer {token}"))
            .json(&json!({ "name": "   " }))
            .await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["errors"], json!(["Name is required"]));

        let me = server
            .get("/api/auth/me")
            .add_header("Authorization", format!("Bearer {token}"))
            .await;
        assert_eq!(me.json::<Value>()["user"]["name"], "Jane");
    }
}

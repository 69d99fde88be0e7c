//! Account endpoints: signup, login, password reset, current user.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::config::RESET_TOKEN_TTL_MINUTES;
use crate::crypto::{generate_token, hash_password, token_digest, verify_password};
use crate::db::repository::{
    consume_password_reset, find_valid_password_reset, get_user, get_user_by_email,
    insert_password_reset, insert_user, invalidate_password_resets, update_password_hash,
};
use crate::models::enums::UserRole;
use crate::models::{User, UserProfile};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    #[serde(flatten)]
    pub profile: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct ResetTokenStatus {
    pub valid: bool,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: User,
}

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid || email.len() > 254 {
        return Err(ApiError::BadRequest("A valid email address is required".into()));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// PBKDF2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(password: String, iterations: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn verify_blocking(password: String, encoded: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

fn issue_token(ctx: &ApiContext, user: &User) -> Result<String, ApiError> {
    Ok(ctx.core.signer().issue(user.id, &user.email, user.role, Utc::now())?)
}

/// `POST /api/auth/signup`
pub async fn signup(
    State(ctx): State<ApiContext>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(req) = body?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }
    let email = normalize_email(&req.email)?;
    check_password(&req.password)?;
    if req.role == UserRole::Doctor
        && req
            .profile
            .license_number
            .as_deref()
            .map_or(true, |l| l.trim().is_empty())
    {
        return Err(ApiError::BadRequest("Doctors must provide a license number".into()));
    }

    let password_hash = hash_blocking(req.password, ctx.core.password_iterations()).await?;
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash,
        role: req.role,
        profile: req.profile,
        created_at: now,
        updated_at: now,
    };

    let conn = ctx.core.open_db()?;
    insert_user(&conn, &user).map_err(|e| {
        if e.is_unique_violation() {
            ApiError::Conflict("Email already registered".into())
        } else {
            ApiError::from(e)
        }
    })?;
    tracing::info!(user_id = %user.id, role = %user.role, "User registered");

    let token = issue_token(&ctx, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// `POST /api/auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = body?;
    let email = req.email.trim().to_lowercase();

    let user = {
        let conn = ctx.core.open_db()?;
        get_user_by_email(&conn, &email)?
    };

    // Unknown accounts still pay for a derivation against the dummy hash.
    let encoded = user
        .as_ref()
        .map_or(ctx.core.dummy_password_hash(), |u| u.password_hash.as_str())
        .to_string();
    let verified = verify_blocking(req.password, encoded).await?;

    let user = match user {
        Some(user) if verified => user,
        Some(user) => {
            tracing::info!(user_id = %user.id, "Failed login");
            return Err(ApiError::InvalidCredentials);
        }
        None => return Err(ApiError::InvalidCredentials),
    };

    let token = issue_token(&ctx, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

/// `POST /api/auth/forgot-password`. Always 200 so the response does not
/// reveal whether an account exists.
pub async fn forgot_password(
    State(ctx): State<ApiContext>,
    body: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body?;
    let email = req.email.trim().to_lowercase();

    let conn = ctx.core.open_db()?;
    if let Some(user) = get_user_by_email(&conn, &email)? {
        let token = generate_token();
        let now = Utc::now();
        insert_password_reset(
            &conn,
            &token_digest(&token),
            &user.id,
            now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
            now,
        )?;
        let notifier = ctx.core.notifier();
        notifier.dispatch(notifier.password_reset(&user, &token));
        tracing::info!(user_id = %user.id, "Password reset issued");
    }

    Ok(Json(MessageResponse {
        message: "If that email is registered, a reset link has been sent",
    }))
}

/// `GET /api/auth/reset-password/:token`
pub async fn check_reset_token(
    State(ctx): State<ApiContext>,
    Path(token): Path<String>,
) -> Result<Json<ResetTokenStatus>, ApiError> {
    let conn = ctx.core.open_db()?;
    find_valid_password_reset(&conn, &token_digest(&token), Utc::now())?
        .ok_or_else(|| ApiError::BadRequest("Reset link is invalid or has expired".into()))?;
    Ok(Json(ResetTokenStatus { valid: true }))
}

/// `POST /api/auth/reset-password/:token`
pub async fn reset_password(
    State(ctx): State<ApiContext>,
    Path(token): Path<String>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body?;
    check_password(&req.password)?;
    let digest = token_digest(&token);
    let invalid = || ApiError::BadRequest("Reset link is invalid or has expired".into());

    let user_id = {
        let conn = ctx.core.open_db()?;
        find_valid_password_reset(&conn, &digest, Utc::now())?
    }
    .ok_or_else(invalid)?;

    let password_hash = hash_blocking(req.password, ctx.core.password_iterations()).await?;

    let conn = ctx.core.open_db()?;
    let now = Utc::now();
    let tx = conn.unchecked_transaction()?;
    if !consume_password_reset(&tx, &digest, now)? {
        return Err(invalid());
    }
    update_password_hash(&tx, &user_id, &password_hash, now)?;
    invalidate_password_resets(&tx, &user_id, now)?;
    tx.commit()?;

    tracing::info!(user_id = %user_id, "Password reset completed");
    Ok(Json(MessageResponse {
        message: "Password updated, you can now sign in",
    }))
}

/// `GET /api/auth/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<MeResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let user = get_user(&conn, &auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;
    Ok(Json(MeResponse { user }))
}

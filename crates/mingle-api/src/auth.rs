use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Datelike, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use mingle_db::{Database, models::NewUser, to_date};
use mingle_engine::ledger::PassLedger;
use mingle_engine::session::SessionController;
use mingle_gateway::dispatcher::Dispatcher;
use mingle_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};

use crate::error::{ApiError, run_blocking};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub ledger: PassLedger,
    pub sessions: SessionController,
    pub jwt_secret: String,
    pub billing_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("username must be 3-32 chars"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 chars"));
    }
    if req.display_name.is_empty() || req.display_name.len() > 64 {
        return Err(ApiError::BadRequest("display name must be 1-64 chars"));
    }

    let now = Utc::now();
    let age = now.year() - req.birth_year;
    if !(18..=120).contains(&age) {
        return Err(ApiError::BadRequest("must be 18 or older"));
    }
    if req.min_age < 18 || req.max_age > 120 || req.min_age > req.max_age {
        return Err(ApiError::BadRequest("invalid age range"));
    }
    if !(0.5..=100.0).contains(&req.max_distance_km) {
        return Err(ApiError::BadRequest("invalid distance preference"));
    }

    // Check if username is taken
    let db = state.db.clone();
    let username = req.username.clone();
    if run_blocking(move || db.get_user_by_username(&username)).await?.is_some() {
        return Err(ApiError::Conflict("username taken"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let daily_passes = state.ledger.config().daily_passes;

    let db = state.db.clone();
    let id_s = user_id.to_string();
    let username = req.username.clone();
    let req_username = req.username.clone();
    run_blocking(move || {
        db.create_user(&NewUser {
            id: &id_s,
            username: &req_username,
            password_hash: &password_hash,
            display_name: &req.display_name,
            gender: req.gender.as_str(),
            looking_for: req.looking_for.as_str(),
            birth_year: req.birth_year as i64,
            min_age: req.min_age as i64,
            max_age: req.max_age as i64,
            max_distance_km: req.max_distance_km,
            passes_left: daily_passes,
            counters_date: &to_date(now),
        })
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &username).map_err(ApiError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let username = req.username.clone();
    let user = run_blocking(move || db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id: {}", e)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(ApiError::Internal)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

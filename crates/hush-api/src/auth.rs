use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use hush_db::models::NewUser;
use hush_types::api::{
    Claims, Detail, LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, OAuthSignupRequest,
    PasswordRequest, RefreshRequest, SignupRequest, SignupResponse, TokenResponse,
    UpdatePushTokenRequest,
};

use crate::error::{ApiError, INVALID_CREDENTIALS, INVALID_TOKEN};
use crate::extract::Json;
use crate::state::{AppState, run_db};
use crate::tokens::{TOKEN_TYPE, TokenPair};

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/authentication/refresh";
pub const OAUTH_BRIDGE_COOKIE: &str = "oauth_signup";

/// User ids are case-insensitive; the stored form is lowercase.
pub fn normalize_id(id: &str) -> String {
    id.to_lowercase()
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = normalize_id(&req.id);
    if id.is_empty() {
        return Err(ApiError::bad_request("User id cannot be empty"));
    }
    if req.password.is_empty() {
        return Err(ApiError::bad_request("Password cannot be empty"));
    }

    // Fail fast before paying for a hash; the insert below is still the
    // authoritative check.
    let lookup = id.clone();
    if run_db(&state, move |db| db.user_exists(&lookup)).await? {
        return Err(ApiError::Conflict("User id already exists".into()));
    }

    let password_hash = hash_password(req.password).await?;

    let uid = id.clone();
    let created = run_db(&state, move |db| {
        db.create_user(&NewUser {
            id: &uid,
            name: req.name.as_deref(),
            password_hash: Some(&password_hash),
            email: req.email.as_deref(),
        })
    })
    .await?;
    if !created {
        return Err(ApiError::Conflict("User id already exists".into()));
    }

    info!(user_id = %id, "User signed up");

    let pair = state.tokens.issue_pair(&id)?;
    let jar = jar.add(refresh_cookie(&state, &pair));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SignupResponse {
            id,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: TOKEN_TYPE.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = normalize_id(&req.id);

    let lookup = id.clone();
    let user = run_db(&state, move |db| db.get_user(&lookup))
        .await?
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;

    // Accounts created through OAuth have no password until they set one.
    let stored_hash = user
        .password_hash
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;
    if !password_matches(req.password, stored_hash).await? {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    if let Some(token) = req.fcm_token.filter(|t| !t.is_empty()) {
        let uid = id.clone();
        let added = run_db(&state, move |db| db.add_push_endpoint(&uid, &token)).await?;
        debug!(user_id = %id, added, "Push endpoint registered on login");
    }

    let pair = state.tokens.issue_pair(&id)?;
    let jar = jar.add(refresh_cookie(&state, &pair));

    Ok((
        StatusCode::ACCEPTED,
        jar,
        Json(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: TOKEN_TYPE.into(),
            name: user.name,
        }),
    ))
}

/// Exchanges a refresh token (body first, cookie second) for a new pair.
/// The presented token is not reusable in any tracked sense; a fresh one is
/// always issued.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: RefreshRequest = optional_json(&body)?;

    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned()))
        .ok_or(ApiError::Unauthorized(INVALID_TOKEN))?;

    let claims = state.tokens.verify_refresh(&token)?;
    let id = normalize_id(&claims.id);

    let lookup = id.clone();
    if !run_db(&state, move |db| db.user_exists(&lookup)).await? {
        return Err(ApiError::Unauthorized(INVALID_TOKEN));
    }

    let pair = state.tokens.issue_pair(&id)?;
    let jar = jar.add(refresh_cookie(&state, &pair));

    Ok((
        jar,
        Json(TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: TOKEN_TYPE.into(),
        }),
    ))
}

/// Always succeeds; `removed` says whether an endpoint was deregistered.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: LogoutRequest = optional_json(&body)?;

    let removed = match req.fcm_token.filter(|t| !t.is_empty()) {
        Some(token) => {
            let uid = claims.id.clone();
            run_db(&state, move |db| db.remove_push_endpoint(&uid, &token)).await?
        }
        None => false,
    };

    debug!(user_id = %claims.id, removed, "User logged out");

    let jar = jar.remove(Cookie::build((REFRESH_COOKIE, "")).path(REFRESH_COOKIE_PATH));

    Ok((
        jar,
        Json(LogoutResponse {
            detail: "Logged out".into(),
            removed,
        }),
    ))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = normalize_id(&req.user_id);
    if id != claims.id {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    let lookup = id.clone();
    let user = run_db(&state, move |db| db.get_user(&lookup))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let stored_hash = user
        .password_hash
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;
    if !password_matches(req.password, stored_hash).await? {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    let uid = id.clone();
    if !run_db(&state, move |db| db.delete_user(&uid)).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = %id, "Account deleted");
    Ok(Json(Detail::new("Account deleted")))
}

pub async fn update_fcm_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePushTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.new_token.is_empty() {
        return Err(ApiError::bad_request("New token cannot be empty"));
    }

    let uid = claims.id.clone();
    let replaced = run_db(&state, move |db| {
        db.replace_push_endpoint(&uid, &req.previous_token, &req.new_token)
    })
    .await?;

    if !replaced {
        return Err(ApiError::bad_request("Previous token is not registered"));
    }

    Ok(Json(Detail::new("Token updated")))
}

/// Sets or changes the password of the authenticated account.
pub async fn set_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = normalize_id(&req.user_id);
    if id != claims.id {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }
    if req.password.is_empty() {
        return Err(ApiError::bad_request("Password cannot be empty"));
    }

    let password_hash = hash_password(req.password).await?;

    let uid = id.clone();
    if !run_db(&state, move |db| db.set_password_hash(&uid, &password_hash)).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = %id, "Password updated");
    Ok(Json(Detail::new("Password updated")))
}

/// Completes a signup started by the OAuth redirect flow. The bridge token
/// carries the provider's identity; the caller picks the user id.
pub async fn oauth_signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<OAuthSignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = req
        .bridge_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(OAUTH_BRIDGE_COOKIE).map(|c| c.value().to_owned()))
        .ok_or(ApiError::Unauthorized(INVALID_TOKEN))?;

    let bridge = state.tokens.verify_oauth_bridge_token(&token)?;

    let id = normalize_id(&req.user_id);
    if id.is_empty() {
        return Err(ApiError::bad_request("User id cannot be empty"));
    }
    let name = if req.name.trim().is_empty() {
        bridge.name
    } else {
        req.name
    };

    let uid = id.clone();
    let created = run_db(&state, move |db| {
        db.create_user(&NewUser {
            id: &uid,
            name: Some(&name),
            password_hash: None,
            email: bridge.email.as_deref(),
        })
    })
    .await?;
    if !created {
        return Err(ApiError::Conflict("User id already exists".into()));
    }

    info!(user_id = %id, "User signed up through OAuth");

    let pair = state.tokens.issue_pair(&id)?;
    let jar = jar
        .remove(Cookie::build((OAUTH_BRIDGE_COOKIE, "")).path("/"))
        .add(refresh_cookie(&state, &pair));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SignupResponse {
            id,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: TOKEN_TYPE.into(),
        }),
    ))
}

fn refresh_cookie(state: &AppState, pair: &TokenPair) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, pair.refresh_token.clone()))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.cookie_secure)
        .max_age(time::Duration::seconds(state.tokens.refresh_ttl().num_seconds()))
        .build()
}

/// Parses a JSON body that callers may omit entirely.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

async fn hash_password(password: String) -> Result<String, ApiError> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))
    })
    .await
    .map_err(|e| anyhow::anyhow!("hashing task failed: {}", e))??;
    Ok(hash)
}

async fn password_matches(password: String, stored_hash: String) -> Result<bool, ApiError> {
    let matches = tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|e| anyhow::anyhow!("stored password hash is malformed: {}", e))?;
        Ok::<_, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!("hashing task failed: {}", e))??;
    Ok(matches)
}

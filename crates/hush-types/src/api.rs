use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// Claims carried by both access and refresh tokens. The two kinds differ only
/// in the secret that signs them and their lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub role: String,
    pub jti: Uuid,
    pub exp: i64,
}

/// Claims of the one-time token handed over by the OAuth redirect flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthBridgeClaims {
    pub email: Option<String>,
    pub name: String,
    pub sig: String,
    pub jti: Uuid,
    pub exp: i64,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub id: String,
    pub name: Option<String>,
    pub password: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub id: String,
    pub password: String,
    pub fcm_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub fcm_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub detail: String,
    pub removed: bool,
}

/// Password re-entry, used by account deletion and password set.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthSignupRequest {
    pub user_id: String,
    pub name: String,
    pub bridge_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePushTokenRequest {
    pub previous_token: String,
    pub new_token: String,
}

// -- Common --

#[derive(Debug, Serialize, Deserialize)]
pub struct Detail {
    pub detail: String,
}

impl Detail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub detail: String,
    pub health: String,
}

// -- Sending --

#[derive(Debug, Serialize, Deserialize)]
pub struct RecipientResponse {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendQuery {
    pub message: String,
}

// -- Receiving --

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub skip: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Keyset cursor: only messages with a smaller id are returned.
    pub last_seen_id: Option<i64>,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: i64,
    pub time: String,
    pub unread: bool,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InboxResponse {
    pub message_count: i64,
    pub unread_count: i64,
    pub messages: Vec<MessageItem>,
}

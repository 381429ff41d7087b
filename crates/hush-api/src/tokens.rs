//! Signed access/refresh tokens.
//!
//! Tokens are stateless: everything needed to check one is the secret, the
//! algorithm and the clock. Access and refresh tokens are signed with
//! different secrets so neither can stand in for the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use hush_types::api::{Claims, OAuthBridgeClaims};

use crate::error::{ApiError, INVALID_TOKEN};

pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 2;
pub const DEFAULT_REFRESH_TTL_MINUTES: i64 = 7 * 24 * 60;
pub const TOKEN_TYPE: &str = "bearer";

const USER_ROLE: &str = "user";
const OAUTH_BRIDGE_MARKER: &str = "hush-oauth-signup-bridge";
const OAUTH_BRIDGE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            algorithm: Algorithm::HS256,
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: Duration::minutes(DEFAULT_REFRESH_TTL_MINUTES),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenConfigError {
    #[error("access and refresh secrets must both be set")]
    MissingSecret,
    #[error("access and refresh secrets must differ")]
    SharedSecret,
    #[error("algorithm {0:?} is not an HMAC algorithm")]
    UnsupportedAlgorithm(Algorithm),
    #[error("token lifetimes must be positive")]
    InvalidTtl,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenService {
    header: Header,
    validation: Validation,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Result<Self, TokenConfigError> {
        if config.access_secret.is_empty() || config.refresh_secret.is_empty() {
            return Err(TokenConfigError::MissingSecret);
        }
        if config.access_secret == config.refresh_secret {
            return Err(TokenConfigError::SharedSecret);
        }
        if !matches!(
            config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenConfigError::UnsupportedAlgorithm(config.algorithm));
        }
        if config.access_ttl <= Duration::zero() || config.refresh_ttl <= Duration::zero() {
            return Err(TokenConfigError::InvalidTtl);
        }

        let mut validation = Validation::new(config.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            header: Header::new(config.algorithm),
            validation,
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        })
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access_token(&self, user_id: &str) -> anyhow::Result<String> {
        self.issue_access_token_with_ttl(user_id, self.access_ttl)
    }

    pub fn issue_access_token_with_ttl(&self, user_id: &str, ttl: Duration) -> anyhow::Result<String> {
        self.sign(&user_claims(user_id, ttl), &self.access_encoding)
    }

    pub fn issue_refresh_token(&self, user_id: &str) -> anyhow::Result<String> {
        self.sign(&user_claims(user_id, self.refresh_ttl), &self.refresh_encoding)
    }

    pub fn issue_pair(&self, user_id: &str) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id)?,
            refresh_token: self.issue_refresh_token(user_id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify_user(token, &self.access_decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify_user(token, &self.refresh_decoding)
    }

    /// One-time token the OAuth redirect flow hands to the signup form.
    pub fn issue_oauth_bridge_token(&self, email: Option<&str>, name: &str) -> anyhow::Result<String> {
        let claims = OAuthBridgeClaims {
            email: email.map(str::to_owned),
            name: name.to_owned(),
            sig: OAUTH_BRIDGE_MARKER.to_owned(),
            jti: Uuid::new_v4(),
            exp: (Utc::now() + Duration::minutes(OAUTH_BRIDGE_TTL_MINUTES)).timestamp(),
        };
        self.sign(&claims, &self.access_encoding)
    }

    /// Verifies the signature and also requires the internal marker, so a
    /// cookie minted by some other flow under the same secret is refused.
    pub fn verify_oauth_bridge_token(&self, token: &str) -> Result<OAuthBridgeClaims, ApiError> {
        let claims: OAuthBridgeClaims = self.verify(token, &self.access_decoding)?;
        if claims.sig != OAUTH_BRIDGE_MARKER {
            debug!("OAuth bridge token carries a foreign marker");
            return Err(ApiError::Unauthorized(INVALID_TOKEN));
        }
        Ok(claims)
    }

    fn verify_user(&self, token: &str, key: &DecodingKey) -> Result<Claims, ApiError> {
        let claims: Claims = self.verify(token, key)?;
        if claims.id.is_empty() || claims.role.is_empty() {
            return Err(ApiError::Unauthorized(INVALID_TOKEN));
        }
        Ok(claims)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, ApiError> {
        decode::<T>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                ApiError::Unauthorized(INVALID_TOKEN)
            })
    }

    fn sign<T: Serialize>(&self, claims: &T, key: &EncodingKey) -> anyhow::Result<String> {
        Ok(encode(&self.header, claims, key)?)
    }
}

fn user_claims(user_id: &str, ttl: Duration) -> Claims {
    Claims {
        id: user_id.to_owned(),
        role: USER_ROLE.to_owned(),
        jti: Uuid::new_v4(),
        exp: (Utc::now() + ttl).timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(TokenConfig::new("access-secret", "refresh-secret")).unwrap()
    }

    #[test]
    fn access_token_roundtrip() {
        let tokens = service();
        let token = tokens.issue_access_token("alice").unwrap();
        let claims = tokens.verify_access(&token).unwrap();
        assert_eq!(claims.id, "alice");
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let tokens = service();
        let token = tokens
            .issue_access_token_with_ttl("alice", Duration::seconds(-5))
            .unwrap();
        let err = tokens.verify_access(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(INVALID_TOKEN)));
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let tokens = service();
        let refresh = tokens.issue_refresh_token("alice").unwrap();
        let access = tokens.issue_access_token("alice").unwrap();

        assert!(tokens.verify_access(&refresh).is_err());
        assert!(tokens.verify_refresh(&access).is_err());
        assert_eq!(tokens.verify_refresh(&refresh).unwrap().id, "alice");
    }

    #[test]
    fn failures_look_the_same() {
        let tokens = service();
        let mut tampered = tokens.issue_access_token("alice").unwrap();
        tampered.push('x');
        let expired = tokens
            .issue_access_token_with_ttl("alice", Duration::seconds(-5))
            .unwrap();

        let details: Vec<String> = ["garbage", tampered.as_str(), expired.as_str()]
            .iter()
            .map(|t| tokens.verify_access(t).unwrap_err().to_string())
            .collect();
        assert!(details.iter().all(|d| d == INVALID_TOKEN));
    }

    #[test]
    fn missing_id_claim_is_rejected() {
        #[derive(Serialize)]
        struct NoId {
            role: &'static str,
            exp: i64,
        }
        let tokens = service();
        let token = tokens
            .sign(
                &NoId { role: "user", exp: (Utc::now() + Duration::minutes(1)).timestamp() },
                &tokens.access_encoding,
            )
            .unwrap();
        assert!(tokens.verify_access(&token).is_err());
    }

    #[test]
    fn rotated_tokens_differ() {
        let tokens = service();
        let a = tokens.issue_refresh_token("alice").unwrap();
        let b = tokens.issue_refresh_token("alice").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oauth_bridge_requires_marker() {
        let tokens = service();
        let token = tokens
            .issue_oauth_bridge_token(Some("a@example.com"), "Alice")
            .unwrap();
        let claims = tokens.verify_oauth_bridge_token(&token).unwrap();
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));

        let forged = OAuthBridgeClaims {
            sig: "something-else".into(),
            ..claims
        };
        let forged = tokens.sign(&forged, &tokens.access_encoding).unwrap();
        assert!(tokens.verify_oauth_bridge_token(&forged).is_err());

        // An ordinary access token is not a bridge token, and vice versa.
        let access = tokens.issue_access_token("alice").unwrap();
        assert!(tokens.verify_oauth_bridge_token(&access).is_err());
        assert!(tokens.verify_access(&token).is_err());
    }

    #[test]
    fn config_is_validated() {
        assert_eq!(
            TokenService::new(TokenConfig::new("", "x")).err(),
            Some(TokenConfigError::MissingSecret)
        );
        assert_eq!(
            TokenService::new(TokenConfig::new("same", "same")).err(),
            Some(TokenConfigError::SharedSecret)
        );

        let mut config = TokenConfig::new("a", "b");
        config.algorithm = Algorithm::RS256;
        assert_eq!(
            TokenService::new(config).err(),
            Some(TokenConfigError::UnsupportedAlgorithm(Algorithm::RS256))
        );
    }
}

//! Server configuration loaded from environment variables.
//!
//! Token secrets are required; everything else has a default suitable for
//! local development.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonwebtoken::Algorithm;

use hush_api::telemetry::{DEFAULT_SAMPLE_PERIOD, DEFAULT_WARN_THRESHOLD};
use hush_api::tokens::{DEFAULT_ACCESS_TTL_MINUTES, DEFAULT_REFRESH_TTL_MINUTES, TokenConfig};
use hush_db::DEFAULT_READER_POOL_SIZE;

/// Secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["None", "change-me", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub project_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `HUSH_HOST`, default `0.0.0.0`
    pub host: String,
    /// Env: `HUSH_PORT`, default `8000`
    pub port: u16,
    /// Env: `HUSH_DB_PATH`, default `hush.db`
    pub db_path: PathBuf,
    /// Env: `HUSH_DB_READERS`
    pub db_readers: usize,
    /// Env: `SECRET_KEY`, `REFRESH_TOKEN_SECRET_KEY`, `ALGORITHM`,
    /// `ACCESS_TOKEN_EXPIRE_MINUTES`, `REFRESH_TOKEN_EXPIRE_MINUTES`
    pub tokens: TokenConfig,
    /// Env: `HUSH_COOKIE_SECURE`
    pub cookie_secure: bool,
    /// Env: `FCM_PROJECT_ID` + `FCM_ACCESS_TOKEN`; push is off unless both are set.
    pub fcm: Option<FcmConfig>,
    /// Env: `LOOP_WATCHDOG_PERIOD_MS`
    pub watchdog_period: Duration,
    /// Env: `LOOP_WATCHDOG_WARN_MS`
    pub watchdog_warn: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_secret = required_secret(get("SECRET_KEY"), "SECRET_KEY")?;
        let refresh_secret =
            required_secret(get("REFRESH_TOKEN_SECRET_KEY"), "REFRESH_TOKEN_SECRET_KEY")?;

        let algorithm = match get("ALGORITHM") {
            Some(name) => Algorithm::from_str(&name)
                .map_err(|e| anyhow!("ALGORITHM={} is not recognised: {}", name, e))?,
            None => Algorithm::HS256,
        };

        let access_minutes: i64 =
            parse_or(get("ACCESS_TOKEN_EXPIRE_MINUTES"), "ACCESS_TOKEN_EXPIRE_MINUTES", DEFAULT_ACCESS_TTL_MINUTES)?;
        let refresh_minutes: i64 = parse_or(
            get("REFRESH_TOKEN_EXPIRE_MINUTES"),
            "REFRESH_TOKEN_EXPIRE_MINUTES",
            DEFAULT_REFRESH_TTL_MINUTES,
        )?;

        let tokens = TokenConfig {
            access_secret,
            refresh_secret,
            algorithm,
            access_ttl: chrono::Duration::minutes(access_minutes),
            refresh_ttl: chrono::Duration::minutes(refresh_minutes),
        };

        let fcm = match (get("FCM_PROJECT_ID"), get("FCM_ACCESS_TOKEN")) {
            (Some(project_id), Some(access_token)) => Some(FcmConfig {
                project_id,
                access_token,
            }),
            _ => None,
        };

        let period_ms: u64 = parse_or(
            get("LOOP_WATCHDOG_PERIOD_MS"),
            "LOOP_WATCHDOG_PERIOD_MS",
            DEFAULT_SAMPLE_PERIOD.as_millis() as u64,
        )?;
        let warn_ms: u64 = parse_or(
            get("LOOP_WATCHDOG_WARN_MS"),
            "LOOP_WATCHDOG_WARN_MS",
            DEFAULT_WARN_THRESHOLD.as_millis() as u64,
        )?;
        if period_ms == 0 {
            bail!("LOOP_WATCHDOG_PERIOD_MS must be positive");
        }

        Ok(Self {
            host: get("HUSH_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("HUSH_PORT"), "HUSH_PORT", 8000)?,
            db_path: get("HUSH_DB_PATH").unwrap_or_else(|| "hush.db".into()).into(),
            db_readers: parse_or(get("HUSH_DB_READERS"), "HUSH_DB_READERS", DEFAULT_READER_POOL_SIZE)?,
            tokens,
            cookie_secure: parse_or(get("HUSH_COOKIE_SECURE"), "HUSH_COOKIE_SECURE", false)?,
            fcm,
            watchdog_period: Duration::from_millis(period_ms),
            watchdog_warn: Duration::from_millis(warn_ms),
        })
    }
}

fn required_secret(value: Option<String>, key: &str) -> Result<String> {
    match value {
        Some(secret) if !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => Ok(secret),
        Some(_) => bail!("{} is still a placeholder value", key),
        None => bail!("{} is not set", key),
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{}={} is invalid", key, raw)),
        None => Ok(default),
    }
}

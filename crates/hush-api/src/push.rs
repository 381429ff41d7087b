//! Push-notification provider seam.
//!
//! The dispatcher speaks only [`PushProvider`]; [`FcmClient`] is the
//! production implementation over the FCM HTTP v1 API.

use std::collections::BTreeMap;

use futures_util::future::{BoxFuture, join_all};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub const NOTIFICATION_TITLE: &str = "You have a new message";

pub const FCM_BASE_URL: &str = "https://fcm.googleapis.com/v1/projects";

const FCM_ERROR_TYPE: &str = "type.googleapis.com/google.firebase.fcm.v1.FcmError";

/// One notification addressed to many endpoints at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub data: BTreeMap<String, String>,
}

/// Per-endpoint result of a multicast send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// The provider refused the endpoint itself (unregistered, malformed).
    Rejected(String),
    /// The endpoint could not be reached this time; nothing is known about it.
    Unavailable(String),
}

/// Outcomes aligned index-for-index with [`MulticastMessage::tokens`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub responses: Vec<SendOutcome>,
}

impl BatchResponse {
    pub fn success_count(&self) -> usize {
        self.responses
            .iter()
            .filter(|r| matches!(r, SendOutcome::Delivered))
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }

    /// Tokens the provider rejected. Tokens without an outcome are kept.
    pub fn rejected_tokens(&self, tokens: &[String]) -> Vec<String> {
        tokens
            .iter()
            .zip(&self.responses)
            .filter(|(_, outcome)| matches!(outcome, SendOutcome::Rejected(_)))
            .map(|(token, _)| token.clone())
            .collect()
    }
}

pub trait PushProvider: Send + Sync {
    fn send_multicast<'a>(
        &'a self,
        message: &'a MulticastMessage,
    ) -> BoxFuture<'a, anyhow::Result<BatchResponse>>;
}

pub struct FcmClient {
    http: reqwest::Client,
    send_url: String,
    access_token: String,
}

impl FcmClient {
    pub fn new(project_id: &str, access_token: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_base_url(FCM_BASE_URL, project_id, access_token)
    }

    pub fn with_base_url(
        base_url: &str,
        project_id: &str,
        access_token: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            send_url: format!("{}/{}/messages:send", base_url.trim_end_matches('/'), project_id),
            access_token: access_token.into(),
        })
    }

    async fn send_one(&self, token: &str, message: &MulticastMessage) -> SendOutcome {
        let body = json!({
            "message": {
                "token": token,
                "notification": { "title": message.title },
                "data": message.data,
            }
        });

        let response = self
            .http
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => SendOutcome::Delivered,
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                let outcome = classify_failure(status, &body);
                debug!("FCM send failed ({}): {:?}", status, outcome);
                outcome
            }
            Err(e) => SendOutcome::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FcmErrorBody {
    #[serde(default)]
    error: FcmErrorStatus,
}

#[derive(Debug, Default, Deserialize)]
struct FcmErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorDetail {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

/// Maps a failed FCM response to an outcome. Only errors that describe the
/// registration token itself are `Rejected`; auth, quota, payload and server
/// errors say nothing about the device.
fn classify_failure(status: StatusCode, body: &str) -> SendOutcome {
    let parsed: FcmErrorBody = serde_json::from_str(body).unwrap_or_default();
    let error = parsed.error;
    let code = error
        .details
        .iter()
        .filter(|d| d.kind == FCM_ERROR_TYPE)
        .find_map(|d| d.error_code.clone())
        .unwrap_or_else(|| error.status.clone());
    let reason = format!("{}: {} {}", status, code, error.message);

    let names_token = error.message.to_ascii_lowercase().contains("registration token");
    match code.as_str() {
        "UNREGISTERED" => SendOutcome::Rejected(reason),
        "INVALID_ARGUMENT" if names_token => SendOutcome::Rejected(reason),
        _ => SendOutcome::Unavailable(reason),
    }
}

impl PushProvider for FcmClient {
    fn send_multicast<'a>(
        &'a self,
        message: &'a MulticastMessage,
    ) -> BoxFuture<'a, anyhow::Result<BatchResponse>> {
        Box::pin(async move {
            let sends = message.tokens.iter().map(|token| self.send_one(token, message));
            let responses = join_all(sends).await;
            Ok(BatchResponse { responses })
        })
    }
}

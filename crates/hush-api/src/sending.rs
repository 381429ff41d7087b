use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use hush_types::api::{RecipientResponse, SendQuery};

use crate::auth::normalize_id;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::push::{MulticastMessage, NOTIFICATION_TITLE};
use crate::state::{AppState, run_db};
use crate::telemetry::CheckTimer;

/// Upper bound on message content. FCM caps a data payload at 4 KB, and the
/// content travels in that payload next to the recipient id and timestamp.
pub const MAX_MESSAGE_BYTES: usize = 2048;

pub async fn get_recipient(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<RecipientResponse>, ApiError> {
    let id = normalize_id(&user_id);
    let user = run_db(&state, move |db| db.get_user(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    Ok(Json(RecipientResponse {
        id: user.id,
        name: user.name,
    }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<SendQuery>,
) -> Result<StatusCode, ApiError> {
    deliver(&state, &user_id, query.message).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Stores an anonymous message and notifies the recipient's devices.
///
/// The message is committed before any push is attempted, so a failing
/// provider can never undo delivery. Push problems are logged only.
pub async fn deliver(state: &AppState, recipient: &str, content: String) -> Result<i64, ApiError> {
    if content.len() > MAX_MESSAGE_BYTES {
        return Err(ApiError::bad_request("Message is too long"));
    }

    let mut timer = CheckTimer::start("deliver", &state.monitor);

    let recipient = normalize_id(recipient);
    let time = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    let (uid, body, at) = (recipient.clone(), content.clone(), time.clone());
    let stored = run_db(state, move |db| {
        if !db.user_exists(&uid)? {
            return Ok(None);
        }
        let message_id = db.insert_message(&uid, &body, &at)?;
        let endpoints = db.list_push_endpoints(&uid)?;
        Ok(Some((message_id, endpoints)))
    })
    .await?;

    let (message_id, endpoints) =
        stored.ok_or_else(|| ApiError::bad_request("User does not exist"))?;
    timer.cp("stored");

    info!(user_id = %recipient, message_id, "Message stored");

    if !endpoints.is_empty() {
        notify(state, &recipient, &time, &content, endpoints).await;
        timer.cp("notified");
    }

    debug!(
        user_id = %recipient,
        message_id,
        total_ms = timer.elapsed().as_secs_f64() * 1000.0,
        "Delivery finished"
    );
    Ok(message_id)
}

async fn notify(
    state: &AppState,
    recipient: &str,
    time: &str,
    content: &str,
    endpoints: Vec<String>,
) {
    let Some(push) = state.push.as_ref() else {
        debug!(user_id = %recipient, "Push disabled, skipping notification");
        return;
    };

    let message = MulticastMessage {
        tokens: endpoints,
        title: NOTIFICATION_TITLE.to_owned(),
        data: BTreeMap::from([
            ("user_id".to_owned(), recipient.to_owned()),
            ("time".to_owned(), time.to_owned()),
            ("content".to_owned(), content.to_owned()),
        ]),
    };

    let batch = match push.send_multicast(&message).await {
        Ok(batch) => batch,
        Err(e) => {
            warn!(user_id = %recipient, "Push send failed: {:#}", e);
            return;
        }
    };

    debug!(
        user_id = %recipient,
        success = batch.success_count(),
        failure = batch.failure_count(),
        "Push multicast finished"
    );

    let rejected = batch.rejected_tokens(&message.tokens);
    if rejected.is_empty() {
        return;
    }

    let uid = recipient.to_owned();
    match run_db(state, move |db| db.prune_push_endpoints(&uid, &rejected)).await {
        Ok(pruned) => info!(user_id = %recipient, pruned, "Pruned rejected push endpoints"),
        Err(e) => warn!(user_id = %recipient, "Failed to prune push endpoints: {}", e),
    }
}

use axum::{Extension, extract::State};
use tracing::debug;

use hush_db::models::MessageRow;
use hush_db::{PageCursor, PageRequest};
use hush_types::api::{Claims, Detail, InboxQuery, InboxResponse, MessageItem};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::state::{AppState, run_db};

/// An offset wins over a keyset cursor when both are given. A non-positive
/// limit means "no cap".
pub fn page_request(query: &InboxQuery) -> PageRequest {
    let cursor = match (query.skip, query.last_seen_id) {
        (Some(skip), _) => PageCursor::Offset(skip),
        (None, Some(last_seen)) => PageCursor::Before(last_seen),
        (None, None) => PageCursor::Newest,
    };
    PageRequest {
        cursor,
        limit: (query.limit > 0).then_some(query.limit),
    }
}

pub async fn get_inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxResponse>, ApiError> {
    let page = page_request(&query);

    let uid = claims.id.clone();
    let inbox = run_db(&state, move |db| {
        if !db.user_exists(&uid)? {
            return Ok(None);
        }
        db.get_inbox(&uid, page).map(Some)
    })
    .await?;

    let (counts, rows) = inbox.ok_or_else(|| ApiError::bad_request("Cannot find such user"))?;

    Ok(Json(InboxResponse {
        message_count: counts.total,
        unread_count: counts.unread,
        messages: rows.into_iter().map(message_item).collect(),
    }))
}

/// Another user's message is reported exactly like a missing one.
pub async fn get_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<MessageItem>, ApiError> {
    let owner = claims.id.clone();
    let row = run_db(&state, move |db| db.get_message(id, &owner))
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    Ok(Json(message_item(row)))
}

// The mutations below succeed whether or not a row matched.

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Detail>, ApiError> {
    let owner = claims.id.clone();
    let deleted = run_db(&state, move |db| db.delete_message(id, &owner)).await?;
    debug!(user_id = %claims.id, message_id = id, deleted, "delete_message");
    Ok(Json(Detail::new("Success")))
}

pub async fn mark_unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Detail>, ApiError> {
    set_unread(&state, &claims, id, true).await
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Detail>, ApiError> {
    set_unread(&state, &claims, id, false).await
}

async fn set_unread(
    state: &AppState,
    claims: &Claims,
    id: i64,
    unread: bool,
) -> Result<Json<Detail>, ApiError> {
    let owner = claims.id.clone();
    let matched = run_db(state, move |db| db.set_unread(id, &owner, unread)).await?;
    debug!(user_id = %claims.id, message_id = id, unread, matched, "set_unread");
    Ok(Json(Detail::new("Success")))
}

fn message_item(row: MessageRow) -> MessageItem {
    MessageItem {
        id: row.id,
        time: row.time,
        unread: row.unread,
        content: row.content,
    }
}

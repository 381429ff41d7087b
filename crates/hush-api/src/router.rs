use axum::{
    Json, Router, middleware,
    routing::{delete, get, patch, post},
};

use hush_types::api::HealthResponse;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, receiving, sending};

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(health_check))
        .route("/authentication/signup", post(auth::signup))
        .route("/authentication/login", patch(auth::login))
        .route("/authentication/refresh", post(auth::refresh))
        .route("/authentication/oauth_signup", post(auth::oauth_signup))
        .route(
            "/sending/{user_id}",
            get(sending::get_recipient).post(sending::send_message),
        );

    let protected_routes = Router::new()
        .route("/authentication/logout", patch(auth::logout))
        .route("/authentication/delete_account", delete(auth::delete_account))
        .route("/authentication/update_fcm_token", patch(auth::update_fcm_token))
        .route("/authentication/set_password", patch(auth::set_password))
        .route("/recieving/inbox", get(receiving::get_inbox))
        .route("/recieving/get_message/{id}", get(receiving::get_message))
        .route("/recieving/delete_message/{id}", delete(receiving::delete_message))
        .route("/recieving/mark_unread/{id}", patch(receiving::mark_unread))
        .route("/recieving/mark_read/{id}", patch(receiving::mark_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        detail: "Welcome to the messaging API".into(),
        health: "Good".into(),
    })
}

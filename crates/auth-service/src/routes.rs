//! HTTP routes

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::{oauth, validation};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Authorization endpoint
        .route(
            "/authorize",
            get(oauth::authorize::get_handler).post(oauth::authorize::post_handler),
        )
        // Token endpoint
        .route("/token", post(oauth::token::handler))
        // Revocation endpoint
        .route("/revoke", post(oauth::revoke::handler))
        // External IdP sign-in
        .route("/federated/authorize", get(oauth::federated::authorize_handler))
        .route("/federated/callback", get(oauth::federated::callback_handler))
        // Validation endpoint for resource servers
        .route("/validate", get(validation::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

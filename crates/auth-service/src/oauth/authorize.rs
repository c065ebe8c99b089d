//! Authorization endpoint
//!
//! `GET /authorize` checks the request and shows the login form.
//! `POST /authorize` signs the user in, issues a code and redirects back to
//! the client.

use std::sync::Arc;

use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use oauth_core::{AuthorizationServer, OAuthError};
use serde::Deserialize;

use super::html::login_page;
use crate::AppState;
use crate::error::{ApiError, required};

/// Authorization request parameters
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// Must be "code" for authorization code flow
    #[serde(default)]
    pub response_type: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    /// Redirect URI (must match a registered URI exactly)
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Space-delimited scopes, narrowed to the client's
    #[serde(default)]
    pub scope: Option<String>,

    /// Client state (passed through to redirect)
    #[serde(default)]
    pub state: Option<String>,
}

/// Login form submission: the authorization request plus credentials
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(flatten)]
    pub request: AuthorizeRequest,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn prepare(state: &AppState, params: &AuthorizeRequest) -> Result<oauth_core::PreGrant, ApiError> {
    let response_type = required(&params.response_type, "response_type")?;
    let client_id = required(&params.client_id, "client_id")?;
    let redirect_uri = required(&params.redirect_uri, "redirect_uri")?;
    Ok(state.server.prepare_authorization(
        response_type,
        client_id,
        redirect_uri,
        params.scope.as_deref(),
        params.state.as_deref(),
    )?)
}

/// Handler for `GET /authorize`
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Html<String>, ApiError> {
    let grant = prepare(&state, &params)?;
    Ok(Html(login_page(&state.authorize_action(), &grant, None)))
}

/// Handler for `POST /authorize`
pub async fn post_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    // Re-check everything; the hidden fields came back from the browser.
    let grant = prepare(&state, &form.request)?;
    let username = required(&form.username, "username")?;
    let password = required(&form.password, "password")?;

    let user_id = match state.server.authenticate_user(username, password) {
        Ok(user_id) => user_id,
        Err(OAuthError::AccessDenied(reason)) => {
            tracing::info!(client_id = %grant.client_id, "Login rejected");
            let page = login_page(&state.authorize_action(), &grant, Some(&reason));
            return Ok((StatusCode::UNAUTHORIZED, Html(page)).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let code = state
        .server
        .issue_code(&grant.client_id, &grant.redirect_uri, &user_id, &grant.scope)?;
    let location = AuthorizationServer::authorization_redirect(
        &grant.redirect_uri,
        &code,
        grant.state.as_deref(),
    )?;

    Ok(Redirect::to(&location).into_response())
}

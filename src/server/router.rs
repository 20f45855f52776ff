//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use super::callback;
use crate::Error;
use crate::lti::{CallbackMessage, LaunchService, LoginRequest};
use crate::moodle::MoodleClient;

/// Shared application state
pub struct AppState {
    /// The launch service (initiator + validator + store + key cache)
    pub launch: Arc<LaunchService>,
    /// Moodle proxy client, when credentials are configured
    pub moodle: Option<MoodleClient>,
    /// When the bridge runs in interactive `launch` mode, callback posts are
    /// forwarded into the waiting relay through this channel.
    pub relay_tx: Option<mpsc::Sender<CallbackMessage>>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/lti/login", post(login_handler))
        .route("/lti/launch", post(launch_handler))
        .route("/lti/callback", get(callback_get_handler).post(callback_post_handler))
        .route("/api/courses", get(courses_handler))
        .route("/api/courses/{id}/contents", get(course_contents_handler))
        .layer(TraceLayer::new_for_http())
        // The browsing frontend may be served from a different origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map a service error onto the JSON error body the frontend expects.
fn error_response(error: &Error) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match error {
        Error::Auth(auth) => json!({
            "success": false,
            "error": auth.to_string(),
            "details": auth.details(),
        }),
        other => json!({ "error": other.to_string() }),
    };

    (status, Json(body)).into_response()
}

/// `GET /health`
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "pending_launches": state.launch.store().len(),
    }))
}

/// `POST /lti/login` — start a launch, returning the authorization URL.
async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    match state.launch.begin_login(&request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            warn!(error = %e, "LTI login initiation failed");
            error_response(&e)
        }
    }
}

/// `POST /lti/launch` request body.
#[derive(Debug, Deserialize)]
struct LaunchRequest {
    /// The signed ID token from the platform's form post
    id_token: String,
    /// The `state` from the same form post
    state: String,
    /// Accepted for wire compatibility and ignored: the stored nonce is the
    /// only source of truth.
    #[serde(default)]
    #[allow(dead_code)]
    nonce: Option<String>,
}

/// `POST /lti/launch` — validate a returned ID token.
async fn launch_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LaunchRequest>,
) -> Response {
    if request.id_token.is_empty() {
        return error_response(&Error::InvalidRequest("id_token is required".to_string()));
    }
    if request.state.is_empty() {
        return error_response(&Error::InvalidRequest("state is required".to_string()));
    }

    match state
        .launch
        .validate_launch(&request.id_token, &request.state)
        .await
    {
        Ok(session) => {
            let body = json!({
                "success": true,
                "launchUrl": session.launch_url,
                "targetLinkUri": session.target_link_uri,
                "session": session,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "LTI launch validation failed");
            error_response(&e)
        }
    }
}

/// Parameters of the platform's authorization response.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// `POST /lti/callback` — the platform's `form_post` response.
async fn callback_post_handler(
    State(state): State<Arc<AppState>>,
    Form(params): Form<CallbackParams>,
) -> Html<String> {
    render_callback(&state, params).await
}

/// `GET /lti/callback` — some platforms fall back to a query redirect.
async fn callback_get_handler(
    State(state): State<Arc<AppState>>,
    axum::extract::Query(params): axum::extract::Query<CallbackParams>,
) -> Html<String> {
    render_callback(&state, params).await
}

async fn render_callback(state: &AppState, params: CallbackParams) -> Html<String> {
    if let Some(error) = params.error {
        let description = params
            .error_description
            .unwrap_or_else(|| "The platform rejected the login".to_string());
        warn!(error = %error, "Platform returned an authorization error");
        return Html(callback::error_page(&error, &description));
    }

    let (Some(id_token), Some(launch_state)) = (params.id_token, params.state) else {
        return Html(callback::error_page(
            "invalid_response",
            "The platform response is missing id_token or state.",
        ));
    };

    // Interactive launch mode: hand the message straight to the waiting
    // relay. The browser page still posts to its opener for the web flow.
    if let Some(ref tx) = state.relay_tx {
        let message = CallbackMessage {
            id_token: id_token.clone(),
            state: launch_state.clone(),
        };
        if tx.try_send(message).is_err() {
            debug!("No relay waiting for callback message");
        }
    }

    Html(callback::relay_page(
        &state.launch.config().tool_origin,
        &id_token,
        &launch_state,
    ))
}

/// `GET /api/courses` — Moodle course catalogue.
async fn courses_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(ref moodle) = state.moodle else {
        return error_response(&Error::Config(
            "Moodle credentials not configured".to_string(),
        ));
    };

    match moodle.courses().await {
        Ok(courses) => Json(json!({ "courses": courses })).into_response(),
        Err(e) => {
            warn!(error = %e, "Course listing failed");
            error_response(&e)
        }
    }
}

/// `GET /api/courses/{id}/contents` — sections and modules of one course.
async fn course_contents_handler(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<u64>,
) -> Response {
    let Some(ref moodle) = state.moodle else {
        return error_response(&Error::Config(
            "Moodle credentials not configured".to_string(),
        ));
    };

    match moodle.course_contents(course_id).await {
        Ok(contents) => Json(json!({ "contents": contents })).into_response(),
        Err(e) => {
            warn!(error = %e, "Course contents fetch failed");
            error_response(&e)
        }
    }
}

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::bootstrap::{self, AnswerResponse, HandshakeError};
use crate::peer::PeerFactory;
use crate::session::SessionSettings;

#[derive(Clone)]
pub struct AppState {
    pub factory: Arc<dyn PeerFactory>,
    pub settings: SessionSettings,
}

impl AppState {
    pub fn new(factory: Arc<dyn PeerFactory>, settings: SessionSettings) -> Self {
        Self { factory, settings }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route(
            "/session",
            post(create_session).fallback(method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnswerResponse>, ApiError> {
    let offer = bootstrap::parse_offer(&body)?;
    let answer = bootstrap::accept(state.factory.as_ref(), &state.settings, offer).await?;
    Ok(Json(AnswerResponse { answer }))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    MethodNotAllowed,
    Internal(String),
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: Option<String>,
}

impl From<HandshakeError> for ApiError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::BadRequest(msg) => ApiError::BadRequest(msg),
            internal @ HandshakeError::Internal { .. } => ApiError::Internal(internal.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ApiErrorBody {
                    error: "bad_request",
                    message: Some(msg),
                }),
            )
                .into_response(),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(ApiErrorBody {
                    error: "method_not_allowed",
                    message: Some("use POST".into()),
                }),
            )
                .into_response(),
            ApiError::Internal(msg) => {
                warn!(error = %msg, "session bootstrap failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiErrorBody {
                        error: "internal",
                        message: Some(msg),
                    }),
                )
                    .into_response()
            }
        }
    }
}

// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Handles POST /ask and GET /healthz.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use colloquy_core::{ColloquyError, ErrorClass};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::server::GatewayState;

/// Request body for POST /ask.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// Conversation to continue; a new one is started when absent or blank.
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub question: String,
}

/// Response body for POST /ask.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    /// Normalized conversation id, to be sent back on the next question.
    pub conversation_id: String,
    pub answer: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Response status for each error class.
pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::BadInput => StatusCode::BAD_REQUEST,
        ErrorClass::Busy => StatusCode::TOO_MANY_REQUESTS,
        ErrorClass::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
        ErrorClass::ConflictExhausted => StatusCode::CONFLICT,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A failed ask, rendered with the status of its error class.
#[derive(Debug)]
pub struct ApiError(pub ColloquyError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.class());
        if status.is_server_error() {
            warn!(error = %self.0, status = %status, "ask failed");
        } else {
            debug!(error = %self.0, status = %status, "ask rejected");
        }
        error_response(status, self.0.to_string())
    }
}

/// POST /ask
///
/// Every body rejection (bad JSON, missing field, wrong content type) is a 400.
pub async fn post_ask(
    State(state): State<GatewayState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "malformed ask body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state
        .service
        .ask(body.conversation_id.as_deref(), &body.question)
        .await
    {
        Ok(reply) => (
            StatusCode::OK,
            Json(AskResponse {
                conversation_id: reply.conversation_key.to_string(),
                answer: reply.answer,
            }),
        )
            .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// GET /healthz
pub async fn get_healthz() -> &'static str {
    "ok"
}

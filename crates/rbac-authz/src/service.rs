//! Decision API handlers.
//!
//! - `POST /v1/check`  : evaluate one request snapshot
//! - `POST /v1/reload` : re-read the config file and swap engines

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use rbac_core::{ConnectionInfo, RbacError, RequestHeaders, StreamInfo};

use crate::app_state::AppState;
use crate::filter::FilterDecision;

/// Attribute snapshot submitted for a decision. Omitting `headers` evaluates
/// the request as header-less.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckRequest {
    #[serde(default)]
    pub connection: ConnectionInfo,
    #[serde(default)]
    pub headers: Option<RequestHeaders>,
    #[serde(default)]
    pub stream: StreamInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<&RbacError> for ErrorBody {
    fn from(e: &RbacError) -> Self {
        Self {
            code: e.code().as_str(),
            message: e.to_string(),
        }
    }
}

pub async fn check(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Json<FilterDecision> {
    let filter = state.filter();
    let decision = match &req.headers {
        Some(headers) => filter.decide(&req.connection, headers, &req.stream),
        None => filter.decide_without_headers(&req.connection, &req.stream),
    };
    Json(decision)
}

pub async fn reload(State(state): State<AppState>) -> Response {
    let worker = state.clone();
    let joined =
        tokio::task::spawn_blocking(move || worker.engines().reload_from_file(worker.config_path()))
            .await;

    match joined {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "reloaded": true }))).into_response(),
        Ok(Err(e)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody::from(&e))).into_response()
        }
        Err(join) => {
            let e = RbacError::Internal(format!("reload task failed: {join}"));
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::from(&e))).into_response()
        }
    }
}

use crate::api::dto::execution::{
    ExecuteScriptRequest, ExecutionResponse, ExecutionsListResponse,
};
use crate::api::routes::AppState;
use crate::error::Result;
use crate::executor::ExecutionEvent;
use crate::models::Caller;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Starts a run and streams its events as the response body. Authorization
/// failures come back as a plain JSON error instead.
pub async fn execute_script(
    State(state): State<AppState>,
    caller: Caller,
    Path(script_id): Path<String>,
    Json(req): Json<ExecuteScriptRequest>,
) -> Result<Response> {
    let params = req.into_params()?;

    let events = state
        .execution_service
        .start_execution(&caller, &script_id, params)
        .await?;
    Ok(event_stream(events))
}

fn event_stream(events: mpsc::UnboundedReceiver<ExecutionEvent>) -> Response {
    let stream =
        UnboundedReceiverStream::new(events).map(|event| Ok::<_, Infallible>(event.to_sse()));

    // Keeps reverse proxies from buffering the stream.
    (
        [("x-accel-buffering", "no")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

pub async fn get_execution(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResponse>> {
    let execution = state.execution_service.get_execution(&id).await?;
    Ok(Json(ExecutionResponse::from(execution)))
}

pub async fn list_executions(
    State(state): State<AppState>,
    _caller: Caller,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Result<Json<ExecutionsListResponse>> {
    let script_id = params.get("script_id").cloned();

    let executions = state.execution_service.list_executions(script_id).await?;
    let response = ExecutionsListResponse {
        data: executions
            .into_iter()
            .map(ExecutionResponse::from)
            .collect(),
    };
    Ok(Json(response))
}

use crate::api::dto::script::{RegisterScriptRequest, ScriptResponse, ScriptsListResponse};
use crate::api::middleware::caller::RequireAdmin;
use crate::api::routes::AppState;
use crate::error::Result;
use crate::models::Caller;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

pub async fn list_scripts(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<ScriptsListResponse>> {
    let scripts = state.script_service.list_scripts().await?;
    let data = scripts
        .into_iter()
        .map(ScriptResponse::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(Json(ScriptsListResponse { data }))
}

pub async fn get_script(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ScriptResponse>> {
    let script = state.script_service.get_script(&id).await?;
    Ok(Json(ScriptResponse::try_from(script)?))
}

pub async fn register_script(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    Json(req): Json<RegisterScriptRequest>,
) -> Result<(StatusCode, Json<ScriptResponse>)> {
    let script = state.script_service.register_script(req.into()).await?;
    tracing::info!(
        script_id = %script.id,
        user_id = %caller.user_id,
        "Registered script '{}'",
        script.slug
    );
    Ok((StatusCode::CREATED, Json(ScriptResponse::try_from(script)?)))
}

pub async fn enable_script(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.script_service.enable_script(&id).await?;
    Ok(StatusCode::OK)
}

pub async fn disable_script(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.script_service.disable_script(&id).await?;
    Ok(StatusCode::OK)
}

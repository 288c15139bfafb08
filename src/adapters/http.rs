use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{change_log::ChangeRecord, inventory::Socket, polymorphic::PolyQuery, store::Store},
    },
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        routing::get,
    },
    serde::Deserialize,
    uuid::Uuid,
};

pub fn router<S: Store + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/history/{object_type}/{id}", get(history_handler::<S>))
        .route("/sockets", get(sockets_handler::<S>))
        .with_state(state)
}

pub async fn history_handler<S: Store>(
    State(state): State<AppState<S>>,
    Path((object_type, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<ChangeRecord>>, ApiError> {
    let records = state.recorder.history(&object_type, id).await?;
    Ok(Json(records))
}

#[derive(Debug, Default, Deserialize)]
pub struct SocketFilter {
    pub device_id: Option<Uuid>,
    pub kind: Option<String>,
}

pub async fn sockets_handler<S: Store>(
    State(state): State<AppState<S>>,
    Query(filter): Query<SocketFilter>,
) -> Result<Json<Vec<Socket>>, ApiError> {
    let mut query = PolyQuery::new().order_by("name");
    if let Some(device_id) = filter.device_id {
        query = query.eq("device_id", device_id.to_string());
    }
    if let Some(kind) = &filter.kind {
        query = query.of_kinds(&[kind.as_str()]);
    }

    let sockets = state.sockets.filter(query).await?;
    Ok(Json(sockets))
}

//! HTTP surface for the Frontend Read API (C8), served on `http_port`
//! separately from the edge↔manager WebSocket port, grounded on
//! `meta/src/server/public.rs`'s `Router`/`get`/`Query`/`State` layout —
//! minus its Keycloak auth layer, which spec.md §1 explicitly excludes from
//! the edge↔manager trust boundary and the frontend never needed either.

use std::sync::Arc;

use axum::extract::{
    Path,
    Query,
    State,
};
use axum::http::StatusCode;
use axum::response::{
    IntoResponse,
    Response,
};
use axum::routing::get;
use axum::{
    Json,
    Router,
};
use chrono::{
    DateTime,
    Utc,
};
use meshctl_common::error::Error;
use meshctl_common::ids::ClusterId;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::{
    Any,
    CorsLayer,
};
use tracing::info;

use crate::frontend::FrontendApi;

#[derive(Clone)]
struct AppState {
    frontend: Arc<FrontendApi>,
}

pub fn router(frontend: Arc<FrontendApi>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/services", get(list_services))
        .route("/services/{id}", get(get_service))
        .route("/services/{id}/instances/{instance_id}", get(get_service_instance))
        .route(
            "/services/{id}/instances/{instance_id}/proxy-config",
            get(get_proxy_config),
        )
        .route(
            "/services/{id}/instances/{instance_id}/istio-resources",
            get(get_istio_resources),
        )
        .route("/clusters", get(list_clusters))
        .route("/service-connections", get(get_service_connections))
        .layer(cors)
        .with_state(AppState { frontend })
}

pub async fn serve(frontend: Arc<FrontendApi>, listener: TcpListener) -> Result<(), Error> {
    info!(addr = ?listener.local_addr().ok(), "frontend HTTP API listening");
    axum::serve(listener, router(frontend))
        .await
        .map_err(|e| Error::Internal(format!("http server failed: {e}")))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::NotConnected(_) | Error::ClusterDisconnected(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Backpressure(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Error::EdgeError(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ListServicesQuery {
    namespace: Option<String>,
    cluster_id: Option<String>,
}

async fn list_services(
    State(state): State<AppState>, Query(query): Query<ListServicesQuery>,
) -> Result<impl IntoResponse, Error> {
    let cluster_id = query.cluster_id.map(ClusterId::new).transpose()?;
    let services = state
        .frontend
        .list_services(query.namespace.as_deref(), cluster_id.as_ref());
    Ok(Json(serde_json::json!({ "services": services })))
}

async fn get_service(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, Error> {
    let service = state.frontend.get_service(&id)?;
    Ok(Json(serde_json::json!({ "service": service })))
}

async fn get_service_instance(
    State(state): State<AppState>, Path((id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let instance = state.frontend.get_service_instance(&id, &instance_id)?;
    Ok(Json(serde_json::json!({ "instance": instance })))
}

async fn get_proxy_config(
    State(state): State<AppState>, Path((id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let config = state.frontend.get_proxy_config(&id, &instance_id).await?;
    Ok(Json(serde_json::json!({ "proxy_config": config })))
}

async fn get_istio_resources(
    State(state): State<AppState>, Path((id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let resources = state.frontend.get_istio_resources(&id, &instance_id)?;
    Ok(Json(serde_json::to_value(resources).unwrap_or_default()))
}

async fn list_clusters(State(state): State<AppState>) -> impl IntoResponse {
    let clusters = state.frontend.list_clusters().await;
    Json(serde_json::json!({ "clusters": clusters }))
}

#[derive(Debug, Deserialize)]
struct ServiceConnectionsQuery {
    service: String,
    namespace: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

async fn get_service_connections(
    State(state): State<AppState>, Query(query): Query<ServiceConnectionsQuery>,
) -> Result<impl IntoResponse, Error> {
    let connections = state
        .frontend
        .get_service_connections(&query.service, &query.namespace, query.start_time, query.end_time)
        .await?;
    Ok(Json(serde_json::to_value(connections).unwrap_or_default()))
}

//! HTTP control API
//!
//! Thin axum layer over [`DaemonService`]. Only gateway nodes serve it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use veilhop_network::Overlay;

use crate::service::{
    ConnectParams, ConnectResponse, DaemonService, DisconnectResponse, PeerInfo, StatusResponse,
};
use crate::Result;

/// Build the control API router.
pub fn router<T: Overlay>(service: Arc<DaemonService<T>>) -> Router {
    Router::new()
        .route("/api/peers", get(list_peers::<T>))
        .route("/api/connect", post(connect::<T>))
        .route("/api/disconnect", post(disconnect::<T>))
        .route("/api/status", get(status::<T>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(service)
}

/// Serve the control API on `addr` until `shutdown` resolves.
pub async fn serve<T, F>(addr: SocketAddr, service: Arc<DaemonService<T>>, shutdown: F) -> Result<()>
where
    T: Overlay,
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, service, shutdown).await
}

/// Serve the control API on an already bound listener.
pub async fn serve_listener<T, F>(
    listener: TcpListener,
    service: Arc<DaemonService<T>>,
    shutdown: F,
) -> Result<()>
where
    T: Overlay,
    F: Future<Output = ()> + Send + 'static,
{
    info!("Control API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn list_peers<T: Overlay>(
    State(service): State<Arc<DaemonService<T>>>,
) -> Json<Vec<PeerInfo>> {
    Json(service.peers())
}

// The body is parsed by hand so a missing or malformed one still connects.
async fn connect<T: Overlay>(
    State(service): State<Arc<DaemonService<T>>>,
    body: Bytes,
) -> (StatusCode, Json<ConnectResponse>) {
    let params = ConnectParams::from_body(&body);

    match service.connect(params).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            let code = if e.is_insufficient_peers() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (code, Json(ConnectResponse::error(e.to_string())))
        }
    }
}

async fn disconnect<T: Overlay>(
    State(service): State<Arc<DaemonService<T>>>,
) -> Json<DisconnectResponse> {
    Json(service.disconnect().await)
}

async fn status<T: Overlay>(State(service): State<Arc<DaemonService<T>>>) -> Json<StatusResponse> {
    Json(service.status().await)
}

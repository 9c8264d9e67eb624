//! Request/response control surface
//!
//! Three idempotent routes feeding the same dispatcher as the persistent
//! connection:
//! - `GET /play`   triggers `Play`, returns `{"status":"playing"}`
//! - `GET /stop`   triggers `Stop`, returns `{"status":"stopped"}`
//! - `GET /status` returns the current alarm state

use std::future::Future;
use std::net::SocketAddr;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use alarm_core::prelude::*;
use alarm_core::Command;

use crate::service::ServiceHandle;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    fn from_playing(playing: bool) -> Self {
        Self {
            status: if playing { "playing" } else { "stopped" },
        }
    }
}

pub fn router(handle: ServiceHandle) -> Router {
    Router::new()
        .route("/play", get(play))
        .route("/stop", get(stop))
        .route("/status", get(status))
        .with_state(handle)
}

async fn play(State(handle): State<ServiceHandle>) -> Json<StatusResponse> {
    info!("HTTP /play");
    handle.dispatch(Command::Play);
    Json(StatusResponse::from_playing(true))
}

async fn stop(State(handle): State<ServiceHandle>) -> Json<StatusResponse> {
    info!("HTTP /stop");
    handle.dispatch(Command::Stop);
    Json(StatusResponse::from_playing(false))
}

async fn status(State(handle): State<ServiceHandle>) -> Json<StatusResponse> {
    Json(StatusResponse::from_playing(handle.state().alarm_playing))
}

/// Serve the control routes on `bind` until `shutdown` resolves.
pub async fn serve<F>(bind: SocketAddr, handle: ServiceHandle, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| Error::http(format!("bind {bind}: {e}")))?;
    info!("HTTP control listening on http://{}", bind);

    axum::serve(listener, router(handle))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::http(e.to_string()))
}

//! REST control surface for the relay
//!
//! Thin translation layer over [`RelayLoop`]: every handler maps one HTTP
//! request to one state operation and returns a small JSON body. Handlers
//! never block on the relay's work; status reads come from a lock-free-feel
//! snapshot.

use crate::runloop::{RelayLoop, StartReply};
use crate::state::StateSnapshot;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Router exposing the relay control endpoints
pub fn relay_api_router(relay: Arc<RelayLoop>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/start", post(start_relay))
        .route("/stop", post(stop_relay))
        .route("/skip", post(skip_item))
        .route("/playlist", get(get_playlist))
        .route("/status", get(get_status))
        .route("/health", get(get_status))
        .with_state(relay)
}

/// Service banner returned at the root
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfoResponse {
    pub name: String,
    pub running: bool,
    pub current_index: usize,
    pub playlist_size: usize,
    pub sink: String,
}

/// Reply to a start request
#[derive(Debug, Serialize, ToSchema)]
pub struct StartResponse {
    pub started: bool,
    pub message: String,
}

/// Reply to a stop request
#[derive(Debug, Serialize, ToSchema)]
pub struct StopResponse {
    pub stopped: bool,
    pub message: String,
}

/// Reply to a skip request
#[derive(Debug, Serialize, ToSchema)]
pub struct SkipResponse {
    /// Index the relay will play next
    pub index: usize,
}

/// One playlist entry as exposed over the API
#[derive(Debug, Serialize, ToSchema)]
pub struct PlaylistEntryResponse {
    pub position: usize,
    pub url: String,
    pub video_id: Option<String>,
    /// Whether this is the entry the relay is currently positioned on
    pub active: bool,
}

/// Full playlist listing
#[derive(Debug, Serialize, ToSchema)]
pub struct PlaylistResponse {
    pub current_index: usize,
    pub entries: Vec<PlaylistEntryResponse>,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "relay",
    responses(
        (status = 200, description = "Service identity and position", body = ServiceInfoResponse)
    )
)]
pub async fn service_info(State(relay): State<Arc<RelayLoop>>) -> Json<ServiceInfoResponse> {
    let status = relay.status();
    Json(ServiceInfoResponse {
        name: "relaycast".to_string(),
        running: status.running,
        current_index: status.current_index,
        playlist_size: relay.playlist().len(),
        sink: relay.sink().srt_uri(),
    })
}

#[utoipa::path(
    post,
    path = "/start",
    tag = "relay",
    responses(
        (status = 200, description = "Start accepted or already running", body = StartResponse)
    )
)]
pub async fn start_relay(State(relay): State<Arc<RelayLoop>>) -> Json<StartResponse> {
    match relay.start() {
        StartReply::Started => Json(StartResponse {
            started: true,
            message: "relay started".to_string(),
        }),
        StartReply::AlreadyRunning => Json(StartResponse {
            started: false,
            message: "already running".to_string(),
        }),
    }
}

#[utoipa::path(
    post,
    path = "/stop",
    tag = "relay",
    responses(
        (status = 200, description = "Stop accepted or already stopped", body = StopResponse)
    )
)]
pub async fn stop_relay(State(relay): State<Arc<RelayLoop>>) -> Json<StopResponse> {
    if relay.stop() {
        Json(StopResponse {
            stopped: true,
            message: "relay stopping".to_string(),
        })
    } else {
        Json(StopResponse {
            stopped: false,
            message: "not running".to_string(),
        })
    }
}

#[utoipa::path(
    post,
    path = "/skip",
    tag = "relay",
    responses(
        (status = 200, description = "Index the relay moved to", body = SkipResponse)
    )
)]
pub async fn skip_item(State(relay): State<Arc<RelayLoop>>) -> Json<SkipResponse> {
    Json(SkipResponse {
        index: relay.skip(),
    })
}

#[utoipa::path(
    get,
    path = "/playlist",
    tag = "relay",
    responses(
        (status = 200, description = "Configured playlist with the active entry marked", body = PlaylistResponse)
    )
)]
pub async fn get_playlist(State(relay): State<Arc<RelayLoop>>) -> Json<PlaylistResponse> {
    let current_index = relay.status().current_index;
    let entries = relay
        .playlist()
        .items()
        .iter()
        .map(|item| PlaylistEntryResponse {
            position: item.position,
            url: item.url.clone(),
            video_id: item.video_id.clone(),
            active: item.position == current_index,
        })
        .collect();

    Json(PlaylistResponse {
        current_index,
        entries,
    })
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "relay",
    responses(
        (status = 200, description = "Run state, counters and uptime", body = StateSnapshot)
    )
)]
pub async fn get_status(State(relay): State<Arc<RelayLoop>>) -> Json<StateSnapshot> {
    Json(relay.status())
}

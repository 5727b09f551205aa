//! OpenAPI documentation for the relay control endpoints

use utoipa::OpenApi;

/// OpenAPI document covering the relay control surface
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::service_info,
        crate::api::start_relay,
        crate::api::stop_relay,
        crate::api::skip_item,
        crate::api::get_playlist,
        crate::api::get_status,
    ),
    components(
        schemas(
            crate::api::ServiceInfoResponse,
            crate::api::StartResponse,
            crate::api::StopResponse,
            crate::api::SkipResponse,
            crate::api::PlaylistEntryResponse,
            crate::api::PlaylistResponse,
            crate::state::StateSnapshot,
        )
    ),
    tags(
        (name = "relay", description = "Playlist relay control and status")
    ),
    info(
        title = "Relaycast API",
        version = "0.1.0",
        description = r#"
# Playlist relay control

Endpoints driving the continuous playlist-to-SRT relay:
- `POST /start`, `POST /stop`, `POST /skip` change the run state
- `GET /status` and `GET /health` report counters and uptime
- `GET /playlist` lists the configured entries with the active one marked

All bodies are JSON; start and stop are idempotent.
        "#,
        license(
            name = "MIT",
        ),
    )
)]
pub struct ApiDoc;

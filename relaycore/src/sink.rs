//! Transport sink descriptor
//!
//! The sink is the single fixed network destination receiving the live
//! transport stream. It is read from configuration at startup and immutable
//! afterwards.

use serde::Serialize;
use utoipa::ToSchema;

/// The fixed SRT endpoint the relay pushes to
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SinkDescriptor {
    pub host: String,
    pub port: u16,
    /// Stream identifier carried in the SRT `streamid` query parameter
    pub stream_id: String,
}

impl SinkDescriptor {
    pub fn new(host: impl Into<String>, port: u16, stream_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            stream_id: stream_id.into(),
        }
    }

    /// Builds the descriptor from the global configuration
    pub fn from_config() -> anyhow::Result<Self> {
        let (host, port, stream_id) = relayconfig::get_config().get_sink()?;
        Ok(Self::new(host, port, stream_id))
    }

    /// Full SRT URI understood by ffmpeg and srtserversink
    pub fn srt_uri(&self) -> String {
        format!(
            "srt://{}:{}?streamid={}",
            self.host, self.port, self.stream_id
        )
    }
}

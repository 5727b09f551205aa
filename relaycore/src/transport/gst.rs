//! GStreamer transport strategy
//!
//! Fallback encoder using `gst-launch-1.0` with a filesrc pipeline. Only
//! staged files are supported; remote content is reported as a per-strategy
//! failure so the chain can keep its diagnostics.

use crate::acquire::{AcquiredContent, ContentSource};
use crate::error::DeliverError;
use crate::sink::SinkDescriptor;
use crate::transport::{drain_stderr, supervise_child, TransportStrategy};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

const COMMAND: &str = "gst-launch-1.0";

/// Transport driving an external `gst-launch-1.0` pipeline
pub struct GstTransport {
    /// Bound on how long a kill may take before the child is detached
    grace: Duration,
}

impl GstTransport {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Pipeline description for one delivery
    fn build_args(path: &str, srt_uri: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "filesrc",
            "!",
            "decodebin",
            "!",
            "videoconvert",
            "!",
            "x264enc",
            "tune=zerolatency",
            "bitrate=2500",
            "!",
            "h264parse",
            "!",
            "mpegtsmux",
            "!",
            "srtserversink",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.insert(1, format!("location={path}"));
        args.push(format!("uri={srt_uri}"));
        args
    }
}

#[async_trait]
impl TransportStrategy for GstTransport {
    fn name(&self) -> &'static str {
        COMMAND
    }

    async fn deliver(
        &self,
        content: &AcquiredContent,
        sink: &SinkDescriptor,
        cancel: CancellationToken,
        limit: Duration,
    ) -> Result<(), DeliverError> {
        let path = match &content.source {
            ContentSource::Staged(path) => path.to_string_lossy().into_owned(),
            ContentSource::Remote(_) => {
                return Err(DeliverError::UnsupportedSource("remote"));
            }
        };

        let srt_uri = sink.srt_uri();
        info!(input = %path, sink = %srt_uri, "streaming with gstreamer");

        let mut child = Command::new(COMMAND)
            .args(Self::build_args(&path, &srt_uri))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DeliverError::Spawn {
                command: COMMAND,
                source,
            })?;

        drain_stderr(COMMAND, &mut child);
        supervise_child(COMMAND, child, &cancel, limit, self.grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::ContentSource;

    #[test]
    fn pipeline_links_filesrc_to_srtserversink() {
        let args =
            GstTransport::build_args("/downloads/abc.mp4", "srt://sink.example:2935?streamid=s1");

        assert_eq!(args[0], "filesrc");
        assert_eq!(args[1], "location=/downloads/abc.mp4");
        assert_eq!(args.last().unwrap(), "uri=srt://sink.example:2935?streamid=s1");
    }

    #[tokio::test]
    async fn remote_content_is_a_per_strategy_failure() {
        let transport = GstTransport::new(Duration::from_secs(5));
        let content = AcquiredContent {
            source: ContentSource::Remote("https://cdn.example/clip.mp4".into()),
            strategy: "test",
            title: None,
            duration_secs: None,
        };
        let sink = SinkDescriptor::new("sink.example", 2935, "s1");

        let result = transport
            .deliver(
                &content,
                &sink,
                CancellationToken::new(),
                Duration::from_secs(10),
            )
            .await;

        assert!(matches!(result, Err(DeliverError::UnsupportedSource(_))));
    }
}

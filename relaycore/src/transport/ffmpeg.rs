//! FFmpeg transport strategy
//!
//! Spawns `ffmpeg` reading the content at native speed (`-re`) and pushing
//! an MPEG-TS stream to the SRT sink. FFmpeg ingests both staged files and
//! remote URLs, which makes this the primary strategy for either content
//! source.

use crate::acquire::AcquiredContent;
use crate::error::DeliverError;
use crate::sink::SinkDescriptor;
use crate::transport::{drain_stderr, supervise_child, TransportStrategy};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

const COMMAND: &str = "ffmpeg";

/// Transport driving an external `ffmpeg` process
pub struct FfmpegTransport {
    /// Bound on how long a kill may take before the child is detached
    grace: Duration,
}

impl FfmpegTransport {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Encoder arguments for one delivery
    fn build_args(input: &str, srt_uri: &str) -> Vec<String> {
        [
            "-re",
            "-i",
            input,
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-tune",
            "zerolatency",
            "-c:a",
            "aac",
            "-b:v",
            "2500k",
            "-b:a",
            "128k",
            "-f",
            "mpegts",
            srt_uri,
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

#[async_trait]
impl TransportStrategy for FfmpegTransport {
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
        let input = content.locator();
        let srt_uri = sink.srt_uri();
        info!(input = %input, sink = %srt_uri, "streaming with ffmpeg");

        let mut child = Command::new(COMMAND)
            .args(Self::build_args(&input, &srt_uri))
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

    #[test]
    fn args_read_at_native_speed_and_target_mpegts() {
        let args = FfmpegTransport::build_args(
            "/downloads/abc.mp4",
            "srt://sink.example:2935?streamid=s1",
        );

        assert_eq!(args[0], "-re");
        assert_eq!(args[1], "-i");
        assert_eq!(args[2], "/downloads/abc.mp4");
        assert!(args.windows(2).any(|w| w == ["-f", "mpegts"]));
        assert_eq!(args.last().unwrap(), "srt://sink.example:2935?streamid=s1");
    }

    #[test]
    fn args_accept_remote_inputs() {
        let args = FfmpegTransport::build_args(
            "https://cdn.example/abc.mp4",
            "srt://sink.example:2935?streamid=s1",
        );
        assert_eq!(args[2], "https://cdn.example/abc.mp4");
    }
}

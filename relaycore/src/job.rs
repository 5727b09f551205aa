//! One playlist item driven end to end
//!
//! A [`RelayJob`] walks `Acquiring → Delivering → terminal` for exactly one
//! item. All retry logic lives inside the strategies; the job itself never
//! retries. Whatever the terminal state, staged content is removed before
//! the job returns — cleanup is best effort and only ever logs.

use crate::acquire::{
    run_acquisition_chain, AcquiredContent, AcquisitionOutcome, AcquisitionStrategy,
};
use crate::error::{AcquisitionError, TransportError};
use crate::playlist::PlaylistItem;
use crate::sink::SinkDescriptor;
use crate::transport::{run_transport_chain, DeliveryOutcome, TransportStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Terminal result of one relay job, consumed for statistics and logging
#[derive(Debug)]
pub enum RelayOutcome {
    /// The item reached the sink through the named transport strategy
    Delivered { strategy: &'static str },
    /// Every acquisition strategy failed; delivery never started
    AcquisitionFailed(AcquisitionError),
    /// Content was acquired but every transport strategy failed
    TransportFailed(TransportError),
    /// Stop or skip ended the job before natural completion
    Cancelled,
}

impl RelayOutcome {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            RelayOutcome::Delivered { .. } => "delivered",
            RelayOutcome::AcquisitionFailed(_) => "acquisition_failed",
            RelayOutcome::TransportFailed(_) => "transport_failed",
            RelayOutcome::Cancelled => "cancelled",
        }
    }
}

/// Time-bound policy for deliveries
#[derive(Debug, Clone, Copy)]
pub struct JobLimits {
    /// Stand-in duration when the content carries no usable hint
    pub default_duration: Duration,
    /// Margin added on top of the duration hint, also the cancellation grace
    pub safety_margin: Duration,
}

impl JobLimits {
    /// Builds the limits from the global configuration
    pub fn from_config() -> Self {
        let config = relayconfig::get_config();
        Self {
            default_duration: Duration::from_secs(config.get_default_duration_secs()),
            safety_margin: Duration::from_secs(config.get_safety_margin_secs()),
        }
    }

    /// Upper bound for one delivery
    ///
    /// The duration hint is best effort; an absent or zero hint falls back
    /// to the configured default rather than disabling the bound.
    pub fn limit_for(&self, duration_hint: Option<u64>) -> Duration {
        let base = duration_hint
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.default_duration);
        base + self.safety_margin
    }
}

/// The unit of work processing exactly one playlist item
pub struct RelayJob {
    item: PlaylistItem,
    sink: SinkDescriptor,
    acquirers: Vec<Arc<dyn AcquisitionStrategy>>,
    transports: Vec<Arc<dyn TransportStrategy>>,
    cancel: CancellationToken,
    limits: JobLimits,
}

impl RelayJob {
    pub fn new(
        item: PlaylistItem,
        sink: SinkDescriptor,
        acquirers: Vec<Arc<dyn AcquisitionStrategy>>,
        transports: Vec<Arc<dyn TransportStrategy>>,
        cancel: CancellationToken,
        limits: JobLimits,
    ) -> Self {
        Self {
            item,
            sink,
            acquirers,
            transports,
            cancel,
            limits,
        }
    }

    /// Runs the job to a terminal state
    pub async fn run(self) -> RelayOutcome {
        let acquired =
            match run_acquisition_chain(&self.acquirers, &self.item, &self.cancel).await {
                AcquisitionOutcome::Acquired(content) => content,
                AcquisitionOutcome::Exhausted(error) => {
                    warn!(item = self.item.short_id(), %error, "acquisition exhausted");
                    return RelayOutcome::AcquisitionFailed(error);
                }
                AcquisitionOutcome::Cancelled => return RelayOutcome::Cancelled,
            };

        info!(
            item = self.item.short_id(),
            strategy = acquired.strategy,
            title = acquired.title.as_deref().unwrap_or("<unknown>"),
            "content acquired"
        );

        // A stop/skip may have landed between the two chains
        let outcome = if self.cancel.is_cancelled() {
            RelayOutcome::Cancelled
        } else {
            let limit = self.limits.limit_for(acquired.duration_secs);
            match run_transport_chain(
                &self.transports,
                &acquired,
                &self.sink,
                &self.cancel,
                limit,
            )
            .await
            {
                DeliveryOutcome::Delivered { strategy } => RelayOutcome::Delivered { strategy },
                DeliveryOutcome::Exhausted(error) => {
                    warn!(item = self.item.short_id(), %error, "transport exhausted");
                    RelayOutcome::TransportFailed(error)
                }
                DeliveryOutcome::Cancelled => RelayOutcome::Cancelled,
            }
        };

        cleanup_staged(&acquired).await;
        outcome
    }
}

/// Removes staged content, logging instead of propagating failures
async fn cleanup_staged(content: &AcquiredContent) {
    let Some(path) = content.staged_path() else {
        return;
    };

    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "staged file removed"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "staged file already gone")
        }
        Err(error) => warn!(path = %path.display(), %error, "failed to remove staged file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::ContentSource;
    use crate::error::{AcquireError, DeliverError};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn item() -> PlaylistItem {
        PlaylistItem {
            position: 0,
            url: "https://youtu.be/test".into(),
            video_id: Some("test".into()),
        }
    }

    fn sink() -> SinkDescriptor {
        SinkDescriptor::new("sink.example", 2935, "s1")
    }

    fn limits() -> JobLimits {
        JobLimits {
            default_duration: Duration::from_secs(600),
            safety_margin: Duration::from_secs(90),
        }
    }

    struct StagingAcquirer {
        path: PathBuf,
    }

    #[async_trait]
    impl AcquisitionStrategy for StagingAcquirer {
        fn name(&self) -> &'static str {
            "staging"
        }

        async fn acquire(&self, _item: &PlaylistItem) -> Result<AcquiredContent, AcquireError> {
            tokio::fs::write(&self.path, b"media").await?;
            Ok(AcquiredContent {
                source: ContentSource::Staged(self.path.clone()),
                strategy: "staging",
                title: Some("clip".into()),
                duration_secs: Some(120),
            })
        }
    }

    struct FailingAcquirer;

    #[async_trait]
    impl AcquisitionStrategy for FailingAcquirer {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn acquire(&self, _item: &PlaylistItem) -> Result<AcquiredContent, AcquireError> {
            Err(AcquireError::MissingDownloadUrl)
        }
    }

    struct CountingTransport {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl TransportStrategy for CountingTransport {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(
            &self,
            _content: &AcquiredContent,
            _sink: &SinkDescriptor,
            _cancel: CancellationToken,
            limit: Duration,
        ) -> Result<(), DeliverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DeliverError::Timeout { limit })
            } else {
                Ok(())
            }
        }
    }

    /// Waits for its token like an encoder under cancellation
    struct BlockingTransport;

    #[async_trait]
    impl TransportStrategy for BlockingTransport {
        fn name(&self) -> &'static str {
            "blocking"
        }

        async fn deliver(
            &self,
            _content: &AcquiredContent,
            _sink: &SinkDescriptor,
            cancel: CancellationToken,
            _limit: Duration,
        ) -> Result<(), DeliverError> {
            cancel.cancelled().await;
            Ok(())
        }
    }

    #[test]
    fn limit_uses_hint_plus_margin() {
        assert_eq!(limits().limit_for(Some(245)), Duration::from_secs(335));
    }

    #[test]
    fn limit_falls_back_on_missing_or_zero_hint() {
        assert_eq!(limits().limit_for(None), Duration::from_secs(690));
        assert_eq!(limits().limit_for(Some(0)), Duration::from_secs(690));
    }

    #[tokio::test]
    async fn delivered_job_cleans_its_staged_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("test.mp4");
        let calls = Arc::new(AtomicUsize::new(0));

        let job = RelayJob::new(
            item(),
            sink(),
            vec![Arc::new(StagingAcquirer { path: path.clone() })],
            vec![Arc::new(CountingTransport {
                calls: calls.clone(),
                fail: false,
            })],
            CancellationToken::new(),
            limits(),
        );

        let outcome = job.run().await;
        assert!(matches!(outcome, RelayOutcome::Delivered { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!path.exists(), "staged file must be removed");
    }

    #[tokio::test]
    async fn failed_transport_still_cleans_up() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("test.mp4");

        let job = RelayJob::new(
            item(),
            sink(),
            vec![Arc::new(StagingAcquirer { path: path.clone() })],
            vec![Arc::new(CountingTransport {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: true,
            })],
            CancellationToken::new(),
            limits(),
        );

        let outcome = job.run().await;
        assert!(matches!(outcome, RelayOutcome::TransportFailed(_)));
        assert!(!path.exists(), "staged file must be removed");
    }

    #[tokio::test]
    async fn acquisition_failure_skips_delivery() {
        let calls = Arc::new(AtomicUsize::new(0));

        let job = RelayJob::new(
            item(),
            sink(),
            vec![Arc::new(FailingAcquirer)],
            vec![Arc::new(CountingTransport {
                calls: calls.clone(),
                fail: false,
            })],
            CancellationToken::new(),
            limits(),
        );

        let outcome = job.run().await;
        assert!(matches!(outcome, RelayOutcome::AcquisitionFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "delivery must not start");
    }

    #[tokio::test]
    async fn cancellation_mid_delivery_reaches_cancelled_and_cleans_up() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("test.mp4");
        let cancel = CancellationToken::new();

        let job = RelayJob::new(
            item(),
            sink(),
            vec![Arc::new(StagingAcquirer { path: path.clone() })],
            vec![Arc::new(BlockingTransport)],
            cancel.clone(),
            limits(),
        );

        let run = job.run();
        let cancel_soon = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        };

        let (outcome, ()) = tokio::join!(run, cancel_soon);
        assert!(matches!(outcome, RelayOutcome::Cancelled));
        assert!(!path.exists(), "staged file must be removed");
    }
}

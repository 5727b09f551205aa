//! The continuous relay loop
//!
//! `RelayLoop` owns the playlist, the strategy chains and the shared state,
//! and runs items one at a time for as long as the relay is running. The
//! playlist is treated as circular; the loop never exits on item failure,
//! only on an explicit stop.

use crate::acquire::AcquisitionStrategy;
use crate::job::{JobLimits, RelayJob, RelayOutcome};
use crate::playlist::Playlist;
use crate::sink::SinkDescriptor;
use crate::state::{RelayState, StateSnapshot};
use crate::transport::TransportStrategy;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tunables of the loop, read from the global configuration at startup
#[derive(Debug, Clone, Copy)]
pub struct RelayLoopOptions {
    /// Pause between consecutive items
    pub pause: Duration,
    pub limits: JobLimits,
    /// Zero the cumulative counters on every start
    pub reset_stats_on_start: bool,
}

impl RelayLoopOptions {
    pub fn from_config() -> Self {
        let config = relayconfig::get_config();
        Self {
            pause: Duration::from_secs(config.get_pause_secs()),
            limits: JobLimits::from_config(),
            reset_stats_on_start: config.get_reset_stats_on_start(),
        }
    }
}

/// What a start request resolved to
#[derive(Debug, PartialEq, Eq)]
pub enum StartReply {
    Started,
    AlreadyRunning,
}

/// Orchestrator cycling the playlist into the sink
pub struct RelayLoop {
    playlist: Arc<Playlist>,
    sink: SinkDescriptor,
    acquirers: Vec<Arc<dyn AcquisitionStrategy>>,
    transports: Vec<Arc<dyn TransportStrategy>>,
    state: Arc<RelayState>,
    options: RelayLoopOptions,
}

impl RelayLoop {
    pub fn new(
        playlist: Arc<Playlist>,
        sink: SinkDescriptor,
        acquirers: Vec<Arc<dyn AcquisitionStrategy>>,
        transports: Vec<Arc<dyn TransportStrategy>>,
        options: RelayLoopOptions,
    ) -> Self {
        let state = Arc::new(RelayState::new(playlist.len()));
        Self {
            playlist,
            sink,
            acquirers,
            transports,
            state,
            options,
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn sink(&self) -> &SinkDescriptor {
        &self.sink
    }

    /// Starts the loop on a background task if it is not already running
    pub fn start(self: &Arc<Self>) -> StartReply {
        let Some(run_token) = self.state.try_start(self.options.reset_stats_on_start) else {
            return StartReply::AlreadyRunning;
        };

        info!(
            playlist_size = self.playlist.len(),
            sink = %self.sink.srt_uri(),
            "relay loop starting"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(run_token).await;
            info!("relay loop stopped");
        });
        StartReply::Started
    }

    /// Requests a stop; returns whether a run was active
    ///
    /// The in-flight delivery is cancelled immediately; the loop task winds
    /// down on its own shortly after.
    pub fn stop(&self) -> bool {
        let stopped = self.state.request_stop();
        if stopped {
            info!("relay loop stop requested");
        }
        stopped
    }

    /// Skips to the next item; valid whether or not the loop is running
    pub fn skip(&self) -> usize {
        let index = self.state.skip();
        info!(index, "skipped to next item");
        index
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn status(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    async fn run(&self, run_token: CancellationToken) {
        loop {
            // A `None` ticket means a stop landed; the loop is done.
            let Some(ticket) = self.state.begin_job() else {
                break;
            };

            // State and playlist share one length, so the index is in range
            let item = self.playlist.get(ticket.index);

            info!(
                index = ticket.index,
                item = item.short_id(),
                "processing playlist item"
            );

            let job = RelayJob::new(
                item.clone(),
                self.sink.clone(),
                self.acquirers.clone(),
                self.transports.clone(),
                ticket.cancel.clone(),
                self.options.limits,
            );

            let outcome = job.run().await;
            debug!(
                index = ticket.index,
                outcome = outcome.label(),
                "playlist item finished"
            );
            self.state.finish_job(ticket.job_id, &outcome);

            // Skips own the index while the job was in flight
            let advanced = self.state.advance_if_unchanged(ticket.epoch);
            if !advanced {
                debug!(index = ticket.index, "advance superseded by skip");
            }

            if !self.state.is_running() {
                break;
            }

            // Breathe between items; a stop or skip-driven restart cuts the
            // pause short through the run token.
            if matches!(outcome, RelayOutcome::Cancelled) {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.options.pause) => {}
                _ = run_token.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{AcquiredContent, ContentSource};
    use crate::error::{AcquireError, DeliverError};
    use crate::playlist::PlaylistItem;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    fn playlist(n: usize) -> Arc<Playlist> {
        let urls: Vec<String> = (0..n)
            .map(|i| format!("https://youtu.be/clip{i}"))
            .collect();
        Arc::new(Playlist::from_urls(urls).expect("playlist"))
    }

    fn sink() -> SinkDescriptor {
        SinkDescriptor::new("sink.example", 2935, "s1")
    }

    fn options() -> RelayLoopOptions {
        RelayLoopOptions {
            pause: Duration::from_millis(1),
            limits: JobLimits {
                default_duration: Duration::from_secs(600),
                safety_margin: Duration::from_secs(90),
            },
            reset_stats_on_start: false,
        }
    }

    struct InstantAcquirer;

    #[async_trait]
    impl AcquisitionStrategy for InstantAcquirer {
        fn name(&self) -> &'static str {
            "instant"
        }

        async fn acquire(&self, item: &PlaylistItem) -> Result<AcquiredContent, AcquireError> {
            Ok(AcquiredContent {
                source: ContentSource::Remote(item.url.clone()),
                strategy: "instant",
                title: None,
                duration_secs: Some(1),
            })
        }
    }

    struct RefusingAcquirer;

    #[async_trait]
    impl AcquisitionStrategy for RefusingAcquirer {
        fn name(&self) -> &'static str {
            "refusing"
        }

        async fn acquire(&self, _item: &PlaylistItem) -> Result<AcquiredContent, AcquireError> {
            Err(AcquireError::MissingDownloadUrl)
        }
    }

    struct CountingTransport {
        deliveries: Arc<AtomicUsize>,
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
            _limit: Duration,
        ) -> Result<(), DeliverError> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }
    }

    /// Streams until cancelled, like a live encoder
    struct BlockingTransport {
        started: Arc<AtomicUsize>,
    }

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
            self.started.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn relay_with(
        n: usize,
        acquirer: Arc<dyn AcquisitionStrategy>,
        transport: Arc<dyn TransportStrategy>,
    ) -> Arc<RelayLoop> {
        Arc::new(RelayLoop::new(
            playlist(n),
            sink(),
            vec![acquirer],
            vec![transport],
            options(),
        ))
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn cycles_the_playlist_and_wraps_around() {
        let deliveries = Arc::new(AtomicUsize::new(0));
        let relay = relay_with(
            3,
            Arc::new(InstantAcquirer),
            Arc::new(CountingTransport {
                deliveries: deliveries.clone(),
            }),
        );

        assert_eq!(relay.start(), StartReply::Started);
        wait_until(|| relay.status().items_completed >= 4).await;
        relay.stop();
        wait_until(|| !relay.is_running()).await;

        // The job that was in flight at stop time still settles its
        // bookkeeping; once it has, the position matches the jobs run.
        wait_until(|| {
            let status = relay.status();
            status.current_index == status.items_completed as usize % 3
        })
        .await;

        let status = relay.status();
        assert!(status.items_completed >= 4, "must wrap past the last item");
        assert_eq!(status.errors, 0);
        assert!(deliveries.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn second_start_reports_already_running() {
        let relay = relay_with(
            2,
            Arc::new(InstantAcquirer),
            Arc::new(BlockingTransport {
                started: Arc::new(AtomicUsize::new(0)),
            }),
        );

        assert_eq!(relay.start(), StartReply::Started);
        assert_eq!(relay.start(), StartReply::AlreadyRunning);
        relay.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_interrupts_the_delivery() {
        let started = Arc::new(AtomicUsize::new(0));
        let relay = relay_with(
            2,
            Arc::new(InstantAcquirer),
            Arc::new(BlockingTransport {
                started: started.clone(),
            }),
        );

        relay.start();
        wait_until(|| started.load(Ordering::SeqCst) >= 1).await;

        assert!(relay.stop());
        assert!(!relay.stop(), "second stop is a no-op");
        wait_until(|| !relay.is_running()).await;
    }

    #[tokio::test]
    async fn counters_persist_across_stop_and_start() {
        let deliveries = Arc::new(AtomicUsize::new(0));
        let relay = relay_with(
            2,
            Arc::new(InstantAcquirer),
            Arc::new(CountingTransport {
                deliveries: deliveries.clone(),
            }),
        );

        relay.start();
        wait_until(|| relay.status().items_completed >= 2).await;
        relay.stop();
        wait_until(|| !relay.is_running()).await;
        let completed_before = relay.status().items_completed;

        relay.start();
        wait_until(|| relay.status().items_completed > completed_before).await;
        relay.stop();
        wait_until(|| !relay.is_running()).await;

        assert!(relay.status().items_completed > completed_before);
    }

    #[tokio::test]
    async fn failing_items_count_as_errors_and_do_not_stall_the_loop() {
        let deliveries = Arc::new(AtomicUsize::new(0));
        let relay = Arc::new(RelayLoop::new(
            playlist(2),
            sink(),
            vec![Arc::new(RefusingAcquirer)],
            vec![Arc::new(CountingTransport {
                deliveries: deliveries.clone(),
            })],
            options(),
        ));

        relay.start();
        wait_until(|| relay.status().errors >= 3).await;
        relay.stop();
        wait_until(|| !relay.is_running()).await;

        let status = relay.status();
        assert!(status.errors >= 3, "loop must keep cycling past failures");
        assert_eq!(deliveries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_interrupts_the_current_delivery_and_advances_once() {
        let started = Arc::new(AtomicUsize::new(0));
        let relay = relay_with(
            3,
            Arc::new(InstantAcquirer),
            Arc::new(BlockingTransport {
                started: started.clone(),
            }),
        );

        relay.start();
        wait_until(|| started.load(Ordering::SeqCst) >= 1).await;

        let index = relay.skip();
        assert_eq!(index, 1);

        // The cancelled job must not advance the index a second time
        wait_until(|| started.load(Ordering::SeqCst) >= 2).await;
        assert_eq!(relay.status().current_index, 1);

        relay.stop();
        wait_until(|| !relay.is_running()).await;
    }

    #[tokio::test]
    async fn skip_while_stopped_repositions_the_index() {
        let relay = relay_with(
            3,
            Arc::new(InstantAcquirer),
            Arc::new(CountingTransport {
                deliveries: Arc::new(AtomicUsize::new(0)),
            }),
        );

        assert_eq!(relay.skip(), 1);
        assert_eq!(relay.skip(), 2);
        assert_eq!(relay.skip(), 0);
        assert!(!relay.is_running());
    }
}

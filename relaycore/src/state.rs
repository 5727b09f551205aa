//! Guarded shared relay state
//!
//! `RelayState` is the only resource shared between the relay loop and the
//! control surface. Every read-modify-write goes through one mutex and an
//! intent-revealing operation; raw fields are never exposed. The lock is
//! never held across an await.
//!
//! Two invariants hold at every unlock:
//! - `running == false` implies no registered active job handle;
//! - `current_index` is always a valid playlist index.
//!
//! The loop's own end-of-item advance and an external `skip` race by
//! design. Resolution is deterministic: `skip` bumps an epoch counter, and
//! the loop's advance is suppressed when the epoch moved while its job was
//! in flight, so a skip is never lost and never double-advances.

use crate::job::RelayOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

/// Read-only view of the relay state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StateSnapshot {
    pub running: bool,
    pub current_index: usize,
    pub items_completed: u64,
    pub errors: u64,
    /// Start time of the current (or last) run
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since start, only while running
    pub uptime_secs: Option<u64>,
}

/// Handle to the job currently in flight
struct ActiveJob {
    id: u64,
    cancel: CancellationToken,
}

struct Inner {
    running: bool,
    current_index: usize,
    /// Bumped by every external skip; detects advances raced by a skip
    epoch: u64,
    active: Option<ActiveJob>,
    /// Cancels the loop's own waits (inter-item pause), one per run
    run_token: Option<CancellationToken>,
    items_completed: u64,
    errors: u64,
    started_at: Option<DateTime<Utc>>,
    started_instant: Option<Instant>,
    next_job_id: u64,
}

/// Everything one relay job needs from the shared state, taken under the lock
pub struct JobTicket {
    pub index: usize,
    pub epoch: u64,
    pub job_id: u64,
    pub cancel: CancellationToken,
}

/// Single-writer shared state of the relay
pub struct RelayState {
    playlist_len: usize,
    inner: Mutex<Inner>,
}

impl RelayState {
    /// Creates the state for a playlist of `playlist_len` items
    ///
    /// # Panics
    ///
    /// Panics on a zero-length playlist; [`crate::playlist::Playlist`]
    /// rejects those at construction.
    pub fn new(playlist_len: usize) -> Self {
        assert!(playlist_len >= 1, "playlist cannot be empty");
        Self {
            playlist_len,
            inner: Mutex::new(Inner {
                running: false,
                current_index: 0,
                epoch: 0,
                active: None,
                run_token: None,
                items_completed: 0,
                errors: 0,
                started_at: None,
                started_instant: None,
                next_job_id: 1,
            }),
        }
    }

    pub fn playlist_len(&self) -> usize {
        self.playlist_len
    }

    /// Marks the relay as running and returns the fresh run token
    ///
    /// Returns `None` when a loop is already running; counters are left
    /// untouched in that case. With `reset_stats`, a successful start zeroes
    /// the cumulative counters.
    pub fn try_start(&self, reset_stats: bool) -> Option<CancellationToken> {
        let mut inner = self.inner.lock().unwrap();
        if inner.running {
            return None;
        }

        if reset_stats {
            inner.items_completed = 0;
            inner.errors = 0;
        }

        let token = CancellationToken::new();
        inner.running = true;
        inner.run_token = Some(token.clone());
        inner.started_at = Some(Utc::now());
        inner.started_instant = Some(Instant::now());
        Some(token)
    }

    /// Registers the stop intent; returns whether a run was active
    ///
    /// Cancels the run token and any active job handle before returning, so
    /// a caller that sees `true` knows the in-flight work has been signalled
    /// even if it has not yet observed the cancellation.
    pub fn request_stop(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            return false;
        }

        inner.running = false;
        if let Some(token) = inner.run_token.take() {
            token.cancel();
        }
        if let Some(active) = inner.active.take() {
            active.cancel.cancel();
        }
        inner.started_instant = None;
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    /// Opens the next job, registering its cancellation handle as active
    ///
    /// Returns `None` once the relay is no longer running, which is the
    /// loop's signal to exit.
    pub fn begin_job(&self) -> Option<JobTicket> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            return None;
        }

        let job_id = inner.next_job_id;
        inner.next_job_id += 1;

        let cancel = CancellationToken::new();
        inner.active = Some(ActiveJob {
            id: job_id,
            cancel: cancel.clone(),
        });

        Some(JobTicket {
            index: inner.current_index,
            epoch: inner.epoch,
            job_id,
            cancel,
        })
    }

    /// Closes a job: clears its handle and feeds the outcome into counters
    ///
    /// Delivered and cancelled jobs count as completed items; exhausted
    /// chains count as errors. The handle is cleared only if it still
    /// belongs to this job (stop may already have taken it).
    pub fn finish_job(&self, job_id: u64, outcome: &RelayOutcome) {
        let mut inner = self.inner.lock().unwrap();

        if inner.active.as_ref().is_some_and(|a| a.id == job_id) {
            inner.active = None;
        }

        match outcome {
            RelayOutcome::Delivered { .. } | RelayOutcome::Cancelled => {
                inner.items_completed += 1;
            }
            RelayOutcome::AcquisitionFailed(_) | RelayOutcome::TransportFailed(_) => {
                inner.errors += 1;
            }
        }
    }

    /// End-of-item advance, suppressed when a skip moved the index already
    ///
    /// Returns whether the advance was applied.
    pub fn advance_if_unchanged(&self, epoch: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.epoch != epoch {
            return false;
        }
        inner.current_index = (inner.current_index + 1) % self.playlist_len;
        true
    }

    /// Cancels the active delivery (if any) and advances the index
    ///
    /// Valid in any run state: while stopped only the index moves. Returns
    /// the new index.
    pub fn skip(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();

        if let Some(active) = &inner.active {
            active.cancel.cancel();
        }

        inner.epoch += 1;
        inner.current_index = (inner.current_index + 1) % self.playlist_len;
        inner.current_index
    }

    /// Consistent read-only snapshot, never blocks on the relay's work
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock().unwrap();
        StateSnapshot {
            running: inner.running,
            current_index: inner.current_index,
            items_completed: inner.items_completed,
            errors: inner.errors,
            started_at: inner.started_at,
            uptime_secs: inner.started_instant.map(|t| t.elapsed().as_secs()),
        }
    }

    /// True when no active job handle is registered (test support)
    #[cfg(test)]
    fn active_handle_is_clear(&self) -> bool {
        self.inner.lock().unwrap().active.is_none()
    }
}

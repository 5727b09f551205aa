//! Core of the playlist relay
//!
//! The relay cycles a fixed playlist of remote media into a single SRT sink,
//! one item at a time, forever. Each item goes through two ordered fallback
//! chains: acquisition strategies turn a playlist URL into playable content,
//! transport strategies push that content to the sink through an external
//! encoder. A small REST surface starts, stops and skips the loop and
//! reports its counters.
//!
//! Layering, bottom up:
//! - [`playlist`] and [`sink`] describe the fixed inputs;
//! - [`acquire`] and [`transport`] hold the strategy traits and chains;
//! - [`job`] drives one item end to end;
//! - [`state`] and [`runloop`] own the shared state and the loop;
//! - [`api`] and [`openapi`] expose the control surface.

pub mod acquire;
pub mod api;
pub mod error;
pub mod job;
pub mod openapi;
pub mod playlist;
pub mod runloop;
pub mod sink;
pub mod state;
pub mod transport;

pub use error::{
    AcquireError, AcquisitionError, DeliverError, EmptyPlaylist, TransportError,
};
pub use job::{JobLimits, RelayJob, RelayOutcome};
pub use playlist::{Playlist, PlaylistItem};
pub use runloop::{RelayLoop, RelayLoopOptions, StartReply};
pub use sink::SinkDescriptor;
pub use state::{RelayState, StateSnapshot};

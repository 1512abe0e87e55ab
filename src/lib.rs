#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # rewind
//!
//! rewind records messages flowing over a publish/subscribe fabric into a
//! log file, and plays such logs back onto the live fabric with the same
//! inter-arrival timing they had at capture time, so downstream subscribers
//! observe a faithful replay.
//!
//! ## Features
//!
//! - **Faithful cadence**: playback reconstructs original message spacing on
//!   a monotonic clock; wall-clock adjustments never skew a replay
//! - **Topic selection**: pick topics by exact name or whole-name regular
//!   expression, or subtract from "everything in the log"
//! - **Cooperative sessions**: each replay runs on its own worker thread
//!   with prompt, idempotent stop and blocking wait
//! - **Pluggable edges**: storage and transport are traits; SQLite-backed
//!   logs and an in-process loopback fabric ship in the box
//! - **C ABI**: the flat `verbosity` / `record_topics` / `playback_topics`
//!   surface is exported for embedding from other languages
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rewind::Playback;
//!
//! fn main() -> rewind::Result<()> {
//!     let playback = Playback::open("tour.log");
//!     let session = playback.start(Duration::ZERO)?;
//!     session.wait_until_finished();
//!     Ok(())
//! }
//! ```
//!
//! Restricting what plays:
//!
//! ```rust,no_run
//! # use std::time::Duration;
//! use regex::Regex;
//! use rewind::Playback;
//!
//! # fn main() -> rewind::Result<()> {
//! let mut playback = Playback::open("tour.log");
//! let matched = playback.add_topics_matching(&Regex::new("/sensors/.*")?);
//! playback.remove_topic("/sensors/noisy");
//! println!("replaying {matched} topics");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`playback`]: session factory, topic selection, publisher registry and
//!   the timed-release scheduler
//! - [`record`]: the companion capture pipeline
//! - [`store`]: the log storage contract and the SQLite backend
//! - [`fabric`]: the messaging transport contract and the in-process
//!   loopback bus
//! - [`diagnostics`]: process-wide verbosity control
//! - [`ffi`]: the C-compatible flat command surface
//! - [`error`]: error types and `Result` alias

pub mod diagnostics;
pub mod error;
pub mod fabric;
pub mod ffi;
pub mod playback;
pub mod record;
pub mod store;

pub use error::{CommandCode, Result, RewindError};
pub use fabric::{InProcTransport, Node, NodeConfig, RawPublisher, Transport};
pub use playback::{Playback, PlaybackHandle};
pub use record::Recorder;
pub use store::{Batch, Descriptor, Message, SqliteStore, Store};

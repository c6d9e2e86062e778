//! FIP "now playing" tracker for PMOMusic
//!
//! This crate follows the track currently playing on one FIP channel
//! (FIP, FIP Rock, FIP Jazz, ...) by polling the FIP GraphQL "Now" endpoint
//! and notifies observers each time the track changes.
//!
//! # Features
//!
//! - **Server-driven polling**: the next poll is scheduled from the
//!   `next_refresh` hint of the previous answer, with a fixed fallback
//!   interval when there is none
//! - **Stale data rejection**: answers past their own refresh horizon are
//!   discarded, and every request carries a cache-busting token
//! - **Change detection**: observers are only called when artist or title
//!   actually change
//! - **Safe channel switching**: results of requests started for a previous
//!   channel never reach observers
//!
//! # Example
//!
//! ```no_run
//! use pmofip::{ChannelTracker, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TrackerConfig::load("config.yaml")?;
//!     let tracker = ChannelTracker::with_http(&config)?;
//!
//!     tracker.subscribe(|track| {
//!         if let Some(track) = track {
//!             println!("{}", track.display());
//!         }
//!     });
//!     tracker.set_active_channel("fip")?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Components
//!
//! - [`ResponseParser`]: payload → [`PollOutcome`] (staleness, extraction)
//! - [`ChangeDetector`]: outcome + last delivered track → [`Notification`]
//! - [`PollScheduler`]: the single pending timer and next-delay rules
//! - [`ChannelTracker`]: the poll loop, observers and channel switches

pub mod channels;
pub mod config;
pub mod detector;
pub mod error;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod tracker;
pub mod transport;

// Re-exports
pub use channels::{ChannelDescriptor, ChannelId, StationTable, ALL_CHANNELS};
pub use config::TrackerConfig;
pub use detector::{ChangeDetector, FailurePolicy, Notification};
pub use error::{Error, Result};
pub use models::{NowPayload, PollOutcome, TrackInfo};
pub use parser::{ExtractionStrategy, ResponseParser};
pub use scheduler::{compute_next_delay, PollScheduler};
pub use tracker::{ChannelTracker, Observer, SubscriptionId, TrackerPhase, TrackerStatus};
pub use transport::{HttpTransport, Transport, TransportBuilder};

//! Tracking of the track playing on the active FIP channel
//!
//! [`ChannelTracker`] ties the pieces together. One poll cycle is
//!
//! ```text
//! fetch → parse → (generation check) → decide → remember → re-arm → notify
//! ```
//!
//! and every cycle ends with exactly one armed timer, whatever happened,
//! unless the active channel changed while it was waiting on the network.
//!
//! # Generations
//!
//! Each channel switch (and [`ChannelTracker::stop`]) bumps a generation
//! counter. A cycle remembers the generation it was started for and checks
//! it again, under the state lock, once its request returns. If the counter
//! moved, the result is dropped on the floor: `last_delivered` is untouched,
//! observers hear nothing and no timer is armed, the newer cycle owns all of
//! that. Comparing generations rather than channel ids also covers a switch
//! A → B → A racing a slow request.
//!
//! # Example
//!
//! ```no_run
//! use pmofip::{ChannelTracker, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = ChannelTracker::with_http(&TrackerConfig::default())?;
//!
//!     tracker.subscribe(|track| match track {
//!         Some(track) => println!("Now playing: {}", track.display()),
//!         None => println!("Nothing playing"),
//!     });
//!
//!     tracker.set_active_channel("fip_jazz")?;
//!     tokio::signal::ctrl_c().await?;
//!     tracker.stop();
//!     Ok(())
//! }
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::channels::{ChannelId, StationTable};
use crate::config::TrackerConfig;
use crate::detector::{ChangeDetector, Notification};
use crate::error::{Error, Result};
use crate::models::{PollOutcome, TrackInfo};
use crate::parser::ResponseParser;
use crate::scheduler::PollScheduler;
use crate::transport::{build_now_url, HttpTransport, Transport, NO_CACHE_HEADERS};

/// Callback invoked with the new track, or `None` when nothing is playing
pub type Observer = Arc<dyn Fn(Option<&TrackInfo>) + Send + Sync>;

/// Handle returned by [`ChannelTracker::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Where the tracker stands in its poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    /// No active channel
    Idle,
    /// A poll cycle is running (or about to)
    Polling,
    /// Waiting for the next timer
    Scheduled,
}

/// Point-in-time view of the tracker
#[derive(Debug, Clone)]
pub struct TrackerStatus {
    pub active_channel: Option<ChannelId>,
    pub generation: u64,
    pub phase: TrackerPhase,
    pub last_delivered: Option<TrackInfo>,
    /// Generation of the armed timer, if one is waiting
    pub armed_generation: Option<u64>,
    /// Timers armed since the tracker was created
    pub timers_armed: u64,
    pub observers: usize,
}

/// Polls the active channel and notifies observers of track changes
///
/// Cloning is cheap and every clone drives the same tracker. The pending
/// timer is cancelled when the last clone is dropped.
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct ChannelTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    transport: Arc<dyn Transport>,
    parser: ResponseParser,
    detector: ChangeDetector,
    stations: StationTable,
    endpoint: String,
    persisted_query_hash: String,
    switch_clear_delay: Option<Duration>,
    state: Mutex<TrackerState>,
    /// Sequence number of the last notification handed to observers
    published: Mutex<u64>,
}

struct TrackerState {
    active_channel: Option<ChannelId>,
    last_delivered: Option<TrackInfo>,
    generation: u64,
    /// Last generation for which a cycle ran to completion
    settled_generation: u64,
    /// A cycle for the current generation is spawned or running
    polling: bool,
    /// Sequence number of the last notification decided
    notify_seq: u64,
    scheduler: PollScheduler,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl ChannelTracker {
    /// Create a tracker fetching through `transport`
    pub fn new(transport: Arc<dyn Transport>, config: &TrackerConfig) -> Self {
        let state = TrackerState {
            active_channel: None,
            last_delivered: None,
            generation: 0,
            settled_generation: 0,
            polling: false,
            notify_seq: 0,
            scheduler: PollScheduler::new(config.fallback_interval(), config.min_refresh()),
            observers: Vec::new(),
            next_subscription: 0,
        };

        Self {
            inner: Arc::new(TrackerInner {
                transport,
                parser: ResponseParser::new(config.extraction_strategy()),
                detector: ChangeDetector::new(config.on_fetch_failure),
                stations: config.station_table(),
                endpoint: config.endpoint.clone(),
                persisted_query_hash: config.persisted_query_hash.clone(),
                switch_clear_delay: config.switch_clear_delay(),
                state: Mutex::new(state),
                published: Mutex::new(0),
            }),
        }
    }

    /// Create a tracker using the `reqwest` transport
    pub fn with_http(config: &TrackerConfig) -> Result<Self> {
        let transport = HttpTransport::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Start tracking `channel`
    ///
    /// Setting the channel already being tracked does nothing. Otherwise the
    /// pending timer is cancelled and a poll starts immediately; any request
    /// still in flight for the previous channel is ignored when it returns.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownChannel`] if the channel has no station id.
    pub fn set_active_channel(&self, channel: impl Into<ChannelId>) -> Result<()> {
        let channel = channel.into();
        if self.inner.stations.station_id(&channel).is_none() {
            return Err(Error::UnknownChannel(channel.to_string()));
        }

        let generation = {
            let mut state = self.inner.state();
            if state.active_channel.as_ref() == Some(&channel) {
                debug!(channel = %channel, "Channel already active");
                return Ok(());
            }
            state.generation += 1;
            state.scheduler.cancel();
            state.active_channel = Some(channel.clone());
            state.polling = true;
            state.generation
        };

        info!(channel = %channel, generation, "Active channel changed");
        self.inner.spawn_cycle(generation);
        self.inner.spawn_switch_clear(generation);
        Ok(())
    }

    /// Channel currently tracked
    pub fn active_channel(&self) -> Option<ChannelId> {
        self.inner.state().active_channel.clone()
    }

    /// Last track broadcast to observers
    pub fn last_delivered(&self) -> Option<TrackInfo> {
        self.inner.state().last_delivered.clone()
    }

    /// Register an observer, called in subscription order
    ///
    /// Observers run synchronously on the polling task and may subscribe,
    /// unsubscribe or switch channel from inside the callback.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(Option<&TrackInfo>) + Send + Sync + 'static,
    {
        let mut state = self.inner.state();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        let observer: Observer = Arc::new(observer);
        state.observers.push((id, observer));
        id
    }

    /// Remove an observer; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state();
        let before = state.observers.len();
        state.observers.retain(|(sub, _)| *sub != id);
        state.observers.len() != before
    }

    /// Poll right away instead of waiting for the timer
    ///
    /// Returns false when there is no active channel or a poll is already
    /// running.
    pub fn poll_now(&self) -> bool {
        let generation = {
            let mut state = self.inner.state();
            if state.active_channel.is_none() || state.polling {
                return false;
            }
            state.scheduler.cancel();
            state.polling = true;
            state.generation
        };
        self.inner.spawn_cycle(generation);
        true
    }

    /// Stop polling; in-flight requests are ignored when they return
    pub fn stop(&self) {
        let mut state = self.inner.state();
        state.generation += 1;
        state.scheduler.cancel();
        state.polling = false;
        if let Some(channel) = state.active_channel.take() {
            info!(channel = %channel, "Tracker stopped");
        }
    }

    pub fn status(&self) -> TrackerStatus {
        let state = self.inner.state();
        let phase = match (&state.active_channel, state.polling) {
            (None, _) => TrackerPhase::Idle,
            (Some(_), true) => TrackerPhase::Polling,
            (Some(_), false) if state.scheduler.is_armed() => TrackerPhase::Scheduled,
            (Some(_), false) => TrackerPhase::Polling,
        };

        TrackerStatus {
            active_channel: state.active_channel.clone(),
            generation: state.generation,
            phase,
            last_delivered: state.last_delivered.clone(),
            armed_generation: state.scheduler.armed_generation(),
            timers_armed: state.scheduler.armed_total(),
            observers: state.observers.len(),
        }
    }
}

impl std::fmt::Debug for ChannelTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("ChannelTracker")
            .field("active_channel", &status.active_channel)
            .field("generation", &status.generation)
            .field("phase", &status.phase)
            .field("observers", &status.observers)
            .finish()
    }
}

impl TrackerInner {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a cycle; the caller must have set `polling` under the lock
    fn spawn_cycle(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.run_cycle(generation).await });
    }

    /// Timer callback: start a cycle unless the timer was superseded
    fn fire_timer(self: &Arc<Self>, generation: u64, serial: u64) {
        {
            let mut state = self.state();
            if state.generation != generation
                || state.polling
                || !state.scheduler.claim_fired(serial)
            {
                debug!(generation, serial, "Timer superseded, not polling");
                return;
            }
            state.polling = true;
        }
        self.spawn_cycle(generation);
    }

    async fn run_cycle(self: Arc<Self>, generation: u64) {
        let channel = {
            let state = self.state();
            if state.generation != generation {
                debug!(generation, "Poll superseded before start");
                return;
            }
            let Some(channel) = state.active_channel.clone() else {
                return;
            };
            channel
        };

        let outcome = self.poll_once(&channel).await;

        let (notification, seq, observers) = {
            let mut state = self.state();

            // Reentrancy guard: the channel changed while we were waiting
            if state.generation != generation {
                info!(
                    channel = %channel,
                    generation,
                    current = state.generation,
                    "Channel switched during poll, discarding result"
                );
                return;
            }

            let notification = self
                .detector
                .decide(&outcome, state.last_delivered.as_ref());
            match &notification {
                Notification::NewTrack(track) => state.last_delivered = Some(track.clone()),
                Notification::Clear => state.last_delivered = None,
                Notification::NoChange => {}
            }

            state.polling = false;
            state.settled_generation = generation;

            let delay = state.scheduler.next_delay(&outcome);
            let weak = Arc::downgrade(&self);
            state.scheduler.arm(delay, generation, move |serial| {
                if let Some(inner) = weak.upgrade() {
                    inner.fire_timer(generation, serial);
                }
            });

            let observers = match notification {
                Notification::NoChange => Vec::new(),
                _ => state.observers.clone(),
            };
            state.notify_seq += 1;
            (notification, state.notify_seq, observers)
        };

        debug!(
            channel = %channel,
            generation,
            outcome = outcome.kind(),
            "Poll cycle complete"
        );

        match notification {
            Notification::NewTrack(track) => {
                info!(channel = %channel, "Now playing: {}", track.display());
                self.publish(seq, &observers, Some(&track));
            }
            Notification::Clear => {
                info!(channel = %channel, "Nothing playing, clearing");
                self.publish(seq, &observers, None);
            }
            Notification::NoChange => {}
        }
    }

    /// Fetch and interpret one "Now" response; never fails
    async fn poll_once(&self, channel: &ChannelId) -> PollOutcome {
        let Some(station_id) = self.stations.station_id(channel) else {
            return PollOutcome::FetchFailed(Error::UnknownChannel(channel.to_string()).to_string());
        };

        let url = match build_now_url(&self.endpoint, &self.persisted_query_hash, station_id) {
            Ok(url) => url,
            Err(e) => {
                warn!(channel = %channel, "Cannot build FIP URL: {}", e);
                return PollOutcome::FetchFailed(e.to_string());
            }
        };

        debug!(channel = %channel, station_id, "Fetching currently playing");

        match self.transport.fetch(&url, &NO_CACHE_HEADERS).await {
            Ok(body) => self.parser.parse_bytes(&body, Utc::now().timestamp()),
            Err(e) => {
                warn!(channel = %channel, "Failed to fetch FIP now playing: {}", e);
                PollOutcome::FetchFailed(e.to_string())
            }
        }
    }

    /// Clear the display if the first poll after a switch is slow
    fn spawn_switch_clear(self: &Arc<Self>, generation: u64) {
        let Some(delay) = self.switch_clear_delay else {
            return;
        };
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let (seq, observers) = {
                let mut state = inner.state();
                if state.generation != generation
                    || state.settled_generation == generation
                    || state.last_delivered.is_none()
                {
                    return;
                }
                state.last_delivered = None;
                state.notify_seq += 1;
                (state.notify_seq, state.observers.clone())
            };

            info!(generation, "Channel switch still pending after {:?}, clearing", delay);
            inner.publish(seq, &observers, None);
        });
    }

    /// Deliver notification `seq` unless a later one was already delivered
    ///
    /// Notifications are numbered under the state lock but delivered after
    /// it is released, so two tasks may reach this point out of order.
    fn publish(&self, seq: u64, observers: &[(SubscriptionId, Observer)], track: Option<&TrackInfo>) {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        if seq < *published {
            debug!(seq, latest = *published, "Dropping out-of-order notification");
            return;
        }
        *published = seq;
        deliver(observers, track);
    }
}

/// Call each observer in order; a panicking observer does not stop the others
fn deliver(observers: &[(SubscriptionId, Observer)], track: Option<&TrackInfo>) {
    for (id, observer) in observers {
        if catch_unwind(AssertUnwindSafe(|| observer(track))).is_err() {
            error!(subscription = id.0, "Observer panicked during notification");
        }
    }
}

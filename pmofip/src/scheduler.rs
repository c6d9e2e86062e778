//! Poll timer ownership and next-delay computation.
//!
//! [`PollScheduler`] owns at most one pending timer. Arming always cancels
//! the previous timer first, so callers cannot end up with two polls racing
//! each other for the same tracker.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::models::PollOutcome;

// ============================================================================
// Timing Constants
// ============================================================================

/// Delay between polls when the server gives no usable hint (seconds)
pub const DEFAULT_FALLBACK_INTERVAL_SECS: u64 = 6;

/// Lower bound for a server-hinted delay (seconds)
pub const MIN_REFRESH_DELAY_SECS: u64 = 3;

/// Upper bound for a server-hinted delay (seconds)
///
/// Hints beyond this are treated as bogus and replaced by the fallback.
pub const MAX_REFRESH_DELAY_SECS: u64 = 3600;

/// How long a `nextTracks` entry may still be playing after its start (seconds)
pub const MAX_SONG_LENGTH_SECS: u64 = 10 * 60;

/// Grace period before the display is cleared after a channel switch (milliseconds)
pub const DEFAULT_SWITCH_CLEAR_DELAY_MS: u64 = 500;

/// Smallest fallback or floor a scheduler accepts (seconds)
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

// ============================================================================
// Delay Computation
// ============================================================================

/// Delay before the next poll
///
/// A track carrying both `server_time` and `next_refresh_at` is refreshed
/// when the server says fresher data will exist, never sooner than `floor`.
/// Everything else (and any nonsensical hint) uses `fallback`.
pub fn compute_next_delay(outcome: &PollOutcome, fallback: Duration, floor: Duration) -> Duration {
    let track = match outcome {
        PollOutcome::Track(track) => track,
        _ => return fallback,
    };

    let (server_time, next_refresh) = match (track.server_time, track.next_refresh_at) {
        (Some(server_time), Some(next_refresh)) => (server_time, next_refresh),
        _ => return fallback,
    };

    let hinted = next_refresh
        .checked_sub(server_time)
        .and_then(|secs| {
            let floor = i64::try_from(floor.as_secs()).unwrap_or(i64::MAX);
            u64::try_from(secs.max(floor)).ok()
        })
        .filter(|secs| *secs > 0 && *secs <= MAX_REFRESH_DELAY_SECS);

    match hinted {
        Some(secs) => Duration::from_secs(secs),
        None => {
            warn!(
                server_time,
                next_refresh, "Refresh hint has a bad value, using fallback interval"
            );
            fallback
        }
    }
}

// ============================================================================
// PollScheduler
// ============================================================================

struct PendingPoll {
    generation: u64,
    serial: u64,
    handle: JoinHandle<()>,
}

/// Owner of the single pending poll timer
pub struct PollScheduler {
    fallback: Duration,
    floor: Duration,
    pending: Option<PendingPoll>,
    armed_total: u64,
}

impl PollScheduler {
    /// Create a scheduler; `fallback` and `floor` are raised to
    /// [`MIN_POLL_INTERVAL_SECS`] if smaller
    pub fn new(fallback: Duration, floor: Duration) -> Self {
        let min = Duration::from_secs(MIN_POLL_INTERVAL_SECS);
        if fallback < min || floor < min {
            warn!(
                ?fallback,
                ?floor,
                "Poll intervals below {}s, clamping", MIN_POLL_INTERVAL_SECS
            );
        }
        Self {
            fallback: fallback.max(min),
            floor: floor.max(min),
            pending: None,
            armed_total: 0,
        }
    }

    pub fn fallback(&self) -> Duration {
        self.fallback
    }

    /// Delay before the poll following `outcome`
    pub fn next_delay(&self, outcome: &PollOutcome) -> Duration {
        compute_next_delay(outcome, self.fallback, self.floor)
    }

    /// Arm a timer calling `on_fire` after `delay`, replacing any pending one
    ///
    /// `on_fire` runs on the timer task once the delay elapsed and receives
    /// the timer serial to pass to [`PollScheduler::claim_fired`]. It should
    /// hand the actual poll to another task rather than run it inline.
    pub fn arm<F>(&mut self, delay: Duration, generation: u64, on_fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.armed_total += 1;
        let serial = self.armed_total;

        debug!(generation, serial, "Next poll scheduled in {:?}", delay);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            on_fire(serial);
        });

        self.pending = Some(PendingPoll {
            generation,
            serial,
            handle,
        });
    }

    /// Take ownership of a fired timer
    ///
    /// True only if `serial` is still the pending timer, i.e. it was neither
    /// cancelled nor replaced after its sleep completed.
    pub fn claim_fired(&mut self, serial: u64) -> bool {
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.serial == serial)
        {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Cancel the pending timer, if any
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }

    /// True while a timer is waiting to fire
    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }

    /// Generation the waiting timer belongs to
    pub fn armed_generation(&self) -> Option<u64> {
        self.pending
            .as_ref()
            .filter(|pending| !pending.handle.is_finished())
            .map(|pending| pending.generation)
    }

    /// Number of timers armed since creation
    pub fn armed_total(&self) -> u64 {
        self.armed_total
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("fallback", &self.fallback)
            .field("floor", &self.floor)
            .field("armed_generation", &self.armed_generation())
            .field("armed_total", &self.armed_total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const FALLBACK: Duration = Duration::from_secs(DEFAULT_FALLBACK_INTERVAL_SECS);
    const FLOOR: Duration = Duration::from_secs(MIN_REFRESH_DELAY_SECS);

    fn timed_track(server_time: Option<i64>, next_refresh: Option<i64>) -> PollOutcome {
        PollOutcome::Track(
            TrackInfo::new(Some("Daft Punk".into()), Some("One More Time".into()))
                .with_timing(server_time, next_refresh),
        )
    }

    fn delay(outcome: &PollOutcome) -> Duration {
        compute_next_delay(outcome, FALLBACK, FLOOR)
    }

    #[test]
    fn test_hinted_delay() {
        assert_eq!(delay(&timed_track(Some(1000), Some(1010))), Duration::from_secs(10));
    }

    #[test]
    fn test_hinted_delay_is_floored() {
        assert_eq!(delay(&timed_track(Some(1000), Some(1001))), Duration::from_secs(3));
        assert_eq!(delay(&timed_track(Some(1000), Some(900))), Duration::from_secs(3));
    }

    #[test]
    fn test_fallback_delay() {
        let six = Duration::from_secs(6);
        assert_eq!(delay(&timed_track(None, Some(1010))), six);
        assert_eq!(delay(&timed_track(Some(1000), None)), six);
        assert_eq!(delay(&PollOutcome::Empty), six);
        assert_eq!(delay(&PollOutcome::Stale), six);
        assert_eq!(delay(&PollOutcome::FetchFailed("timeout".into())), six);
    }

    #[test]
    fn test_bogus_hint_uses_fallback() {
        let six = Duration::from_secs(6);
        assert_eq!(delay(&timed_track(Some(i64::MIN), Some(i64::MAX))), six);
        assert_eq!(delay(&timed_track(Some(0), Some(1_000_000))), six);
    }

    #[test]
    fn test_constants_sanity() {
        assert!(MIN_REFRESH_DELAY_SECS < DEFAULT_FALLBACK_INTERVAL_SECS);
        assert!(DEFAULT_FALLBACK_INTERVAL_SECS < MAX_REFRESH_DELAY_SECS);
        assert_eq!(MAX_SONG_LENGTH_SECS, 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_replaces_pending_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new(FALLBACK, FLOOR);

        let first = fired.clone();
        scheduler.arm(Duration::from_secs(5), 1, move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = fired.clone();
        scheduler.arm(Duration::from_secs(10), 2, move |_| {
            second.fetch_add(10, Ordering::SeqCst);
        });

        assert!(scheduler.is_armed());
        assert_eq!(scheduler.armed_generation(), Some(2));
        assert_eq!(scheduler.armed_total(), 2);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new(FALLBACK, FLOOR);

        let counter = fired.clone();
        scheduler.arm(Duration::from_secs(1), 1, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.armed_generation(), None);
    }

    #[test]
    fn test_huge_floor_does_not_wrap() {
        let floor = Duration::from_secs(u64::MAX);
        let outcome = timed_track(Some(1000), Some(1010));
        assert_eq!(compute_next_delay(&outcome, FALLBACK, floor), FALLBACK);
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let scheduler = PollScheduler::new(Duration::ZERO, Duration::ZERO);
        let min = Duration::from_secs(MIN_POLL_INTERVAL_SECS);
        assert_eq!(scheduler.fallback(), min);
        assert_eq!(scheduler.next_delay(&PollOutcome::Empty), min);
        assert_eq!(scheduler.next_delay(&timed_track(Some(1000), Some(1000))), min);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_fired_accepts_only_pending_serial() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(FALLBACK, FLOOR);

        scheduler.arm(Duration::from_secs(1), 1, move |serial| {
            let _ = tx.send(serial);
        });
        let serial = rx.recv().await.unwrap();

        assert!(!scheduler.claim_fired(serial + 1));
        assert!(scheduler.claim_fired(serial));
        assert!(!scheduler.claim_fired(serial));
        assert_eq!(scheduler.armed_generation(), None);
    }
}

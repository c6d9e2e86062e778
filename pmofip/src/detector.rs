//! Change detection between consecutive polls

use serde::{Deserialize, Serialize};

use crate::models::{PollOutcome, TrackInfo};

/// What observers must be told after a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Nothing observable happened
    NoChange,
    /// Nothing is playing anymore
    Clear,
    /// A different track is playing
    NewTrack(TrackInfo),
}

/// What to do with the displayed track when the transport fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the last delivered track (no flicker on transient errors)
    #[default]
    Hold,
    /// Clear the display
    Clear,
}

/// Decides whether a poll outcome must be broadcast
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    on_failure: FailurePolicy,
}

impl ChangeDetector {
    pub fn new(on_failure: FailurePolicy) -> Self {
        Self { on_failure }
    }

    pub fn decide(&self, outcome: &PollOutcome, last_delivered: Option<&TrackInfo>) -> Notification {
        match outcome {
            PollOutcome::Track(track) => {
                if !track.is_valid() {
                    return Notification::NoChange;
                }
                match last_delivered {
                    Some(last) if last.same_track(track) => Notification::NoChange,
                    _ => Notification::NewTrack(track.clone()),
                }
            }
            PollOutcome::Empty | PollOutcome::Stale => Self::clear_if_shown(last_delivered),
            PollOutcome::FetchFailed(_) => match self.on_failure {
                FailurePolicy::Hold => Notification::NoChange,
                FailurePolicy::Clear => Self::clear_if_shown(last_delivered),
            },
        }
    }

    fn clear_if_shown(last_delivered: Option<&TrackInfo>) -> Notification {
        if last_delivered.is_some() {
            Notification::Clear
        } else {
            Notification::NoChange
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(artist: &str, title: &str) -> TrackInfo {
        TrackInfo::new(Some(artist.to_string()), Some(title.to_string()))
    }

    #[test]
    fn test_first_valid_track_is_new() {
        let t = track("Daft Punk", "One More Time");
        assert_eq!(
            ChangeDetector::default().decide(&PollOutcome::Track(t.clone()), None),
            Notification::NewTrack(t)
        );
    }

    #[test]
    fn test_equal_tracks_do_not_renotify() {
        let detector = ChangeDetector::default();
        let first = track("Daft Punk", "One More Time").with_timing(Some(1000), Some(1010));
        let second = track("Daft Punk", "One More Time").with_timing(Some(1010), Some(1020));

        let notification = detector.decide(&PollOutcome::Track(first.clone()), None);
        assert_eq!(notification, Notification::NewTrack(first.clone()));
        assert_eq!(
            detector.decide(&PollOutcome::Track(second), Some(&first)),
            Notification::NoChange
        );
    }

    #[test]
    fn test_artist_or_title_change_is_new() {
        let detector = ChangeDetector::default();
        let last = track("Daft Punk", "One More Time");

        let other_title = track("Daft Punk", "Aerodynamic");
        assert_eq!(
            detector.decide(&PollOutcome::Track(other_title.clone()), Some(&last)),
            Notification::NewTrack(other_title)
        );

        // Exact comparison, no case folding
        let other_case = track("daft punk", "One More Time");
        assert_eq!(
            detector.decide(&PollOutcome::Track(other_case.clone()), Some(&last)),
            Notification::NewTrack(other_case)
        );
    }

    #[test]
    fn test_invalid_track_is_ignored() {
        let last = track("Daft Punk", "One More Time");
        let half = TrackInfo::new(None, Some("Interlude".to_string()));
        assert_eq!(
            ChangeDetector::default().decide(&PollOutcome::Track(half), Some(&last)),
            Notification::NoChange
        );
    }

    #[test]
    fn test_empty_and_stale_clear_once() {
        let detector = ChangeDetector::default();
        let last = track("Daft Punk", "One More Time");

        assert_eq!(detector.decide(&PollOutcome::Empty, Some(&last)), Notification::Clear);
        assert_eq!(detector.decide(&PollOutcome::Stale, Some(&last)), Notification::Clear);
        assert_eq!(detector.decide(&PollOutcome::Empty, None), Notification::NoChange);
        assert_eq!(detector.decide(&PollOutcome::Stale, None), Notification::NoChange);
    }

    #[test]
    fn test_fetch_failure_policy() {
        let last = track("Daft Punk", "One More Time");
        let failed = PollOutcome::FetchFailed("connection reset".to_string());

        assert_eq!(
            ChangeDetector::new(FailurePolicy::Hold).decide(&failed, Some(&last)),
            Notification::NoChange
        );
        assert_eq!(
            ChangeDetector::new(FailurePolicy::Clear).decide(&failed, Some(&last)),
            Notification::Clear
        );
        assert_eq!(
            ChangeDetector::new(FailurePolicy::Clear).decide(&failed, None),
            Notification::NoChange
        );
    }
}

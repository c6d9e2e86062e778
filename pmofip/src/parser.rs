//! Interpretation of the FIP "Now" payload
//!
//! [`ResponseParser`] turns a decoded payload into a [`PollOutcome`]:
//!
//! 1. Staleness: a response is only trusted while `now < next_refresh`.
//!    Without a refresh hint it is always stale; showing nothing is
//!    preferred over showing the wrong song.
//! 2. Primary extraction from `now.song`.
//! 3. Fallback extraction from the first `nextTracks` entry when `now.song`
//!    is null, as long as that entry has started and could still be playing.

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{NowPayload, PollOutcome, TrackInfo};
use crate::scheduler::MAX_SONG_LENGTH_SECS;

/// How artist/title are looked up in a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStrategy {
    /// Use `nextTracks[0]` when `now.song` is null
    pub next_tracks_fallback: bool,
    /// How long after its start a `nextTracks` entry may still be playing
    pub max_song_length: Duration,
}

impl Default for ExtractionStrategy {
    fn default() -> Self {
        Self {
            next_tracks_fallback: true,
            max_song_length: Duration::from_secs(MAX_SONG_LENGTH_SECS),
        }
    }
}

/// Stateless payload interpreter
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser {
    strategy: ExtractionStrategy,
}

impl ResponseParser {
    pub fn new(strategy: ExtractionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &ExtractionStrategy {
        &self.strategy
    }

    /// Decode a raw body and interpret it; undecodable bodies are `Empty`
    pub fn parse_bytes(&self, body: &[u8], now: i64) -> PollOutcome {
        match NowPayload::from_slice(body) {
            Ok(payload) => self.parse(&payload, now),
            Err(e) => {
                debug!("Could not decode FIP response: {}", e);
                PollOutcome::Empty
            }
        }
    }

    /// Interpret a decoded payload at local time `now` (epoch seconds)
    pub fn parse(&self, payload: &NowPayload, now: i64) -> PollOutcome {
        if let Err(e) = Self::check_freshness(payload, now) {
            debug!("{}", e);
            return PollOutcome::Stale;
        }

        match self.extract(payload) {
            Ok(track) => PollOutcome::Track(track),
            Err(e) => {
                debug!("{}", e);
                PollOutcome::Empty
            }
        }
    }

    /// `Ok` iff the payload carries a refresh hint that lies in the future
    pub fn check_freshness(payload: &NowPayload, now: i64) -> Result<()> {
        match payload.next_refresh() {
            Some(next_refresh) if now < next_refresh => Ok(()),
            next_refresh => Err(Error::StaleResponse { next_refresh, now }),
        }
    }

    fn extract(&self, payload: &NowPayload) -> Result<TrackInfo> {
        let (artist, title) = match payload.song() {
            Some(song) => (song.artists_display(), song.title.clone()),
            None if self.strategy.next_tracks_fallback => {
                self.from_next_tracks(payload).unwrap_or((None, None))
            }
            None => (None, None),
        };

        let track = TrackInfo::new(artist, title)
            .with_timing(payload.server_time(), payload.next_refresh());

        if track.artist.is_none() && track.title.is_none() {
            return Err(Error::NoExtractableTrack);
        }
        Ok(track)
    }

    /// Artist/title of the first upcoming track, if it is already playing
    fn from_next_tracks(&self, payload: &NowPayload) -> Option<(Option<String>, Option<String>)> {
        let next = match payload.first_next_track() {
            Some(next) => next,
            None => {
                debug!("nextTracks empty");
                return None;
            }
        };

        let server_time = payload.server_time()?;
        let start_time = next.start_time?;

        if server_time < start_time {
            debug!(start_time, server_time, "Next track has not started yet");
            return None;
        }

        let max_len = i64::try_from(self.strategy.max_song_length.as_secs()).unwrap_or(i64::MAX);
        if server_time - start_time > max_len {
            debug!(start_time, server_time, "Next track too old to still be playing");
            return None;
        }

        debug!("Using nextTracks entry as current track");
        Some((next.title.clone(), next.subtitle.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn payload(value: Value) -> NowPayload {
        NowPayload::from_value(value).unwrap()
    }

    fn track(artist: &str, title: &str) -> (Option<String>, Option<String>) {
        (Some(artist.to_string()), Some(title.to_string()))
    }

    #[test]
    fn test_primary_extraction() {
        let p = payload(json!({
            "now": {
                "song": {"interpreters": ["Daft Punk"], "title": "One More Time"},
                "server_time": 1000,
                "next_refresh": 1010
            }
        }));

        match ResponseParser::default().parse(&p, 1000) {
            PollOutcome::Track(t) => {
                assert_eq!((t.artist, t.title), track("Daft Punk", "One More Time"));
                assert_eq!(t.server_time, Some(1000));
                assert_eq!(t.next_refresh_at, Some(1010));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_interpreters_are_joined_in_order() {
        let p = payload(json!({
            "now": {
                "song": {"interpreters": ["Serge Gainsbourg", "Jane Birkin"], "title": "Je t'aime"},
                "next_refresh": 50
            }
        }));

        match ResponseParser::default().parse(&p, 0) {
            PollOutcome::Track(t) => {
                assert_eq!(t.artist.as_deref(), Some("Serge Gainsbourg, Jane Birkin"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_refresh_hint_is_stale() {
        let p = payload(json!({
            "now": {
                "song": {"interpreters": ["Daft Punk"], "title": "One More Time"},
                "server_time": 1000
            }
        }));
        assert_eq!(ResponseParser::default().parse(&p, 0), PollOutcome::Stale);
    }

    #[test]
    fn test_past_refresh_hint_is_stale() {
        let p = payload(json!({
            "now": {
                "song": {"interpreters": ["Daft Punk"], "title": "One More Time"},
                "server_time": 1000,
                "next_refresh": 1010
            }
        }));
        let parser = ResponseParser::default();
        assert_eq!(parser.parse(&p, 1010), PollOutcome::Stale);
        assert_eq!(parser.parse(&p, 5000), PollOutcome::Stale);
        assert!(matches!(parser.parse(&p, 1009), PollOutcome::Track(_)));
    }

    #[test]
    fn test_fallback_to_next_tracks() {
        let p = payload(json!({
            "now": {"song": null, "server_time": 1000, "next_refresh": 1010},
            "nextTracks": [{"start_time": 990, "title": "Artist", "subtitle": "Song"}]
        }));

        match ResponseParser::default().parse(&p, 1000) {
            PollOutcome::Track(t) => {
                assert_eq!((t.artist, t.title), track("Artist", "Song"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_fallback_window_boundaries() {
        let parser = ResponseParser::default();
        let with_start = |start: i64| {
            payload(json!({
                "now": {"song": null, "server_time": 1000, "next_refresh": 1010},
                "nextTracks": [{"start_time": start, "title": "Artist", "subtitle": "Song"}]
            }))
        };

        // Exactly ten minutes ago is still accepted
        assert!(matches!(parser.parse(&with_start(400), 1000), PollOutcome::Track(_)));
        // Starts right now
        assert!(matches!(parser.parse(&with_start(1000), 1000), PollOutcome::Track(_)));
        // Too old
        assert_eq!(parser.parse(&with_start(399), 1000), PollOutcome::Empty);
        // Not started yet
        assert_eq!(parser.parse(&with_start(1001), 1000), PollOutcome::Empty);
    }

    #[test]
    fn test_fallback_needs_start_time() {
        let p = payload(json!({
            "now": {"song": null, "server_time": 1000, "next_refresh": 1010},
            "nextTracks": [{"title": "Artist", "subtitle": "Song"}]
        }));
        assert_eq!(ResponseParser::default().parse(&p, 1000), PollOutcome::Empty);
    }

    #[test]
    fn test_present_song_section_blocks_fallback() {
        let p = payload(json!({
            "now": {"song": {}, "server_time": 1000, "next_refresh": 1010},
            "nextTracks": [{"start_time": 990, "title": "Artist", "subtitle": "Song"}]
        }));
        assert_eq!(ResponseParser::default().parse(&p, 1000), PollOutcome::Empty);

        let p = payload(json!({
            "now": {
                "song": {"interpreters": [], "title": null},
                "server_time": 1000,
                "next_refresh": 1010
            },
            "nextTracks": [{"start_time": 990, "title": "Artist", "subtitle": "Song"}]
        }));
        assert_eq!(ResponseParser::default().parse(&p, 1000), PollOutcome::Empty);
    }

    #[test]
    fn test_disabled_fallback() {
        let parser = ResponseParser::new(ExtractionStrategy {
            next_tracks_fallback: false,
            ..Default::default()
        });
        let p = payload(json!({
            "now": {"song": null, "server_time": 1000, "next_refresh": 1010},
            "nextTracks": [{"start_time": 990, "title": "Artist", "subtitle": "Song"}]
        }));
        assert_eq!(parser.parse(&p, 1000), PollOutcome::Empty);
    }

    #[test]
    fn test_half_filled_track_is_invalid_not_empty() {
        let p = payload(json!({
            "now": {"song": {"title": "Instrumental"}, "next_refresh": 10}
        }));
        match ResponseParser::default().parse(&p, 0) {
            PollOutcome::Track(t) => {
                assert!(!t.is_valid());
                assert_eq!(t.artist, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_undecodable_body_is_empty() {
        let parser = ResponseParser::default();
        assert_eq!(parser.parse_bytes(b"not json", 0), PollOutcome::Empty);
        assert_eq!(parser.parse_bytes(br#"{"now": 12}"#, 0), PollOutcome::Empty);
    }
}

//! Data models for the FIP tracker
//!
//! Two families of types live here:
//!
//! - the tracker's own values ([`TrackInfo`], [`PollOutcome`]),
//! - the upstream "Now" GraphQL payload ([`NowPayload`] and friends),
//!   deserialized leniently since FIP frequently sends `null` sections.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Tracker Models
// ============================================================================

/// One playing track as reported by FIP
///
/// Empty strings are normalized to `None` on construction, so validity is
/// always derived from `artist`/`title` and never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Display artist (interpreters joined with ", ")
    pub artist: Option<String>,
    /// Track title
    pub title: Option<String>,
    /// Upstream "now" (epoch seconds)
    pub server_time: Option<i64>,
    /// Upstream hint for when fresher data is available (epoch seconds)
    pub next_refresh_at: Option<i64>,
}

impl TrackInfo {
    /// Create a track from optional artist and title
    pub fn new(artist: Option<String>, title: Option<String>) -> Self {
        Self {
            artist: non_empty(artist),
            title: non_empty(title),
            server_time: None,
            next_refresh_at: None,
        }
    }

    /// Attach the upstream timing fields
    pub fn with_timing(mut self, server_time: Option<i64>, next_refresh_at: Option<i64>) -> Self {
        self.server_time = server_time;
        self.next_refresh_at = next_refresh_at;
        self
    }

    /// True iff both artist and title are present and non-empty
    pub fn is_valid(&self) -> bool {
        self.artist.as_deref().is_some_and(|a| !a.is_empty())
            && self.title.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Exact artist/title equality, timing fields ignored
    pub fn same_track(&self, other: &TrackInfo) -> bool {
        self.artist == other.artist && self.title == other.title
    }

    /// "Artist - Title" for logs and displays
    pub fn display(&self) -> String {
        format!(
            "{} - {}",
            self.artist.as_deref().unwrap_or("?"),
            self.title.as_deref().unwrap_or("?")
        )
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Result of one poll attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A track was extracted (possibly half-filled, see [`TrackInfo::is_valid`])
    Track(TrackInfo),
    /// The response was older than its own refresh horizon
    Stale,
    /// No usable track in the response (or the body could not be decoded)
    Empty,
    /// The transport failed
    FetchFailed(String),
}

impl PollOutcome {
    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            PollOutcome::Track(_) => "track",
            PollOutcome::Stale => "stale",
            PollOutcome::Empty => "empty",
            PollOutcome::FetchFailed(_) => "fetch_failed",
        }
    }
}

// ============================================================================
// Upstream "Now" Payload
// ============================================================================

/// The part of the GraphQL answer the tracker reads
///
/// FIP answers `{"data": {"now": {...}, "nextTracks": [...]}}`; some
/// deployments flatten `server_time`/`next_refresh` next to `now`. Both are
/// accepted, the values nested in `now` taking precedence.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NowPayload {
    /// Current track section
    #[serde(default)]
    pub now: Option<NowSection>,
    /// Upcoming tracks, first one possibly already playing
    #[serde(default, rename = "nextTracks")]
    pub next_tracks: Option<Vec<NextTrack>>,
    /// Envelope-level server time
    #[serde(default)]
    pub server_time: Option<i64>,
    /// Envelope-level refresh hint
    #[serde(default)]
    pub next_refresh: Option<i64>,
}

impl NowPayload {
    /// Decode a raw response body
    ///
    /// Accepts both the GraphQL envelope (`{"data": {...}}`) and a bare
    /// payload.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decode an already parsed JSON document
    pub fn from_value(mut value: Value) -> crate::Result<Self> {
        if value.get("data").is_some_and(Value::is_object) {
            value = value["data"].take();
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Upstream server time
    pub fn server_time(&self) -> Option<i64> {
        self.now
            .as_ref()
            .and_then(|n| n.server_time)
            .or(self.server_time)
    }

    /// Upstream refresh hint, non-positive values treated as missing
    pub fn next_refresh(&self) -> Option<i64> {
        self.now
            .as_ref()
            .and_then(|n| n.next_refresh)
            .or(self.next_refresh)
            .filter(|t| *t > 0)
    }

    /// The `now.song` section, if present and not null
    pub fn song(&self) -> Option<&SongSection> {
        self.now.as_ref().and_then(|n| n.song.as_ref())
    }

    /// First upcoming track, if any
    pub fn first_next_track(&self) -> Option<&NextTrack> {
        self.next_tracks.as_ref().and_then(|t| t.first())
    }
}

/// The `now` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NowSection {
    /// Current song, `null` between tracks or during talk segments
    #[serde(default)]
    pub song: Option<SongSection>,
    /// Server "now" (epoch seconds)
    #[serde(default)]
    pub server_time: Option<i64>,
    /// When fresher data is expected (epoch seconds)
    #[serde(default)]
    pub next_refresh: Option<i64>,
}

/// The `now.song` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SongSection {
    /// Performing artists, entries may be `null`
    #[serde(default)]
    pub interpreters: Option<Vec<Option<String>>>,
    /// Song title
    #[serde(default)]
    pub title: Option<String>,
}

impl SongSection {
    /// Interpreters as a comma-separated string, `None` if there are none
    ///
    /// `null` and empty entries are skipped.
    pub fn artists_display(&self) -> Option<String> {
        let names: Vec<&str> = self
            .interpreters
            .iter()
            .flatten()
            .filter_map(|name| name.as_deref())
            .filter(|name| !name.is_empty())
            .collect();

        if names.is_empty() {
            None
        } else {
            Some(names.join(", "))
        }
    }
}

/// An entry of `nextTracks`
///
/// FIP puts the artist in `title` and the song in `subtitle` here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NextTrack {
    /// Scheduled start (epoch seconds)
    #[serde(default)]
    pub start_time: Option<i64>,
    /// Artist
    #[serde(default)]
    pub title: Option<String>,
    /// Song title
    #[serde(default)]
    pub subtitle: Option<String>,
}

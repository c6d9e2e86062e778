//! FIP channel definitions
//!
//! A [`ChannelId`] is the slug used by the rest of PMOMusic (`"fip"`,
//! `"fip_rock"`, ...). The GraphQL endpoint wants a numeric station id
//! instead; the table below maps one to the other.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a selectable FIP channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(slug: &str) -> Self {
        Self::new(slug)
    }
}

impl From<String> for ChannelId {
    fn from(slug: String) -> Self {
        Self(slug)
    }
}

impl FromStr for ChannelId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s.trim().to_ascii_lowercase()))
    }
}

/// Metadata descriptor for a channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelDescriptor {
    pub slug: &'static str,
    pub station_id: u32,
    pub display_name: &'static str,
}

impl ChannelDescriptor {
    pub const fn new(slug: &'static str, station_id: u32, display_name: &'static str) -> Self {
        Self {
            slug,
            station_id,
            display_name,
        }
    }
}

/// Known FIP channels and their GraphQL station ids
pub const ALL_CHANNELS: [ChannelDescriptor; 11] = [
    ChannelDescriptor::new("fip", 7, "FIP"),
    ChannelDescriptor::new("fip_rock", 64, "FIP Rock"),
    ChannelDescriptor::new("fip_jazz", 65, "FIP Jazz"),
    ChannelDescriptor::new("fip_groove", 66, "FIP Groove"),
    ChannelDescriptor::new("fip_monde", 69, "FIP Monde"),
    ChannelDescriptor::new("fip_nouveautes", 70, "FIP Nouveautés"),
    ChannelDescriptor::new("fip_reggae", 71, "FIP Reggae"),
    ChannelDescriptor::new("fip_electro", 74, "FIP Electro"),
    ChannelDescriptor::new("fip_metal", 77, "FIP Metal"),
    ChannelDescriptor::new("fip_pop", 78, "FIP Pop"),
    ChannelDescriptor::new("fip_hiphop", 95, "FIP Hip-Hop"),
];

/// Look up a built-in channel by slug
pub fn descriptor(channel: &ChannelId) -> Option<&'static ChannelDescriptor> {
    ALL_CHANNELS.iter().find(|d| d.slug == channel.as_str())
}

/// Channel → station id lookup, built-in table plus configured overrides
#[derive(Debug, Clone, Default)]
pub struct StationTable {
    overrides: HashMap<String, u32>,
}

impl StationTable {
    pub fn new(overrides: HashMap<String, u32>) -> Self {
        Self { overrides }
    }

    /// Upstream station id for `channel`, overrides first
    pub fn station_id(&self, channel: &ChannelId) -> Option<u32> {
        self.overrides
            .get(channel.as_str())
            .copied()
            .or_else(|| descriptor(channel).map(|d| d.station_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_station_ids() {
        let table = StationTable::default();
        assert_eq!(table.station_id(&"fip".into()), Some(7));
        assert_eq!(table.station_id(&"fip_jazz".into()), Some(65));
        assert_eq!(table.station_id(&"france_inter".into()), None);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert("fip".to_string(), 1234);
        overrides.insert("fip_test".to_string(), 99);
        let table = StationTable::new(overrides);

        assert_eq!(table.station_id(&"fip".into()), Some(1234));
        assert_eq!(table.station_id(&"fip_test".into()), Some(99));
        assert_eq!(table.station_id(&"fip_rock".into()), Some(64));
    }

    #[test]
    fn test_channel_id_from_str_normalizes() {
        let id: ChannelId = " FIP_Rock ".parse().unwrap();
        assert_eq!(id.as_str(), "fip_rock");
        assert_eq!(id.to_string(), "fip_rock");
    }
}

//! Configuration for the FIP tracker.
//!
//! The YAML block may live at the top level of a file or under
//! `sources.fip` in a PMOMusic `config.yaml`. Every field has a default so
//! an empty document is a valid configuration.
//!
//! ```yaml
//! sources:
//!   fip:
//!     fallback_interval_secs: 6
//!     on_fetch_failure: hold
//!     stations:
//!       fip_test: 1234
//! ```
//!
//! Environment variables prefixed with `PMOFIP__` override file values, one
//! `__` per nesting level: `PMOFIP__FALLBACK_INTERVAL_SECS=10`,
//! `PMOFIP__STATIONS__FIP_TEST=1234`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::channels::StationTable;
use crate::detector::FailurePolicy;
use crate::error::Result;
use crate::parser::ExtractionStrategy;
use crate::scheduler::{
    DEFAULT_FALLBACK_INTERVAL_SECS, DEFAULT_SWITCH_CLEAR_DELAY_MS, MAX_SONG_LENGTH_SECS,
    MIN_REFRESH_DELAY_SECS,
};
use crate::transport::{DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT};

/// FIP GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://www.fip.fr/latest/api/graphql";

/// Hash of the persisted "Now" query
pub const DEFAULT_PERSISTED_QUERY_HASH: &str =
    "8a931c7d177ff69709a79f4c213bd2403f0c11836c560bc22da55628d8100df8";

/// Prefix of the environment overrides
pub const ENV_PREFIX: &str = "PMOFIP__";

/// Tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "TrackerConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "TrackerConfig::default_hash")]
    pub persisted_query_hash: String,
    #[serde(default = "TrackerConfig::default_fallback_interval")]
    pub fallback_interval_secs: u64,
    #[serde(default = "TrackerConfig::default_min_refresh")]
    pub min_refresh_secs: u64,
    #[serde(default = "TrackerConfig::default_max_song_length")]
    pub max_song_length_secs: u64,
    #[serde(default = "TrackerConfig::default_true")]
    pub next_tracks_fallback: bool,
    /// 0 disables the clear-on-switch grace period
    #[serde(default = "TrackerConfig::default_switch_clear_delay")]
    pub switch_clear_delay_ms: u64,
    #[serde(default)]
    pub on_fetch_failure: FailurePolicy,
    #[serde(default = "TrackerConfig::default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "TrackerConfig::default_user_agent")]
    pub user_agent: String,
    /// Extra or overridden slug → station id entries
    #[serde(default)]
    pub stations: HashMap<String, u32>,
}

impl TrackerConfig {
    fn default_endpoint() -> String {
        DEFAULT_ENDPOINT.to_string()
    }

    fn default_hash() -> String {
        DEFAULT_PERSISTED_QUERY_HASH.to_string()
    }

    const fn default_fallback_interval() -> u64 {
        DEFAULT_FALLBACK_INTERVAL_SECS
    }

    const fn default_min_refresh() -> u64 {
        MIN_REFRESH_DELAY_SECS
    }

    const fn default_max_song_length() -> u64 {
        MAX_SONG_LENGTH_SECS
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_switch_clear_delay() -> u64 {
        DEFAULT_SWITCH_CLEAR_DELAY_MS
    }

    const fn default_request_timeout() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    }

    fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            persisted_query_hash: Self::default_hash(),
            fallback_interval_secs: Self::default_fallback_interval(),
            min_refresh_secs: Self::default_min_refresh(),
            max_song_length_secs: Self::default_max_song_length(),
            next_tracks_fallback: true,
            switch_clear_delay_ms: Self::default_switch_clear_delay(),
            on_fetch_failure: FailurePolicy::default(),
            request_timeout_secs: Self::default_request_timeout(),
            user_agent: Self::default_user_agent(),
            stations: HashMap::new(),
        }
    }
}

impl TrackerConfig {
    /// Parse a YAML document, honouring a `sources.fip` nesting
    ///
    /// Environment overrides are not applied here; see [`TrackerConfig::load`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(lower_keys_value(value))
    }

    /// Load from a YAML file (defaults if missing) then apply `PMOFIP__*` overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let value = match fs::read_to_string(path) {
            Ok(yaml) => {
                info!(config_file=%path.display(), "Loaded FIP tracker config");
                serde_yaml::from_str(&yaml)?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(config_file=%path.display(), "Config file not found, using defaults");
                Value::Mapping(Mapping::new())
            }
            Err(e) => return Err(e.into()),
        };

        let mut value = select_section(lower_keys_value(value));
        apply_env_overrides(&mut value, env::vars());
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match select_section(value) {
            Value::Null => Ok(Self::default()),
            section => Ok(serde_yaml::from_value(section)?),
        }
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_interval_secs)
    }

    pub fn min_refresh(&self) -> Duration {
        Duration::from_secs(self.min_refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `None` when the grace period is disabled
    pub fn switch_clear_delay(&self) -> Option<Duration> {
        (self.switch_clear_delay_ms > 0).then(|| Duration::from_millis(self.switch_clear_delay_ms))
    }

    pub fn extraction_strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy {
            next_tracks_fallback: self.next_tracks_fallback,
            max_song_length: Duration::from_secs(self.max_song_length_secs),
        }
    }

    pub fn station_table(&self) -> StationTable {
        StationTable::new(self.stations.clone())
    }
}

/// The `sources.fip` subtree when present, the document itself otherwise
fn select_section(value: Value) -> Value {
    let nested = value
        .get("sources")
        .and_then(|sources| sources.get("fip"))
        .cloned();
    nested.unwrap_or(value)
}

fn apply_env_overrides(config: &mut Value, vars: impl IntoIterator<Item = (String, String)>) {
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped
                .split("__")
                .map(str::to_lowercase)
                .collect::<Vec<_>>();
            set_value_internal(config, &key_path, convert_env_value(&value));
        }
    }
}

fn set_value_internal(data: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        *data = value;
        return;
    }
    if !data.is_mapping() {
        *data = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = data {
        let key = Value::String(path[0].clone());
        if path.len() == 1 {
            map.insert(key, value);
        } else {
            let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value);
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lower_keys_value(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

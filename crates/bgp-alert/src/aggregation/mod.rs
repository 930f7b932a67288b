// Copyright (C) 2026-present The NetGauze Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sharded sliding window aggregation of the RIS Live feed.
//!
//! Messages are partitioned by their filter value and each filter is pinned to
//! a single aggregation actor, so every window is owned by exactly one task.

use crate::filter::FilterKey;
use netgauze_analytics::aggregation::{WindowConfig, DEFAULT_WINDOW_SIZE_BUCKETS};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    num::NonZeroUsize,
    time::Duration,
};
use tracing::warn;

pub mod actor;

const NUM_WORKERS_DEFAULT: usize = 1;

pub(crate) const fn default_num_workers() -> usize {
    NUM_WORKERS_DEFAULT
}

pub(crate) const fn default_purge_interval() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationActorError {
    ConfigurationError { reason: String },
}

impl std::fmt::Display for AggregationActorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigurationError { reason } => {
                write!(f, "configuration validation failed [{reason}]")
            }
        }
    }
}

impl std::error::Error for AggregationActorError {}

/// Window size as written by the operator.
///
/// Deployments historically passed the size around as free text, so anything
/// is accepted here and resolved leniently by
/// [AggregationConfig::window_config].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WindowSizeSetting {
    Buckets(i64),
    Text(String),
    Unrecognized(serde_json::Value),
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_num_workers")]
    pub workers: usize,

    /// Number of one minute buckets in an analyzable window
    #[serde(default, skip_serializing_if = "::std::option::Option::is_none")]
    pub window_size: Option<WindowSizeSetting>,

    #[serde(default)]
    pub filter: FilterKey,

    /// Windows that saw nothing for this long (in event time) are dropped
    #[serde(default, skip_serializing_if = "::std::option::Option::is_none")]
    #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
    pub idle_timeout: Option<Duration>,

    /// How often idle windows are looked for
    #[serde(default = "default_purge_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub purge_interval: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            workers: default_num_workers(),
            window_size: None,
            filter: FilterKey::default(),
            idle_timeout: None,
            purge_interval: default_purge_interval(),
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<(), AggregationActorError> {
        if self.workers == 0 {
            return Err(AggregationActorError::ConfigurationError {
                reason: "workers must be greater than 0".to_string(),
            });
        }

        if self.idle_timeout.is_some() && self.purge_interval.is_zero() {
            return Err(AggregationActorError::ConfigurationError {
                reason: "purge_interval must be greater than 0 when idle_timeout is set"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Resolve the configured window size.
    ///
    /// A missing value silently takes the default, while a value that isn't a
    /// positive integer is reported and replaced by the default. Must be
    /// called after tracing is initialized for the notice to be visible.
    pub fn window_config(&self) -> WindowConfig {
        let parsed = match &self.window_size {
            None => return WindowConfig::default(),
            Some(WindowSizeSetting::Buckets(buckets)) => usize::try_from(*buckets)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(WindowConfig::new)
                .ok_or_else(|| format!("window size must be a positive integer, got {buckets}")),
            Some(WindowSizeSetting::Text(text)) => text
                .parse::<WindowConfig>()
                .map_err(|err| err.to_string()),
            Some(WindowSizeSetting::Unrecognized(value)) => {
                Err(format!("window size must be a positive integer, got {value}"))
            }
        };
        parsed.unwrap_or_else(|reason| {
            warn!("Invalid window size configuration, falling back to {DEFAULT_WINDOW_SIZE_BUCKETS} buckets: {reason}");
            WindowConfig::default()
        })
    }
}

/// Index of the aggregation shard owning `filter`
pub(crate) fn shard_for(filter: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    filter.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn with_window_size(window_size: Option<WindowSizeSetting>) -> AggregationConfig {
        AggregationConfig {
            window_size,
            ..AggregationConfig::default()
        }
    }

    #[test]
    fn test_window_size_absent() {
        let config = with_window_size(None);
        assert_eq!(config.window_config(), WindowConfig::default());
    }

    #[test]
    fn test_window_size_number_and_text() {
        let config = with_window_size(Some(WindowSizeSetting::Buckets(3)));
        assert_eq!(config.window_config().window_size_buckets(), 3);
        let config = with_window_size(Some(WindowSizeSetting::Text("15".to_string())));
        assert_eq!(config.window_config().window_size_buckets(), 15);
    }

    #[test]
    #[traced_test]
    fn test_window_size_not_a_number() {
        let config = with_window_size(Some(WindowSizeSetting::Text("abc".to_string())));
        assert_eq!(
            config.window_config().window_size_buckets(),
            DEFAULT_WINDOW_SIZE_BUCKETS
        );
        assert!(logs_contain("falling back to 30 buckets"));
        assert!(logs_contain("\"abc\" is not a number"));
    }

    #[test]
    #[traced_test]
    fn test_window_size_not_positive() {
        for buckets in [0, -5] {
            let config = with_window_size(Some(WindowSizeSetting::Buckets(buckets)));
            assert_eq!(
                config.window_config().window_size_buckets(),
                DEFAULT_WINDOW_SIZE_BUCKETS
            );
        }
        assert!(logs_contain("got -5"));
    }

    #[test]
    #[traced_test]
    fn test_window_size_unrecognized() {
        let config = with_window_size(Some(WindowSizeSetting::Unrecognized(
            serde_json::json!(2.5),
        )));
        assert_eq!(
            config.window_config().window_size_buckets(),
            DEFAULT_WINDOW_SIZE_BUCKETS
        );
        assert!(logs_contain("got 2.5"));
    }

    #[test]
    fn test_window_size_deserialize() {
        let config: AggregationConfig =
            serde_json::from_str(r#"{"window_size": 5, "filter": "peer"}"#).unwrap();
        assert_eq!(config.window_size, Some(WindowSizeSetting::Buckets(5)));
        assert_eq!(config.filter, FilterKey::Peer);
        assert_eq!(config.workers, 1);
        assert_eq!(config.purge_interval, Duration::from_secs(60));

        let config: AggregationConfig =
            serde_json::from_str(r#"{"window_size": "thirty"}"#).unwrap();
        assert_eq!(
            config.window_size,
            Some(WindowSizeSetting::Text("thirty".to_string()))
        );

        let config: AggregationConfig =
            serde_json::from_str(r#"{"window_size": [1, 2]}"#).unwrap();
        assert_eq!(
            config.window_size,
            Some(WindowSizeSetting::Unrecognized(serde_json::json!([1, 2])))
        );
    }

    #[test]
    fn test_validate() {
        assert!(AggregationConfig::default().validate().is_ok());
        let config = AggregationConfig {
            workers: 0,
            ..AggregationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AggregationActorError::ConfigurationError { .. })
        ));
        let config = AggregationConfig {
            idle_timeout: Some(Duration::from_secs(600)),
            purge_interval: Duration::ZERO,
            ..AggregationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shard_for_is_stable() {
        for filter in ["64496", "64497", "192.0.2.1", "rrc00"] {
            let shard = shard_for(filter, 4);
            assert!(shard < 4);
            assert_eq!(shard_for(filter, 4), shard);
            assert_eq!(shard_for(filter, 1), 0);
        }
    }
}

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

//! Window sizing for the sliding aggregation.
//!
//! The bucket width is fixed to one minute; only the number of buckets that
//! make up an analyzable window is configurable.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, str::FromStr, time::Duration};

/// Width of a single bucket in seconds
pub(crate) const BUCKET_SECONDS: i64 = 60;

/// Width of a single bucket
pub const BUCKET_DURATION: Duration = Duration::from_secs(BUCKET_SECONDS as u64);

/// Number of buckets in a window when nothing (or garbage) is configured
pub const DEFAULT_WINDOW_SIZE_BUCKETS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowConfigError {
    NotANumber(String),
    ZeroWindowSize,
}

impl std::fmt::Display for WindowConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotANumber(value) => write!(f, "window size \"{value}\" is not a number"),
            Self::ZeroWindowSize => write!(f, "window size must be greater than 0"),
        }
    }
}

impl std::error::Error for WindowConfigError {}

/// Read-only configuration shared by the aggregator and every analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowConfig {
    window_size_buckets: NonZeroUsize,
}

impl WindowConfig {
    pub const fn new(window_size_buckets: NonZeroUsize) -> Self {
        Self {
            window_size_buckets,
        }
    }

    /// Number of buckets that constitute one analyzable window
    pub const fn window_size_buckets(&self) -> usize {
        self.window_size_buckets.get()
    }

    pub const fn bucket_duration(&self) -> Duration {
        BUCKET_DURATION
    }

    /// Retention horizon: `window_size_buckets * bucket_duration`
    pub fn max_timespan(&self) -> Duration {
        let buckets = u32::try_from(self.window_size_buckets.get()).unwrap_or(u32::MAX);
        BUCKET_DURATION.saturating_mul(buckets)
    }

    /// [Self::max_timespan] as a signed delta for timestamp arithmetic
    pub(crate) fn horizon(&self) -> TimeDelta {
        i64::try_from(self.window_size_buckets.get())
            .ok()
            .and_then(|buckets| buckets.checked_mul(BUCKET_SECONDS))
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size_buckets: NonZeroUsize::new(DEFAULT_WINDOW_SIZE_BUCKETS)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl FromStr for WindowConfig {
    type Err = WindowConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let buckets = s
            .trim()
            .parse::<usize>()
            .map_err(|_| WindowConfigError::NotANumber(s.to_string()))?;
        NonZeroUsize::new(buckets)
            .map(Self::new)
            .ok_or(WindowConfigError::ZeroWindowSize)
    }
}

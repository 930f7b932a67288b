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

use crate::aggregation::window::Window;
use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::FxHashMap;

/// Owns one [Window] per filter value, keyed by the filter.
///
/// Windows are created lazily on the first message for a filter and live until
/// removed by [WindowRegistry::purge_idle].
#[derive(Debug, Clone)]
pub struct WindowRegistry<R> {
    windows: FxHashMap<String, Window<R>>,
    /// Greatest bucket key observed across all windows
    watermark: Option<DateTime<Utc>>,
}

impl<R> Default for WindowRegistry<R> {
    fn default() -> Self {
        Self {
            windows: FxHashMap::default(),
            watermark: None,
        }
    }
}

impl<R> WindowRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the window for `filter`, creating an empty one if it's the first
    /// time this filter is seen. Lookup and creation are a single map
    /// operation.
    pub fn resolve(&mut self, filter: String) -> &mut Window<R> {
        self.windows
            .entry(filter)
            .or_insert_with_key(|filter| Window::new(filter.clone()))
    }

    pub fn get(&self, filter: &str) -> Option<&Window<R>> {
        self.windows.get(filter)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Window<R>> {
        self.windows.values()
    }

    /// Event-time reference used for idle purging
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub(crate) fn observe(&mut self, bucket_key: DateTime<Utc>) {
        self.watermark = Some(match self.watermark {
            Some(current) => current.max(bucket_key),
            None => bucket_key,
        });
    }

    /// Drop every window whose newest bucket is older than
    /// `watermark - max_idle`. Returns the number of removed windows.
    pub fn purge_idle(&mut self, max_idle: TimeDelta) -> usize {
        let Some(watermark) = self.watermark else {
            return 0;
        };
        let Some(cutoff) = watermark.checked_sub_signed(max_idle) else {
            return 0;
        };
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window
                .newest_bucket()
                .is_some_and(|newest| newest >= cutoff)
        });
        before - self.windows.len()
    }
}

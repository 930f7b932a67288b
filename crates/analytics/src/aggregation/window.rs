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

//! Buckets and the per-filter window holding them.

use crate::aggregation::config::BUCKET_SECONDS;
use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Ordered mapping from bucket key to the records that fell into that bucket
pub type Buckets<R> = BTreeMap<DateTime<Utc>, Vec<R>>;

pub(crate) fn bucket_width() -> TimeDelta {
    TimeDelta::seconds(BUCKET_SECONDS)
}

/// Return the key of the bucket containing `ts`, i.e., `ts` truncated down to
/// the closest multiple of the bucket duration.
///
/// Truncation is towards negative infinity, so timestamps before the epoch
/// land in the bucket that starts before them.
pub fn bucket_key(ts: DateTime<Utc>) -> DateTime<Utc> {
    let into_bucket = ts.timestamp().rem_euclid(BUCKET_SECONDS);
    ts - TimeDelta::seconds(into_bucket)
        - TimeDelta::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

/// The buckets maintained for one filter.
///
/// Records are kept in a hash map so appending to an existing bucket is a
/// constant time lookup. The ordered key set gives the oldest and newest
/// bucket and drives eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window<R> {
    filter: String,
    buckets: FxHashMap<DateTime<Utc>, Vec<R>>,
    keys: BTreeSet<DateTime<Utc>>,
}

impl<R> Window<R> {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            buckets: FxHashMap::default(),
            keys: BTreeSet::new(),
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Buckets in key order, oldest first
    pub fn buckets(&self) -> impl Iterator<Item = (&DateTime<Utc>, &Vec<R>)> + '_ {
        self.keys
            .iter()
            .filter_map(|key| self.buckets.get_key_value(key))
    }

    pub fn bucket(&self, key: &DateTime<Utc>) -> Option<&[R]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Number of buckets, empty ones included
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains_bucket(&self, key: &DateTime<Utc>) -> bool {
        self.buckets.contains_key(key)
    }

    pub fn oldest_bucket(&self) -> Option<DateTime<Utc>> {
        self.keys.first().copied()
    }

    pub fn newest_bucket(&self) -> Option<DateTime<Utc>> {
        self.keys.last().copied()
    }

    /// Append `record` to an existing bucket. Gives the record back when the
    /// bucket doesn't exist.
    pub(crate) fn append(&mut self, key: &DateTime<Utc>, record: R) -> Result<(), R> {
        match self.buckets.get_mut(key) {
            Some(bucket) => {
                bucket.push(record);
                Ok(())
            }
            None => Err(record),
        }
    }

    /// Create the bucket at `key` (if missing) and append `record` to it
    pub(crate) fn open_bucket(&mut self, key: DateTime<Utc>, record: R) {
        self.keys.insert(key);
        self.buckets.entry(key).or_default().push(record);
    }

    /// Insert an empty bucket for every missing slot in `[from, until)`.
    /// `from` must be bucket aligned. Returns the number of inserted buckets.
    pub(crate) fn fill_gaps(&mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> usize {
        let width = bucket_width();
        let mut filled = 0;
        let mut slot = from;
        while slot < until {
            if self.keys.insert(slot) {
                self.buckets.insert(slot, Vec::new());
                filled += 1;
            }
            slot += width;
        }
        filled
    }

    /// Remove every bucket whose key is strictly before `cutoff`. Returns the
    /// number of removed buckets.
    pub(crate) fn evict_before(&mut self, cutoff: &DateTime<Utc>) -> usize {
        let retained = self.keys.split_off(cutoff);
        let expired = std::mem::replace(&mut self.keys, retained);
        for key in &expired {
            self.buckets.remove(key);
        }
        expired.len()
    }
}

impl<R: Clone> Window<R> {
    /// Independent copy of the window; later mutation of the window is not
    /// visible through the snapshot.
    pub fn snapshot(&self) -> WindowSnapshot<R> {
        WindowSnapshot {
            filter: self.filter.clone(),
            buckets: self
                .buckets()
                .map(|(key, records)| (*key, records.clone()))
                .collect(),
        }
    }
}

/// A frozen copy of a [Window] handed to an analysis sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot<R> {
    filter: String,
    buckets: Buckets<R>,
}

impl<R> WindowSnapshot<R> {
    pub fn new(filter: impl Into<String>, buckets: Buckets<R>) -> Self {
        Self {
            filter: filter.into(),
            buckets,
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn buckets(&self) -> &Buckets<R> {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Key of the oldest bucket
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.buckets.first_key_value().map(|(key, _)| *key)
    }

    /// Exclusive end of the newest bucket
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.buckets
            .last_key_value()
            .map(|(key, _)| *key + bucket_width())
    }

    /// Number of records per bucket, oldest first
    pub fn counts(&self) -> impl Iterator<Item = (DateTime<Utc>, usize)> + '_ {
        self.buckets
            .iter()
            .map(|(key, records)| (*key, records.len()))
    }

    pub fn total_records(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn into_parts(self) -> (String, Buckets<R>) {
        (self.filter, self.buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[rstest]
    #[case(0, 0)]
    #[case(59, 0)]
    #[case(60, 60)]
    #[case(65, 60)]
    #[case(185, 180)]
    #[case(1738671601, 1738671600)]
    #[case(-1, -60)]
    #[case(-60, -60)]
    #[case(-61, -120)]
    fn test_bucket_key(#[case] input: i64, #[case] expected: i64) {
        assert_eq!(bucket_key(ts(input)), ts(expected));
    }

    #[test]
    fn test_bucket_key_sub_second() {
        let input = Utc.timestamp_opt(125, 999_999_999).unwrap();
        assert_eq!(bucket_key(input), ts(120));
        let input = Utc.timestamp_millis_opt(-500).unwrap();
        assert_eq!(bucket_key(input), ts(-60));
    }

    #[test]
    fn test_fill_gaps() {
        let mut window = Window::new("F");
        window.open_bucket(ts(0), 1);
        window.open_bucket(ts(120), 2);
        let filled = window.fill_gaps(ts(0), ts(300));
        assert_eq!(filled, 3);
        let keys: Vec<_> = window.buckets().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec![ts(0), ts(60), ts(120), ts(180), ts(240)]);
        // Existing buckets keep their records
        assert_eq!(window.bucket(&ts(0)), Some(&[1][..]));
        assert_eq!(window.bucket(&ts(120)), Some(&[2][..]));
        assert_eq!(window.bucket(&ts(60)), Some(&[][..]));
    }

    #[test]
    fn test_evict_before() {
        let mut window = Window::new("F");
        for secs in [0, 60, 120, 180] {
            window.open_bucket(ts(secs), secs);
        }
        assert_eq!(window.evict_before(&ts(120)), 2);
        assert_eq!(window.oldest_bucket(), Some(ts(120)));
        assert_eq!(window.newest_bucket(), Some(ts(180)));
        // Nothing strictly before the cutoff is left
        assert_eq!(window.evict_before(&ts(120)), 0);
    }

    #[test]
    fn test_append() {
        let mut window = Window::new("F");
        assert_eq!(window.append(&ts(0), 1), Err(1));
        window.open_bucket(ts(0), 1);
        assert_eq!(window.append(&ts(0), 2), Ok(()));
        assert_eq!(window.bucket(&ts(0)), Some(&[1, 2][..]));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_append_keeps_key_order_and_eviction_in_sync() {
        let mut window = Window::new("F");
        // Buckets opened out of order
        for minute in [5, 1, 3, 0, 4, 2] {
            window.open_bucket(ts(minute * 60), minute);
        }
        for minute in 0..6 {
            assert_eq!(window.append(&ts(minute * 60), minute + 10), Ok(()));
        }
        let ordered: Vec<_> = window
            .buckets()
            .map(|(key, records)| (key.timestamp(), records.clone()))
            .collect();
        assert_eq!(
            ordered,
            (0..6)
                .map(|minute| (minute * 60, vec![minute, minute + 10]))
                .collect::<Vec<_>>()
        );

        assert_eq!(window.evict_before(&ts(180)), 3);
        assert_eq!(window.len(), 3);
        assert!(!window.contains_bucket(&ts(120)));
        assert_eq!(window.bucket(&ts(60)), None);
        assert_eq!(window.append(&ts(60), 99), Err(99));
        assert_eq!(window.oldest_bucket(), Some(ts(180)));
        assert_eq!(window.snapshot().len(), 3);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut window = Window::new("F");
        window.open_bucket(ts(0), 1);
        window.open_bucket(ts(60), 2);
        let snapshot = window.snapshot();
        window.open_bucket(ts(60), 3);
        window.evict_before(&ts(60));

        assert_eq!(snapshot.filter(), "F");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.start(), Some(ts(0)));
        assert_eq!(snapshot.end(), Some(ts(120)));
        assert_eq!(snapshot.total_records(), 2);
        assert_eq!(
            snapshot.counts().collect::<Vec<_>>(),
            vec![(ts(0), 1), (ts(60), 1)]
        );
    }
}

// Copyright (C) 2025-present The NetGauze Authors.
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

//! A module that provides gap-free sliding time-window aggregation of keyed
//! time-series data.
//!
//! The main components are:
//! - `TimeSeriesData`: A trait exposing the timestamp of a data point
//! - `Window`: The one-minute buckets kept for a single filter key
//! - `WindowRegistry`: Maps each filter key to its window
//! - `SlidingWindowAggregator`: Assigns records to buckets, fills empty buckets
//!   for quiet periods, evicts aged-out buckets and emits completed windows
//! - `AnalysisSink`: The consumer of completed windows
//! - `AggregationWindowingExt`/`AggregationWindowStreamExt`: Iterator and
//!   stream adapters providing an ergonomic API over the aggregator
//!
//! The windowing system features:
//! - Fixed one-minute buckets keyed by the truncated record timestamp
//! - Windows of a configurable number of buckets, evaluated every time a new
//!   bucket is opened
//! - Empty buckets for silent minutes, so analysis always sees an evenly
//!   spaced series
//! - Key-based partitioning of data streams
//!
//! Example usage:
//! ```text
//! use netgauze_analytics::aggregation::{AggregationWindowingExt, WindowConfig};
//!
//! let messages = get_messages_iterator();
//! let completed = messages
//!     .sliding_windows(WindowConfig::default())
//!     .filter_map(|x| x.left()) // Drop late records
//!     .collect::<Vec<_>>();
//! ```

mod config;
mod registry;
mod window;

pub use config::{
    WindowConfig, WindowConfigError, BUCKET_DURATION, DEFAULT_WINDOW_SIZE_BUCKETS,
};
pub use registry::WindowRegistry;
pub use window::{bucket_key, Buckets, Window, WindowSnapshot};

use chrono::{DateTime, TimeDelta, Utc};
use futures_core::Stream;
use pin_project::pin_project;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

/// A trait for defining time-series data points
pub trait TimeSeriesData {
    fn get_ts(&self) -> DateTime<Utc>;
}

impl<T: TimeSeriesData + ?Sized> TimeSeriesData for Arc<T> {
    fn get_ts(&self) -> DateTime<Utc> {
        self.as_ref().get_ts()
    }
}

impl<T: TimeSeriesData + ?Sized> TimeSeriesData for Box<T> {
    fn get_ts(&self) -> DateTime<Utc> {
        self.as_ref().get_ts()
    }
}

/// A record tagged with the filter key it's aggregated under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<R> {
    pub filter: String,
    pub record: R,
}

impl<R> Message<R> {
    pub fn new(filter: impl Into<String>, record: R) -> Self {
        Self {
            filter: filter.into(),
            record,
        }
    }
}

/// Consumer of completed windows.
///
/// Called synchronously: the caller doesn't process further records until
/// `analyze` returns.
pub trait AnalysisSink<R> {
    fn analyze(&mut self, window: WindowSnapshot<R>, config: &WindowConfig);
}

impl<R, S: AnalysisSink<R> + ?Sized> AnalysisSink<R> for Box<S> {
    fn analyze(&mut self, window: WindowSnapshot<R>, config: &WindowConfig) {
        self.as_mut().analyze(window, config)
    }
}

/// What happened to a record handed to [SlidingWindowAggregator::process]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome<R> {
    /// Appended to an already existing bucket
    Appended,
    /// Opened a new bucket, the window isn't full yet
    Opened,
    /// Opened a new bucket and the window reached its size. Carries the window
    /// as it was after eviction, before the new bucket was created.
    Completed(WindowSnapshot<R>),
    /// Older than the newest bucket, but within the retention horizon: a
    /// bucket was created for it without evaluating the window
    Readmitted,
    /// Older than the retention horizon, dropped
    Late(R),
}

/// Sliding window aggregation over one-minute buckets.
///
/// Records must arrive in non-decreasing timestamp order per filter for the
/// windows to be evaluated as expected; out-of-order records are either
/// re-admitted into a missing bucket or reported as late.
#[derive(Debug, Clone)]
pub struct SlidingWindowAggregator<R> {
    config: WindowConfig,
    registry: WindowRegistry<R>,
}

impl<R: TimeSeriesData + Clone> SlidingWindowAggregator<R> {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            registry: WindowRegistry::new(),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn registry(&self) -> &WindowRegistry<R> {
        &self.registry
    }

    /// Drop windows of filters that have been silent for longer than
    /// `max_idle`, see [WindowRegistry::purge_idle].
    pub fn purge_idle(&mut self, max_idle: TimeDelta) -> usize {
        self.registry.purge_idle(max_idle)
    }

    pub fn process(&mut self, message: Message<R>) -> ProcessOutcome<R> {
        let Message { filter, record } = message;
        let key = bucket_key(record.get_ts());
        let horizon = self.config.horizon();
        let window_size = self.config.window_size_buckets();
        self.registry.observe(key);
        let window = self.registry.resolve(filter);

        // Hot path, the bucket already exists
        let record = match window.append(&key, record) {
            Ok(()) => return ProcessOutcome::Appended,
            Err(record) => record,
        };

        let cutoff = key
            .checked_sub_signed(horizon)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        if let Some(newest) = window.newest_bucket() {
            if key < newest {
                let readmit_from = newest
                    .checked_sub_signed(horizon)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                if key >= readmit_from {
                    window.open_bucket(key, record);
                    return ProcessOutcome::Readmitted;
                }
                return ProcessOutcome::Late(record);
            }
        }

        // New bucket event: fill the gaps between the oldest bucket and the new
        // one. Slots older than the cutoff are evicted below anyway once the
        // window is full, so the walk never starts before the cutoff.
        if window.len() >= 2 {
            if let Some(oldest) = window.oldest_bucket() {
                window.fill_gaps(oldest.max(cutoff), key);
            }
        }

        let completed = if window.len() >= window_size {
            window.evict_before(&cutoff);
            Some(window.snapshot())
        } else {
            None
        };

        window.open_bucket(key, record);
        match completed {
            Some(snapshot) => ProcessOutcome::Completed(snapshot),
            None => ProcessOutcome::Opened,
        }
    }

    /// Process `message` and hand a completed window, if any, to `sink`
    /// before returning.
    ///
    /// Returns the record back if it was dropped for being late.
    pub fn process_into<S: AnalysisSink<R> + ?Sized>(
        &mut self,
        message: Message<R>,
        sink: &mut S,
    ) -> Option<R> {
        match self.process(message) {
            ProcessOutcome::Completed(snapshot) => {
                sink.analyze(snapshot, &self.config);
                None
            }
            ProcessOutcome::Late(record) => Some(record),
            ProcessOutcome::Appended | ProcessOutcome::Opened | ProcessOutcome::Readmitted => {
                None
            }
        }
    }
}

/// An iterator adaptor that emits completed windows (left) and late records
/// (right) out of a stream of messages
pub struct SlidingWindowAdaptor<R, I: Iterator<Item = Message<R>>> {
    source: I,
    aggregator: SlidingWindowAggregator<R>,
}

impl<R: TimeSeriesData + Clone, I: Iterator<Item = Message<R>>> Iterator
    for SlidingWindowAdaptor<R, I>
{
    type Item = either::Either<WindowSnapshot<R>, R>;

    fn next(&mut self) -> Option<Self::Item> {
        for message in self.source.by_ref() {
            match self.aggregator.process(message) {
                ProcessOutcome::Completed(snapshot) => return Some(either::Left(snapshot)),
                ProcessOutcome::Late(record) => return Some(either::Right(record)),
                ProcessOutcome::Appended | ProcessOutcome::Opened | ProcessOutcome::Readmitted => {}
            }
        }
        // Partially filled windows are not analyzable, nothing to flush
        None
    }
}

pub trait AggregationWindowingExt<R: TimeSeriesData + Clone>:
    Iterator<Item = Message<R>> + Sized
{
    fn sliding_windows(self, config: WindowConfig) -> SlidingWindowAdaptor<R, Self> {
        SlidingWindowAdaptor {
            source: self,
            aggregator: SlidingWindowAggregator::new(config),
        }
    }
}

impl<R: TimeSeriesData + Clone, I: Iterator<Item = Message<R>>> AggregationWindowingExt<R> for I {}

#[pin_project]
pub struct SlidingWindowStreamAdaptor<R, I: Stream<Item = Message<R>>> {
    #[pin]
    source: I,
    aggregator: SlidingWindowAggregator<R>,
}

impl<R: TimeSeriesData + Clone, I: Stream<Item = Message<R>>> SlidingWindowStreamAdaptor<R, I> {
    pub fn new(source: I, config: WindowConfig) -> Self {
        Self {
            source,
            aggregator: SlidingWindowAggregator::new(config),
        }
    }
}

impl<R: TimeSeriesData + Clone, I: Stream<Item = Message<R>>> Stream
    for SlidingWindowStreamAdaptor<R, I>
{
    type Item = either::Either<WindowSnapshot<R>, R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.source.as_mut().poll_next(cx) {
                Poll::Ready(Some(message)) => match this.aggregator.process(message) {
                    ProcessOutcome::Completed(snapshot) => {
                        return Poll::Ready(Some(either::Left(snapshot)))
                    }
                    ProcessOutcome::Late(record) => return Poll::Ready(Some(either::Right(record))),
                    ProcessOutcome::Appended
                    | ProcessOutcome::Opened
                    | ProcessOutcome::Readmitted => {}
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pub trait AggregationWindowStreamExt<R: TimeSeriesData + Clone>: Stream<Item = Message<R>> {
    fn sliding_windows(self, config: WindowConfig) -> SlidingWindowStreamAdaptor<R, Self>
    where
        Self: Sized,
    {
        SlidingWindowStreamAdaptor::new(self, config)
    }
}

impl<R: TimeSeriesData + Clone, I: Stream<Item = Message<R>>> AggregationWindowStreamExt<R>
    for I
{
}

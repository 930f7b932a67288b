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

use crate::{BgpMessage, BgpRecord};
use chrono::TimeDelta;
use either::Either;
use netgauze_analytics::aggregation::{
    AnalysisSink, ProcessOutcome, SlidingWindowAggregator, WindowConfig, WindowSnapshot,
};
use opentelemetry::metrics::Meter;
use std::time::Duration;
use tokio::{runtime::RuntimeFlavor, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AggregationStats {
    pub received_messages: opentelemetry::metrics::Counter<u64>,
    pub opened_buckets: opentelemetry::metrics::Counter<u64>,
    pub completed_windows: opentelemetry::metrics::Counter<u64>,
    pub readmitted_messages: opentelemetry::metrics::Counter<u64>,
    pub late_messages: opentelemetry::metrics::Counter<u64>,
    pub purged_windows: opentelemetry::metrics::Counter<u64>,
}

impl AggregationStats {
    pub fn new(meter: Meter) -> Self {
        let received_messages = meter
            .u64_counter("netgauze.bgp_alert.aggregation.received.messages")
            .with_description("Number of BGP messages received for windowing")
            .build();
        let opened_buckets = meter
            .u64_counter("netgauze.bgp_alert.aggregation.opened.buckets")
            .with_description("Number of one minute buckets opened by a new message")
            .build();
        let completed_windows = meter
            .u64_counter("netgauze.bgp_alert.aggregation.completed.windows")
            .with_description("Number of complete windows handed over for analysis")
            .build();
        let readmitted_messages = meter
            .u64_counter("netgauze.bgp_alert.aggregation.readmitted.messages")
            .with_description("Number of out of order messages placed back into their window")
            .build();
        let late_messages = meter
            .u64_counter("netgauze.bgp_alert.aggregation.late.messages")
            .with_description("Number of messages dropped for being older than their window")
            .build();
        let purged_windows = meter
            .u64_counter("netgauze.bgp_alert.aggregation.purged.windows")
            .with_description("Number of idle windows removed")
            .build();
        Self {
            received_messages,
            opened_buckets,
            completed_windows,
            readmitted_messages,
            late_messages,
            purged_windows,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AggregationCommand {
    Shutdown,
}

/// Run a sink that may block on I/O. On a multi threaded runtime the worker
/// hands its queued tasks to another thread for the duration of the call.
fn analyze_blocking<S: AnalysisSink<BgpRecord>>(
    sink: &mut S,
    window: WindowSnapshot<BgpRecord>,
    config: &WindowConfig,
) {
    let multi_thread = tokio::runtime::Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if multi_thread {
        tokio::task::block_in_place(|| sink.analyze(window, config));
    } else {
        sink.analyze(window, config);
    }
}

/// Owns the windows of one shard and runs analysis inline whenever one of
/// them completes.
struct AggregationActor<S> {
    cmd_rx: mpsc::Receiver<AggregationCommand>,
    rx: async_channel::Receiver<BgpMessage>,
    aggregator: SlidingWindowAggregator<BgpRecord>,
    sink: S,
    idle_timeout: Option<TimeDelta>,
    purge_interval: Duration,
    stats: AggregationStats,
    shard_id: usize,
}

impl<S: AnalysisSink<BgpRecord>> AggregationActor<S> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        cmd_rx: mpsc::Receiver<AggregationCommand>,
        rx: async_channel::Receiver<BgpMessage>,
        window_config: WindowConfig,
        sink: S,
        idle_timeout: Option<Duration>,
        purge_interval: Duration,
        stats: AggregationStats,
        shard_id: usize,
    ) -> Self {
        Self {
            cmd_rx,
            rx,
            aggregator: SlidingWindowAggregator::new(window_config),
            sink,
            idle_timeout: idle_timeout.and_then(|timeout| TimeDelta::from_std(timeout).ok()),
            purge_interval,
            stats,
            shard_id,
        }
    }

    fn tags(&self) -> [opentelemetry::KeyValue; 1] {
        [opentelemetry::KeyValue::new(
            "shard_id",
            opentelemetry::Value::I64(self.shard_id as i64),
        )]
    }

    fn handle_message(&mut self, message: BgpMessage) {
        let tags = self.tags();
        self.stats.received_messages.add(1, &tags);
        let filter = message.filter.clone();
        match self.aggregator.process(message) {
            ProcessOutcome::Appended => {}
            ProcessOutcome::Opened => {
                self.stats.opened_buckets.add(1, &tags);
            }
            ProcessOutcome::Completed(window) => {
                self.stats.opened_buckets.add(1, &tags);
                self.stats.completed_windows.add(1, &tags);
                debug!(
                    "[Shard {}] Window for filter {filter} complete with {} buckets",
                    self.shard_id,
                    window.len()
                );
                analyze_blocking(&mut self.sink, window, self.aggregator.config());
            }
            ProcessOutcome::Readmitted => {
                self.stats.readmitted_messages.add(1, &tags);
            }
            ProcessOutcome::Late(record) => {
                self.stats.late_messages.add(1, &tags);
                debug!(
                    "[Shard {}] Dropping late message for filter {filter} at {}",
                    self.shard_id, record.timestamp
                );
            }
        }
    }

    fn purge_idle(&mut self) -> usize {
        let Some(idle_timeout) = self.idle_timeout else {
            return 0;
        };
        let purged = self.aggregator.purge_idle(idle_timeout);
        if purged > 0 {
            self.stats.purged_windows.add(purged as u64, &self.tags());
            debug!(
                "[Shard {}] Purged {purged} idle windows, {} remaining",
                self.shard_id,
                self.aggregator.registry().len()
            );
        }
        purged
    }

    async fn run(mut self) -> anyhow::Result<String> {
        let mut purge_timer = tokio::time::interval(self.purge_interval);
        purge_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(AggregationCommand::Shutdown) => {
                            info!("[Shard {}] Shutting down BGP aggregation actor", self.shard_id);
                        }
                        None => {
                            warn!("[Shard {}] BGP aggregation actor terminated due to command channel closing", self.shard_id);
                        }
                    }
                    return Ok("BGP aggregation shutdown successfully".to_string());
                }
                _ = purge_timer.tick(), if self.idle_timeout.is_some() => {
                    self.purge_idle();
                }
                msg = self.rx.recv() => {
                    match msg {
                        Ok(message) => self.handle_message(message),
                        Err(_) => {
                            info!(
                                "[Shard {}] BGP aggregation input closed, {} windows open",
                                self.shard_id,
                                self.aggregator.registry().len()
                            );
                            return Ok("BGP aggregation input drained".to_string());
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum AggregationActorHandleError {
    SendError,
}

impl std::fmt::Display for AggregationActorHandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendError => write!(f, "Failed to send command to BGP aggregation actor"),
        }
    }
}

impl std::error::Error for AggregationActorHandleError {}

/// Handle for controlling a running aggregation actor.
///
/// Dropping every clone of the handle closes the command channel, which stops
/// the actor.
#[derive(Debug, Clone)]
pub struct AggregationActorHandle {
    cmd_send: mpsc::Sender<AggregationCommand>,
}

impl AggregationActorHandle {
    pub fn new<S>(
        window_config: WindowConfig,
        idle_timeout: Option<Duration>,
        purge_interval: Duration,
        rx: async_channel::Receiver<BgpMessage>,
        sink: S,
        stats: Either<Meter, AggregationStats>,
        shard_id: usize,
    ) -> (JoinHandle<anyhow::Result<String>>, Self)
    where
        S: AnalysisSink<BgpRecord> + Send + 'static,
    {
        let (cmd_send, cmd_recv) = mpsc::channel(10);
        let stats = match stats {
            Either::Left(meter) => AggregationStats::new(meter),
            Either::Right(stats) => stats,
        };
        let actor = AggregationActor::new(
            cmd_recv,
            rx,
            window_config,
            sink,
            idle_timeout,
            purge_interval,
            stats,
            shard_id,
        );
        let join_handle = tokio::spawn(actor.run());
        (join_handle, Self { cmd_send })
    }

    pub async fn shutdown(&self) -> Result<(), AggregationActorHandleError> {
        self.cmd_send
            .send(AggregationCommand::Shutdown)
            .await
            .map_err(|_| AggregationActorHandleError::SendError)
    }
}

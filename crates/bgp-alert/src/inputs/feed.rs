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

//! Feed actor reading the RIS Live stream.
//!
//! Each line is decoded, assigned its filter values and routed to the
//! aggregation shard owning each filter. Reaching the end of the input closes
//! the shard channels, letting the aggregation actors drain and stop.

use crate::{
    aggregation::shard_for,
    filter::FilterKey,
    ris_live::{decode, RisLiveMessage, RisMessageType},
    BgpMessage,
};
use either::Either;
use netgauze_analytics::aggregation::Message;
use opentelemetry::metrics::Meter;
use std::{path::Path, pin::Pin, sync::Arc};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, error, info, trace, warn};

/// Boxed line oriented input the feed reads from
pub type FeedReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Open `path` for reading, `-` is stdin.
pub async fn open_input(path: &Path) -> std::io::Result<FeedReader> {
    if path.as_os_str() == "-" {
        Ok(Box::pin(BufReader::new(tokio::io::stdin())))
    } else {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::pin(BufReader::new(file)))
    }
}

#[derive(Debug, Clone)]
pub struct FeedStats {
    pub lines_read: opentelemetry::metrics::Counter<u64>,
    pub decode_errors: opentelemetry::metrics::Counter<u64>,
    pub ignored_messages: opentelemetry::metrics::Counter<u64>,
    pub unassigned_messages: opentelemetry::metrics::Counter<u64>,
    pub routed_messages: opentelemetry::metrics::Counter<u64>,
    pub send_error: opentelemetry::metrics::Counter<u64>,
}

impl FeedStats {
    pub fn new(meter: Meter) -> Self {
        let lines_read = meter
            .u64_counter("netgauze.bgp_alert.feed.lines.read")
            .with_description("Number of non empty lines read from the feed")
            .build();
        let decode_errors = meter
            .u64_counter("netgauze.bgp_alert.feed.decode.errors")
            .with_description("Number of lines that are not valid RIS Live messages")
            .build();
        let ignored_messages = meter
            .u64_counter("netgauze.bgp_alert.feed.ignored.messages")
            .with_description("Number of control messages and filtered out RIS message types")
            .build();
        let unassigned_messages = meter
            .u64_counter("netgauze.bgp_alert.feed.unassigned.messages")
            .with_description("Number of RIS messages without any filter value")
            .build();
        let routed_messages = meter
            .u64_counter("netgauze.bgp_alert.feed.routed.messages")
            .with_description("Number of messages sent to an aggregation shard")
            .build();
        let send_error = meter
            .u64_counter("netgauze.bgp_alert.feed.send.error")
            .with_description("Number of messages that failed to reach an aggregation shard")
            .build();
        Self {
            lines_read,
            decode_errors,
            ignored_messages,
            unassigned_messages,
            routed_messages,
            send_error,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FeedCommand {
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum FeedActorError {
    SendChannelError { shard_id: usize },
}

impl std::fmt::Display for FeedActorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendChannelError { shard_id } => {
                write!(f, "error in send channel of aggregation shard {shard_id}")
            }
        }
    }
}

impl std::error::Error for FeedActorError {}

struct FeedActor<Rd> {
    cmd_rx: mpsc::Receiver<FeedCommand>,
    lines: Split<Rd>,
    filter: FilterKey,
    message_types: Vec<RisMessageType>,
    shards: Vec<async_channel::Sender<BgpMessage>>,
    stats: FeedStats,
}

impl<Rd: AsyncBufRead + Unpin> FeedActor<Rd> {
    fn new(
        cmd_rx: mpsc::Receiver<FeedCommand>,
        reader: Rd,
        filter: FilterKey,
        message_types: Vec<RisMessageType>,
        shards: Vec<async_channel::Sender<BgpMessage>>,
        stats: FeedStats,
    ) -> Self {
        Self {
            cmd_rx,
            lines: reader.split(b'\n'),
            filter,
            message_types,
            shards,
            stats,
        }
    }

    async fn handle_line(&mut self, line: &[u8]) -> Result<(), FeedActorError> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(err) => {
                self.stats.lines_read.add(1, &[]);
                self.stats.decode_errors.add(1, &[]);
                warn!("Skipping RIS Live line that is not valid UTF-8: {err}");
                return Ok(());
            }
        };
        if line.is_empty() {
            return Ok(());
        }
        self.stats.lines_read.add(1, &[]);
        let message = match decode(line) {
            Ok(RisLiveMessage::RisMessage(message)) => message,
            Ok(RisLiveMessage::RisError { message }) => {
                self.stats.ignored_messages.add(1, &[]);
                warn!("RIS Live reported an error: {message}");
                return Ok(());
            }
            Ok(other) => {
                self.stats.ignored_messages.add(1, &[]);
                trace!("Ignoring RIS Live control message: {other:?}");
                return Ok(());
            }
            Err(err) => {
                self.stats.decode_errors.add(1, &[]);
                warn!("Skipping undecodable RIS Live message: {err}");
                return Ok(());
            }
        };

        if !self.message_types.contains(&message.kind) {
            self.stats.ignored_messages.add(
                1,
                &[opentelemetry::KeyValue::new("type", message.kind.to_string())],
            );
            return Ok(());
        }

        let filters = self.filter.filters(&message);
        if filters.is_empty() {
            self.stats.unassigned_messages.add(1, &[]);
            debug!(
                "RIS message {} from {} has no {} value",
                message.id, message.peer, self.filter
            );
            return Ok(());
        }

        let record = Arc::new(message);
        for filter in filters {
            let shard_id = shard_for(&filter, self.shards.len());
            let tags = [opentelemetry::KeyValue::new(
                "shard_id",
                opentelemetry::Value::I64(shard_id as i64),
            )];
            let Some(shard) = self.shards.get(shard_id) else {
                continue;
            };
            if let Err(err) = shard.send(Message::new(filter, Arc::clone(&record))).await {
                error!("Failed to send BGP message to aggregation shard {shard_id}: {err}");
                self.stats.send_error.add(1, &tags);
                return Err(FeedActorError::SendChannelError { shard_id });
            }
            self.stats.routed_messages.add(1, &tags);
        }
        Ok(())
    }

    async fn run(mut self) -> anyhow::Result<String> {
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(FeedCommand::Shutdown) => {
                            info!("Shutting down RIS Live feed actor");
                        }
                        None => {
                            warn!("RIS Live feed actor terminated due to command channel closing");
                        }
                    }
                    return Ok("RIS Live feed shutdown successfully".to_string());
                }
                line = self.lines.next_segment() => {
                    match line {
                        Ok(Some(line)) => self.handle_line(&line).await?,
                        Ok(None) => {
                            info!("Reached end of RIS Live feed");
                            return Ok("RIS Live feed reached end of input".to_string());
                        }
                        Err(err) => {
                            error!("Stopping RIS Live feed after read error: {err}");
                            return Ok("RIS Live feed stopped after read error".to_string());
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum FeedActorHandleError {
    SendError,
}

impl std::fmt::Display for FeedActorHandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendError => write!(f, "Failed to send command to RIS Live feed actor"),
        }
    }
}

impl std::error::Error for FeedActorHandleError {}

/// Handle for controlling a running feed actor.
///
/// The actor owns the only senders to the aggregation shards; once it stops,
/// the shards see their input closing.
#[derive(Debug, Clone)]
pub struct FeedActorHandle {
    cmd_send: mpsc::Sender<FeedCommand>,
}

impl FeedActorHandle {
    pub fn new<Rd>(
        reader: Rd,
        filter: FilterKey,
        message_types: Vec<RisMessageType>,
        shards: Vec<async_channel::Sender<BgpMessage>>,
        stats: Either<Meter, FeedStats>,
    ) -> (JoinHandle<anyhow::Result<String>>, Self)
    where
        Rd: AsyncBufRead + Unpin + Send + 'static,
    {
        let (cmd_send, cmd_recv) = mpsc::channel(10);
        let stats = match stats {
            Either::Left(meter) => FeedStats::new(meter),
            Either::Right(stats) => stats,
        };
        let actor = FeedActor::new(cmd_recv, reader, filter, message_types, shards, stats);
        let join_handle = tokio::spawn(actor.run());
        (join_handle, Self { cmd_send })
    }

    pub async fn shutdown(&self) -> Result<(), FeedActorHandleError> {
        self.cmd_send
            .send(FeedCommand::Shutdown)
            .await
            .map_err(|_| FeedActorHandleError::SendError)
    }
}

#[cfg(test)]
mod tests;

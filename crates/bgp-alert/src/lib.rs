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

//! Sliding window monitoring of the RIPE RIS Live BGP feed.
//!
//! The feed actor decodes the stream and routes every message, by its filter
//! value, to one of the aggregation actors. Each aggregation actor keeps one
//! minute buckets per filter and hands every complete window to the configured
//! analysis sink.

use crate::{
    aggregation::actor::{AggregationActorHandle, AggregationStats},
    analysis::build_sink,
    config::BgpAlertConfig,
    inputs::feed::{open_input, FeedActorHandle},
    ris_live::RisMessage,
};
use anyhow::Context;
use either::Either;
use futures_util::{stream::FuturesUnordered, StreamExt};
use netgauze_analytics::aggregation::Message;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub mod aggregation;
pub mod analysis;
pub mod config;
pub mod filter;
pub mod inputs;
pub mod ris_live;

/// A decoded RIS message, shared by every window it's filed under
pub type BgpRecord = Arc<RisMessage>;

pub type BgpMessage = Message<BgpRecord>;

/// Run the feed and the aggregation shards until the input is exhausted.
pub async fn init_bgp_alert(
    config: BgpAlertConfig,
    meter: opentelemetry::metrics::Meter,
) -> anyhow::Result<()> {
    config.validate()?;
    let window_config = config.aggregation.window_config();
    let reader = open_input(&config.input.path)
        .await
        .with_context(|| format!("failed to open input {}", config.input.path.display()))?;

    info!(
        "Starting {} aggregation shards, filter: {}, window: {} buckets of {}s",
        config.aggregation.workers,
        config.aggregation.filter,
        window_config.window_size_buckets(),
        window_config.bucket_duration().as_secs()
    );

    let mut join_set = FuturesUnordered::new();
    let mut agg_handles = Vec::with_capacity(config.aggregation.workers);
    let mut shard_senders = Vec::with_capacity(config.aggregation.workers);
    let aggregation_stats = AggregationStats::new(meter.clone());
    for shard_id in 0..config.aggregation.workers {
        let (shard_tx, shard_rx) = async_channel::bounded(config.input.buffer_size);
        let sink = build_sink(&config.analysis).context("failed to open analysis output")?;
        let (agg_join, agg_handle) = AggregationActorHandle::new(
            window_config,
            config.aggregation.idle_timeout,
            config.aggregation.purge_interval,
            shard_rx,
            sink,
            Either::Right(aggregation_stats.clone()),
            shard_id,
        );
        join_set.push(agg_join);
        agg_handles.push(agg_handle);
        shard_senders.push(shard_tx);
    }

    let (feed_join, feed_handle) = FeedActorHandle::new(
        reader,
        config.aggregation.filter,
        config.input.message_types.clone(),
        shard_senders,
        Either::Left(meter),
    );
    join_set.push(feed_join);

    let mut ret = Ok(());
    while let Some(join_ret) = join_set.next().await {
        let task_ret = match join_ret {
            Ok(Ok(msg)) => {
                info!("{msg}");
                continue;
            }
            Ok(Err(err)) => Err(err),
            Err(err) => Err(anyhow::anyhow!(err)),
        };
        if ret.is_ok() {
            warn!("BGP alert actor failed, shutting down remaining actors");
            let _ = tokio::time::timeout(Duration::from_secs(1), feed_handle.shutdown()).await;
            for handle in &agg_handles {
                let _ = tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await;
            }
            ret = task_ret;
        }
    }
    ret
}

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

use super::*;
use crate::ris_live::{sample_message, SAMPLE_UPDATE};
use std::io::Cursor;
use tracing_test::traced_test;

fn create_stats() -> FeedStats {
    let meter = opentelemetry::global::meter("test");
    FeedStats::new(meter)
}

fn ris_line(secs: i64, origin_asn: u32) -> String {
    let envelope = serde_json::json!({
        "type": "ris_message",
        "data": sample_message(secs, origin_asn),
    });
    envelope.to_string()
}

fn shards(
    count: usize,
) -> (
    Vec<async_channel::Sender<BgpMessage>>,
    Vec<async_channel::Receiver<BgpMessage>>,
) {
    (0..count).map(|_| async_channel::unbounded()).unzip()
}

fn drain(rx: &async_channel::Receiver<BgpMessage>) -> Vec<BgpMessage> {
    let mut messages = vec![];
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
#[traced_test]
async fn test_feed_routes_until_end_of_input() {
    let input = [
        ris_line(0, 64511),
        String::new(),
        "{not json".to_string(),
        r#"{"type":"pong","data":null}"#.to_string(),
        r#"{"type":"ris_error","data":{"message":"Invalid subscription"}}"#.to_string(),
        ris_line(60, 64512),
        ris_line(61, 64511),
    ]
    .join("\n");
    let (cmd_tx, cmd_rx) = mpsc::channel(1);
    let (senders, receivers) = shards(3);
    let actor = FeedActor::new(
        cmd_rx,
        Cursor::new(input),
        FilterKey::OriginAsn,
        vec![RisMessageType::Update],
        senders,
        create_stats(),
    );

    let result = tokio::spawn(actor.run()).await.unwrap();
    assert_eq!(result.unwrap(), "RIS Live feed reached end of input");
    assert!(logs_contain("Skipping undecodable RIS Live message"));
    assert!(logs_contain("RIS Live reported an error: Invalid subscription"));

    // Every shard saw its senders dropped with the actor
    assert!(receivers.iter().all(|rx| rx.is_closed()));

    let mut routed: Vec<(usize, String, i64)> = receivers
        .iter()
        .enumerate()
        .flat_map(|(shard_id, rx)| {
            drain(rx).into_iter().map(move |message| {
                (shard_id, message.filter, message.record.timestamp.timestamp())
            })
        })
        .collect();
    routed.sort_by_key(|(_, _, secs)| *secs);
    assert_eq!(routed.len(), 3);
    for (shard_id, filter, _) in &routed {
        assert_eq!(*shard_id, shard_for(filter, 3));
    }
    let filters: Vec<&str> = routed.iter().map(|(_, filter, _)| filter.as_str()).collect();
    assert_eq!(filters, vec!["64511", "64512", "64511"]);
    drop(cmd_tx);
}

#[tokio::test]
async fn test_feed_prefix_filter_fans_out() {
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (senders, receivers) = shards(1);
    let actor = FeedActor::new(
        cmd_rx,
        Cursor::new(SAMPLE_UPDATE.to_string()),
        FilterKey::Prefix,
        vec![RisMessageType::Update],
        senders,
        create_stats(),
    );
    let result = tokio::spawn(actor.run()).await.unwrap();
    assert!(result.is_ok());

    let messages = drain(&receivers[0]);
    let filters: Vec<&str> = messages.iter().map(|m| m.filter.as_str()).collect();
    assert_eq!(
        filters,
        vec!["198.51.100.0/24", "2001:db8::/32", "203.0.113.0/24"]
    );
    // The same decoded message is shared by all its windows
    assert!(Arc::ptr_eq(&messages[0].record, &messages[2].record));
}

#[tokio::test]
async fn test_feed_skips_unselected_types() {
    let mut keepalive = sample_message(0, 64511);
    keepalive.kind = RisMessageType::Keepalive;
    let input = serde_json::json!({"type": "ris_message", "data": keepalive}).to_string();

    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (senders, receivers) = shards(2);
    let actor = FeedActor::new(
        cmd_rx,
        Cursor::new(input),
        FilterKey::Peer,
        vec![RisMessageType::Update],
        senders,
        create_stats(),
    );
    let result = tokio::spawn(actor.run()).await.unwrap();
    assert!(result.is_ok());
    assert!(receivers.iter().all(|rx| rx.is_empty()));
}

#[tokio::test]
#[traced_test]
async fn test_feed_stops_when_shard_is_gone() {
    let input = [ris_line(0, 64511), ris_line(60, 64511)].join("\n");
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (senders, receivers) = shards(1);
    drop(receivers);
    let actor = FeedActor::new(
        cmd_rx,
        Cursor::new(input),
        FilterKey::OriginAsn,
        vec![RisMessageType::Update],
        senders,
        create_stats(),
    );
    let result = tokio::spawn(actor.run()).await.unwrap();
    let err = result.unwrap_err();
    assert_eq!(
        err.to_string(),
        "error in send channel of aggregation shard 0"
    );
    assert!(logs_contain("Failed to send BGP message to aggregation shard 0"));
}

#[tokio::test]
#[traced_test]
async fn test_shutdown_command() {
    // A duplex stream that never yields a line keeps the feed waiting
    let (reader, _writer) = tokio::io::duplex(64);
    let (senders, receivers) = shards(1);
    let (join_handle, handle) = FeedActorHandle::new(
        BufReader::new(reader),
        FilterKey::OriginAsn,
        vec![RisMessageType::Update],
        senders,
        Either::Right(create_stats()),
    );
    handle.shutdown().await.unwrap();
    let result = join_handle.await.unwrap();
    assert_eq!(result.unwrap(), "RIS Live feed shutdown successfully");
    assert!(logs_contain("Shutting down RIS Live feed actor"));
    assert!(receivers[0].is_closed());
}

#[tokio::test]
#[traced_test]
async fn test_feed_skips_invalid_utf8_line() {
    let mut input = Vec::new();
    input.extend_from_slice(ris_line(0, 64511).as_bytes());
    input.extend_from_slice(b"\n{\"x\":\"\xff\xfe\"}\n");
    input.extend_from_slice(ris_line(60, 64511).as_bytes());
    input.extend_from_slice(b"\r\n");
    input.extend_from_slice(ris_line(120, 64511).as_bytes());
    input.push(b'\n');

    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let (senders, receivers) = shards(1);
    let actor = FeedActor::new(
        cmd_rx,
        Cursor::new(input),
        FilterKey::OriginAsn,
        vec![RisMessageType::Update],
        senders,
        create_stats(),
    );
    let result = tokio::spawn(actor.run()).await.unwrap();
    assert_eq!(result.unwrap(), "RIS Live feed reached end of input");
    assert!(logs_contain("Skipping RIS Live line that is not valid UTF-8"));

    let timestamps: Vec<i64> = drain(&receivers[0])
        .into_iter()
        .map(|message| message.record.timestamp.timestamp())
        .collect();
    assert_eq!(timestamps, vec![0, 60, 120]);
}

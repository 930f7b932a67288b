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

//! Decoding of RIPE RIS Live JSON messages.
//!
//! Every message on the feed is an envelope `{"type": ..., "data": ...}`. Only
//! `ris_message` envelopes carry BGP data; the rest are control messages of
//! the feed itself.

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use netgauze_analytics::aggregation::TimeSeriesData;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst, TimestampSecondsWithFrac};
use std::net::IpAddr;
use strum_macros::Display;

#[derive(Debug, thiserror::Error)]
pub enum RisLiveDecodeError {
    #[error("invalid RIS Live JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RIS Live `{0}` message without data")]
    MissingData(String),
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RisMessageType {
    Update,
    Open,
    Notification,
    Keepalive,
    RisPeerState,
    #[serde(other)]
    Other,
}

/// An element of the AS path, either a single AS or an AS_SET
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Asn(u32),
    Set(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub next_hop: String,
    pub prefixes: Vec<IpNet>,
}

/// BGP data observed by a RIS route collector from one of its peers
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RisMessage {
    #[serde_as(as = "TimestampSecondsWithFrac<f64>")]
    pub timestamp: DateTime<Utc>,
    pub peer: IpAddr,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub peer_asn: u32,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(rename = "type")]
    pub kind: RisMessageType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub community: Vec<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub announcements: Vec<Announcement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub withdrawals: Vec<IpNet>,
    /// Peer session state, only for `RIS_PEER_STATE` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl RisMessage {
    /// The AS originating the announced prefixes. `None` when there's no path
    /// or when the path ends with an AS_SET.
    pub fn origin_asn(&self) -> Option<u32> {
        match self.path.last() {
            Some(PathSegment::Asn(asn)) => Some(*asn),
            Some(PathSegment::Set(_)) | None => None,
        }
    }

    pub fn announced_prefixes(&self) -> impl Iterator<Item = &IpNet> {
        self.announcements
            .iter()
            .flat_map(|announcement| announcement.prefixes.iter())
    }

    pub fn announced_prefix_count(&self) -> usize {
        self.announcements
            .iter()
            .map(|announcement| announcement.prefixes.len())
            .sum()
    }
}

impl TimeSeriesData for RisMessage {
    fn get_ts(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RisLiveMessage {
    RisMessage(RisMessage),
    RisError { message: String },
    SubscribeOk,
    Pong,
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RisErrorData {
    message: String,
}

/// Decode a single RIS Live JSON message
pub fn decode(input: &str) -> Result<RisLiveMessage, RisLiveDecodeError> {
    let envelope: Envelope = serde_json::from_str(input)?;
    match envelope.kind.as_str() {
        "ris_message" => {
            let data = envelope
                .data
                .ok_or_else(|| RisLiveDecodeError::MissingData(envelope.kind.clone()))?;
            Ok(RisLiveMessage::RisMessage(serde_json::from_value(data)?))
        }
        "ris_error" => {
            let data = envelope
                .data
                .ok_or_else(|| RisLiveDecodeError::MissingData(envelope.kind.clone()))?;
            let error: RisErrorData = serde_json::from_value(data)?;
            Ok(RisLiveMessage::RisError {
                message: error.message,
            })
        }
        "ris_subscribe_ok" => Ok(RisLiveMessage::SubscribeOk),
        "pong" => Ok(RisLiveMessage::Pong),
        _ => Ok(RisLiveMessage::Unknown(envelope.kind)),
    }
}

/// A `ris_message` UPDATE as found on the feed
#[cfg(test)]
pub(crate) const SAMPLE_UPDATE: &str = r#"{"type":"ris_message","data":{"timestamp":1700000000.25,"peer":"192.0.2.1","peer_asn":"64496","id":"00-192-0-2-1-1","host":"rrc00.ripe.net","type":"UPDATE","path":[64496,64500,64511],"community":[[64496,100]],"origin":"IGP","announcements":[{"next_hop":"192.0.2.1","prefixes":["198.51.100.0/24","203.0.113.0/24"]}],"withdrawals":["2001:db8::/32"]}}"#;

/// An UPDATE from `rrc00` announcing a single prefix originated by
/// `origin_asn`
#[cfg(test)]
pub(crate) fn sample_message(secs: i64, origin_asn: u32) -> RisMessage {
    use chrono::TimeZone;
    RisMessage {
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        peer: IpAddr::from([192, 0, 2, 1]),
        peer_asn: 64496,
        id: format!("{secs}-{origin_asn}"),
        host: "rrc00".to_string(),
        kind: RisMessageType::Update,
        path: vec![PathSegment::Asn(64496), PathSegment::Asn(origin_asn)],
        community: vec![],
        origin: Some("IGP".to_string()),
        announcements: vec![Announcement {
            next_hop: "192.0.2.1".to_string(),
            prefixes: vec!["198.51.100.0/24".parse().unwrap()],
        }],
        withdrawals: vec![],
        state: None,
    }
}

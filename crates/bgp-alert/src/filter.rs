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

use crate::ris_live::RisMessage;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Attribute of a [RisMessage] that partitions the feed into windows.
#[derive(Display, Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterKey {
    /// IP address of the BGP peer the collector heard the message from
    Peer,
    PeerAsn,
    /// Last AS in the path, messages ending with an AS_SET are not assigned
    #[default]
    OriginAsn,
    /// RIS route collector
    Host,
    /// Each announced or withdrawn prefix
    Prefix,
}

impl FilterKey {
    /// Filter values `message` belongs to. A message may land in zero, one or
    /// several windows.
    pub fn filters(&self, message: &RisMessage) -> Vec<String> {
        match self {
            Self::Peer => vec![message.peer.to_string()],
            Self::PeerAsn => vec![message.peer_asn.to_string()],
            Self::OriginAsn => message
                .origin_asn()
                .map(|asn| vec![asn.to_string()])
                .unwrap_or_default(),
            Self::Host => vec![message.host.clone()],
            Self::Prefix => {
                let mut prefixes: Vec<String> = message
                    .announced_prefixes()
                    .chain(message.withdrawals.iter())
                    .map(ToString::to_string)
                    .collect();
                prefixes.sort_unstable();
                prefixes.dedup();
                prefixes
            }
        }
    }
}

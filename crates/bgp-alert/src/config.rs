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

use crate::{
    aggregation::{AggregationActorError, AggregationConfig},
    ris_live::RisMessageType,
};
use std::path::PathBuf;

pub(crate) const fn default_buffer_size() -> usize {
    1_000
}

fn default_input_path() -> PathBuf {
    PathBuf::from("-")
}

fn default_message_types() -> Vec<RisMessageType> {
    vec![RisMessageType::Update]
}

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct BgpAlertConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl BgpAlertConfig {
    pub fn validate(&self) -> Result<(), AggregationActorError> {
        if self.input.buffer_size == 0 {
            return Err(AggregationActorError::ConfigurationError {
                reason: "input buffer_size must be greater than 0".to_string(),
            });
        }
        self.aggregation.validate()
    }
}

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputConfig {
    /// File of newline delimited RIS Live JSON messages, `-` reads stdin
    #[serde(default = "default_input_path")]
    pub path: PathBuf,

    /// Capacity of the channel feeding each aggregation shard
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// RIS message types fed into the windows, everything else is counted and
    /// skipped
    #[serde(default = "default_message_types")]
    pub message_types: Vec<RisMessageType>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: default_input_path(),
            buffer_size: default_buffer_size(),
            message_types: default_message_types(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisConfig {
    #[default]
    Log,
    JsonLines {
        /// Defaults to stdout
        #[serde(default, skip_serializing_if = "::std::option::Option::is_none")]
        path: Option<PathBuf>,
    },
}

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

//! Analysis sinks receiving every completed window.

use crate::{config::AnalysisConfig, BgpRecord};
use chrono::{DateTime, Utc};
use netgauze_analytics::aggregation::{AnalysisSink, WindowConfig, WindowSnapshot};
use serde::{Deserialize, Serialize};
use std::{fs::OpenOptions, io::Write};
use tracing::{error, info};

/// Per bucket summary of a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketReport {
    pub start: DateTime<Utc>,
    pub updates: usize,
    pub announced_prefixes: usize,
    pub withdrawn_prefixes: usize,
}

/// Summary of a completed window, one per line in the JSON lines output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReport {
    pub filter: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub bucket_duration_secs: u64,
    pub window_size_buckets: usize,
    pub buckets: Vec<BucketReport>,
}

impl WindowReport {
    pub fn new(window: &WindowSnapshot<BgpRecord>, config: &WindowConfig) -> Self {
        let buckets = window
            .buckets()
            .iter()
            .map(|(start, records)| BucketReport {
                start: *start,
                updates: records.len(),
                announced_prefixes: records
                    .iter()
                    .map(|record| record.announced_prefix_count())
                    .sum(),
                withdrawn_prefixes: records.iter().map(|record| record.withdrawals.len()).sum(),
            })
            .collect();
        Self {
            filter: window.filter().to_string(),
            start: window.start(),
            end: window.end(),
            bucket_duration_secs: config.bucket_duration().as_secs(),
            window_size_buckets: config.window_size_buckets(),
            buckets,
        }
    }

    pub fn total_updates(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.updates).sum()
    }
}

/// Logs a one line summary of every window
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AnalysisSink<BgpRecord> for LogSink {
    fn analyze(&mut self, window: WindowSnapshot<BgpRecord>, _config: &WindowConfig) {
        let counts: Vec<usize> = window.counts().map(|(_, count)| count).collect();
        info!(
            filter = window.filter(),
            start = ?window.start(),
            end = ?window.end(),
            total = window.total_records(),
            ?counts,
            "Window complete"
        );
    }
}

/// Writes a [WindowReport] per window as a JSON line
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// The whole line goes out in a single write, so shards appending to the
    /// same output never interleave partial reports.
    fn write_report(&mut self, report: &WindowReport) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()
    }
}

impl<W: Write> AnalysisSink<BgpRecord> for JsonLinesSink<W> {
    fn analyze(&mut self, window: WindowSnapshot<BgpRecord>, config: &WindowConfig) {
        let report = WindowReport::new(&window, config);
        if let Err(err) = self.write_report(&report) {
            error!(
                "Failed to write report for window of filter {}: {err}",
                report.filter
            );
        }
    }
}

/// Build the sink configured for a shard. Each shard gets its own sink; with
/// a file output, all of them append to the same unbuffered file handle
/// opened in append mode.
pub fn build_sink(
    config: &AnalysisConfig,
) -> std::io::Result<Box<dyn AnalysisSink<BgpRecord> + Send>> {
    match config {
        AnalysisConfig::Log => Ok(Box::new(LogSink)),
        AnalysisConfig::JsonLines { path: None } => {
            Ok(Box::new(JsonLinesSink::new(std::io::stdout())))
        }
        AnalysisConfig::JsonLines { path: Some(path) } => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Box::new(JsonLinesSink::new(file)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ris_live::sample_message;
    use chrono::TimeZone;
    use netgauze_analytics::aggregation::Buckets;
    use std::{num::NonZeroUsize, sync::Arc};
    use tracing_test::traced_test;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn snapshot() -> WindowSnapshot<BgpRecord> {
        let mut withdrawing = sample_message(70, 64511);
        withdrawing.announcements.clear();
        withdrawing.withdrawals = vec!["203.0.113.0/24".parse().unwrap()];

        let mut buckets = Buckets::new();
        buckets.insert(
            ts(0),
            vec![
                Arc::new(sample_message(1, 64511)),
                Arc::new(sample_message(2, 64511)),
            ],
        );
        buckets.insert(ts(60), vec![Arc::new(withdrawing)]);
        buckets.insert(ts(120), vec![]);
        WindowSnapshot::new("64511", buckets)
    }

    fn config() -> WindowConfig {
        WindowConfig::new(NonZeroUsize::new(3).unwrap())
    }

    #[test]
    fn test_window_report() {
        let report = WindowReport::new(&snapshot(), &config());
        assert_eq!(report.filter, "64511");
        assert_eq!(report.start, Some(ts(0)));
        assert_eq!(report.end, Some(ts(180)));
        assert_eq!(report.bucket_duration_secs, 60);
        assert_eq!(report.window_size_buckets, 3);
        assert_eq!(report.total_updates(), 3);
        assert_eq!(
            report.buckets,
            vec![
                BucketReport {
                    start: ts(0),
                    updates: 2,
                    announced_prefixes: 2,
                    withdrawn_prefixes: 0,
                },
                BucketReport {
                    start: ts(60),
                    updates: 1,
                    announced_prefixes: 0,
                    withdrawn_prefixes: 1,
                },
                BucketReport {
                    start: ts(120),
                    updates: 0,
                    announced_prefixes: 0,
                    withdrawn_prefixes: 0,
                },
            ]
        );
    }

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.analyze(snapshot(), &config());
        sink.analyze(snapshot(), &config());
        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let report: WindowReport = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(report, WindowReport::new(&snapshot(), &config()));
    }

    #[test]
    #[traced_test]
    fn test_log_sink() {
        LogSink.analyze(snapshot(), &config());
        assert!(logs_contain("Window complete"));
        assert!(logs_contain("filter=\"64511\""));
        assert!(logs_contain("counts=[2, 1, 0]"));
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink = build_sink(&AnalysisConfig::Log).unwrap();
        sink.analyze(snapshot(), &config());
    }

    #[test]
    fn test_shards_appending_to_same_file_keep_whole_lines() {
        const SHARDS: usize = 4;
        const REPORTS_PER_SHARD: usize = 20;
        const BUCKETS: i64 = 400;

        let path = std::env::temp_dir().join(format!(
            "netgauze-bgp-alert-{}-shared-sink.ndjson",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        // Each report is well beyond a single pipe or stdio buffer
        let mut buckets = Buckets::new();
        for minute in 0..BUCKETS {
            buckets.insert(
                ts(minute * 60),
                vec![Arc::new(sample_message(minute * 60, 64511))],
            );
        }
        let window = WindowSnapshot::new("64511", buckets);
        let window_config = WindowConfig::new(NonZeroUsize::new(BUCKETS as usize).unwrap());
        let config = AnalysisConfig::JsonLines {
            path: Some(path.clone()),
        };

        std::thread::scope(|scope| {
            for _ in 0..SHARDS {
                let mut sink = build_sink(&config).unwrap();
                let window = window.clone();
                scope.spawn(move || {
                    for _ in 0..REPORTS_PER_SHARD {
                        sink.analyze(window.clone(), &window_config);
                    }
                });
            }
        });

        let output = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let reports: Vec<WindowReport> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(reports.len(), SHARDS * REPORTS_PER_SHARD);
        for report in &reports {
            assert_eq!(report.buckets.len(), BUCKETS as usize);
            assert_eq!(report.total_updates(), BUCKETS as usize);
        }
    }
}

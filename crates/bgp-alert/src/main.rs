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

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use netgauze_bgp_alert::{config::BgpAlertConfig, init_bgp_alert};
use std::{env, path::PathBuf, str::FromStr};
use tracing::{error, info, Level};

fn init_tracing(level: &'_ str) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let level = Level::from_str(level).map_err(|err| format!("invalid logging level: {err}"))?;
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        // Window reports may go to stdout
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        return Err(format!("Usage: {} <config-file>", args[0]).into());
    }
    let config_file = PathBuf::from(&args[1]);
    let config: BgpAlertConfig = match Figment::new()
        .merge(Yaml::file(config_file))
        .merge(Env::prefixed("NG_").split("__"))
        .extract()
    {
        Ok(config) => config,
        Err(err) => {
            return Err(format!("Parsing config file failed: {err}").into());
        }
    };
    init_tracing(&config.logging.level)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    // If num threads is not configured then the default use all CPU cores is used
    if let Some(num_threads) = config.runtime.threads {
        runtime_builder.worker_threads(num_threads);
    }
    runtime_builder.enable_all();
    let runtime = runtime_builder.build()?;
    runtime.block_on(async move {
        let meter = opentelemetry::global::meter("netgauze-bgp-alert");
        let alert_handle = init_bgp_alert(config, meter);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Termination signal received, gracefully shutting down actors");
            }
            alert_ret = alert_handle => {
                if let Err(err) = alert_ret {
                    error!("BGP alert terminated with error: {err:#}");
                    return Err(err.into());
                }
                info!("RIS Live feed is exhausted, shutting down");
            }
        }
        Ok::<(), Box<dyn std::error::Error + Send + Sync + 'static>>(())
    })
}

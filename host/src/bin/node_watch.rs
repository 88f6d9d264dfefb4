// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, anyhow};
use clap::{Parser, ValueEnum};
use etb_core::{EtbConfig, config::FilesConfig};
use etb_host::{
    Interval, RetryPolicy, SlotClock, TestnetMonitor,
    checkpoint::wait_for_etb_config,
    logging::{self, LogLevel},
    metrics::{MetricAction, PeersAction, checkpoints_metric, heads_metric, testnet_info},
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MetricKind {
    Heads,
    Checkpoints,
    Peers,
}

fn parse_monitor(raw: &str) -> Result<(MetricKind, Interval), String> {
    let (metric, interval) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected metric:interval, got `{raw}`"))?;
    let metric = <MetricKind as ValueEnum>::from_str(metric, true)?;
    let interval = interval.parse().map_err(|e| format!("{e}"))?;
    Ok((metric, interval))
}

/// Watches the clients of a running testnet and reports forks.
#[derive(Parser, Debug)]
struct Args {
    /// `metric:interval` with metric one of heads, checkpoints, peers and interval one of
    /// slot, epoch, once
    #[arg(long = "monitor", value_parser = parse_monitor)]
    monitors: Vec<(MetricKind, Interval)>,

    /// Attempts per request
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Per request timeout in seconds
    #[arg(long, default_value_t = 1)]
    request_timeout: u64,

    /// Seconds to wait before monitoring starts
    #[arg(long, default_value_t = 10)]
    delay: u64,

    /// Rounds a metric is repeated until all clients agree
    #[arg(long, default_value_t = 3)]
    max_retries_for_consensus: u32,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Write the log to node_watch.log instead of stderr
    #[arg(long)]
    log_to_file: bool,

    /// Local etb-config; in-container runs wait for the published snapshot instead
    #[arg(long, hide = true)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.log_to_file {
        let path = match args.config {
            Some(_) => PathBuf::from("node_watch.log"),
            None => PathBuf::from("/data/node_watch.log"),
        };
        logging::init_to_file(args.log_level, &path).map_err(|e| anyhow!(e))?;
    } else {
        logging::init(args.log_level).map_err(|e| anyhow!(e))?;
    }

    let config = match &args.config {
        Some(path) => EtbConfig::load(path)
            .with_context(|| format!("failed to load etb-config {}", path.display()))?,
        None => wait_for_etb_config(&FilesConfig::default())
            .await
            .context("failed to load published etb-config")?,
    };
    tokio::time::sleep(Duration::from_secs(args.delay)).await;
    info!("{}", testnet_info(&config).context("node-watch")?);

    let policy = RetryPolicy::new(args.max_retries, Duration::from_secs(args.request_timeout));
    let http = reqwest::Client::new();
    let instances = config.client_instances().to_vec();
    let mut monitor = TestnetMonitor::new(SlotClock::from_config(&config)?);
    for (metric, interval) in &args.monitors {
        let name = format!("{metric:?}:{interval}").to_lowercase();
        match metric {
            MetricKind::Heads => monitor.add_action(
                name,
                *interval,
                MetricAction::new(
                    heads_metric(policy, args.max_retries_for_consensus),
                    http.clone(),
                    instances.clone(),
                    true,
                ),
            ),
            MetricKind::Checkpoints => monitor.add_action(
                name,
                *interval,
                MetricAction::new(
                    checkpoints_metric(policy, args.max_retries_for_consensus),
                    http.clone(),
                    instances.clone(),
                    false,
                ),
            ),
            MetricKind::Peers => monitor.add_action(
                name,
                *interval,
                PeersAction::new(http.clone(), instances.clone(), policy),
            ),
        }
    }
    if args.monitors.is_empty() {
        info!("no monitors requested");
        return Ok(());
    }
    monitor.run().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monitors() {
        let args = Args::try_parse_from([
            "node_watch",
            "--monitor",
            "heads:slot",
            "--monitor",
            "checkpoints:epoch",
            "--monitor",
            "peers:once",
        ])
        .unwrap();
        assert_eq!(
            args.monitors,
            [
                (MetricKind::Heads, Interval::EverySlot),
                (MetricKind::Checkpoints, Interval::EveryEpoch),
                (MetricKind::Peers, Interval::Once),
            ]
        );
        assert_eq!(args.max_retries, 3);
        assert_eq!(args.request_timeout, 1);
        assert_eq!(args.delay, 10);
        assert_eq!(args.max_retries_for_consensus, 3);
    }

    #[test]
    fn rejects_bad_monitors() {
        assert!(parse_monitor("heads").is_err());
        assert!(parse_monitor("blocks:slot").is_err());
        assert!(parse_monitor("heads:hourly").is_err());
    }
}

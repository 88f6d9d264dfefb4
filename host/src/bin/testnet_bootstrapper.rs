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

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use clap::{ArgGroup, Parser};
use etb_core::EtbConfig;
use etb_host::{Bootstrapper, clean, logging::LogLevel};
use rand::{SeedableRng, rngs::StdRng};
use tracing::info;

/// Snapshot written by `--init-testnet`, as seen from inside the bootstrapper container.
const BOOTSTRAP_CONFIG: &str = "source/data/etb-config.yaml";

/// Sets up an ethereum testnet and bootstraps it once its containers are running.
#[derive(Parser, Debug)]
#[command(group(
    ArgGroup::new("verb")
        .required(true)
        .args(["clean", "init_testnet", "bootstrap_testnet"])
))]
struct Args {
    /// etb-config to initialize the testnet from
    #[arg(long)]
    config: Option<PathBuf>,

    /// Remove every artifact of a previous testnet
    #[arg(long)]
    clean: bool,

    /// Create keys, secrets, the config snapshot and the docker-compose manifest
    #[arg(long)]
    init_testnet: bool,

    /// Run the bootstrap state machine against the running containers
    #[arg(long)]
    bootstrap_testnet: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Debug)]
    log_level: LogLevel,
}

/// Paths given on the command line are relative to the repository mounted at `source/`.
fn source_path(path: &Path) -> PathBuf {
    if path.starts_with("source") {
        path.to_path_buf()
    } else {
        Path::new("source").join(path)
    }
}

fn load(path: &Path) -> anyhow::Result<EtbConfig> {
    EtbConfig::load(path).with_context(|| format!("failed to load etb-config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    etb_host::logging::init(args.log_level).map_err(|e| anyhow!(e))?;

    if args.bootstrap_testnet {
        let mut config = load(Path::new(BOOTSTRAP_CONFIG))?;
        Bootstrapper::new(StdRng::from_os_rng())
            .bootstrap(&mut config)
            .await
            .context("bootstrapper")?;
        return Ok(());
    }

    let path = source_path(&args.config.context("--config is required")?);
    let config = load(&path)?;
    if args.clean {
        clean(&config.files).context("clean")?;
    }
    if args.init_testnet {
        Bootstrapper::new(StdRng::from_os_rng())
            .init(&config)
            .context("init-testnet")?;
        info!(config = %path.display(), "testnet initialized");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_source() {
        assert_eq!(
            source_path(Path::new("configs/minimal/capella.yaml")),
            Path::new("source/configs/minimal/capella.yaml")
        );
        assert_eq!(
            source_path(Path::new("source/configs/minimal/capella.yaml")),
            Path::new("source/configs/minimal/capella.yaml")
        );
    }

    #[test]
    fn exactly_one_verb() {
        assert!(Args::try_parse_from(["testnet_bootstrapper", "--config", "c.yaml"]).is_err());
        assert!(
            Args::try_parse_from(["testnet_bootstrapper", "--clean", "--init-testnet"]).is_err()
        );
        let args = Args::try_parse_from([
            "testnet_bootstrapper",
            "--config",
            "c.yaml",
            "--init-testnet",
            "--log-level",
            "warning",
        ])
        .unwrap();
        assert!(args.init_testnet);
        assert_eq!(args.log_level, LogLevel::Warning);
    }
}

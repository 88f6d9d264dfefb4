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

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::Parser;
use etb_core::{EtbConfig, keys::premine_keys};
use etb_host::logging::{self, LogLevel};

/// Prints `address:private_key` of every premined account.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = LogLevel::Warning)]
    log_level: LogLevel,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_level).map_err(|e| anyhow!(e))?;

    let config = EtbConfig::load(&args.config)
        .with_context(|| format!("failed to load etb-config {}", args.config.display()))?;
    for key in premine_keys(&config.testnet_config.execution_layer).context("premine keys")? {
        println!("{}:{}", key.address_hex(), key.private_key_hex());
    }
    Ok(())
}

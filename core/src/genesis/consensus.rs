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

//! The consensus `config.yaml` shared by every consensus client.

use std::fmt::Write;

use chainspec::{FAR_FUTURE_EPOCH, ForkName, TERMINAL_BLOCK_HASH};
use tracing::info;

use crate::{EtbConfig, InvariantError};

pub const PROPOSER_SCORE_BOOST: u64 = 40;

/// Renders `config.yaml`. Requires the genesis time to be set.
///
/// Values are written as plain `KEY: value` lines; prysm does not accept general YAML here.
pub fn consensus_config_yaml(config: &EtbConfig) -> Result<String, InvariantError> {
    let genesis_time = config.genesis_time()?;
    let consensus = &config.testnet_config.consensus_layer;
    let execution = &config.testnet_config.execution_layer;
    let preset = consensus.preset();
    let preset_name = consensus.preset_base.as_str();
    let fork = |name: ForkName| consensus.fork(name);
    info!(preset = preset_name, "writing consensus config.yaml");

    let mut out = String::new();
    let mut line = |key: &str, value: &dyn std::fmt::Display| {
        // writing to a String cannot fail
        let _ = writeln!(out, "{key}: {value}");
    };
    let quoted = |value: &str| format!("'{value}'");

    line("PRESET_BASE", &quoted(preset_name));
    line("CONFIG_NAME", &quoted(&consensus.config_name));

    // genesis
    line(
        "MIN_GENESIS_ACTIVE_VALIDATOR_COUNT",
        &consensus.min_genesis_active_validator_count,
    );
    line("MIN_GENESIS_TIME", &genesis_time);
    line("GENESIS_FORK_VERSION", &fork(ForkName::Phase0).version_hex());
    line("GENESIS_DELAY", &0);

    // forking
    for name in [
        ForkName::Altair,
        ForkName::Bellatrix,
        ForkName::Capella,
        ForkName::Deneb,
    ] {
        let upper = name.as_str().to_uppercase();
        line(&format!("{upper}_FORK_VERSION"), &fork(name).version_hex());
        line(&format!("{upper}_FORK_EPOCH"), &fork(name).epoch);
    }

    line("TERMINAL_TOTAL_DIFFICULTY", &0);
    line("TERMINAL_BLOCK_HASH", &TERMINAL_BLOCK_HASH);
    line("TERMINAL_BLOCK_HASH_ACTIVATION_EPOCH", &FAR_FUTURE_EPOCH);

    // time parameters
    line("SECONDS_PER_SLOT", &preset.seconds_per_slot);
    line("SECONDS_PER_ETH1_BLOCK", &preset.seconds_per_eth1_block);
    line(
        "MIN_VALIDATOR_WITHDRAWABILITY_DELAY",
        &consensus.min_validator_withdrawability_delay,
    );
    line("SHARD_COMMITTEE_PERIOD", &consensus.shard_committee_period);
    line("ETH1_FOLLOW_DISTANCE", &preset.eth1_follow_distance);

    // validator cycle
    line("INACTIVITY_SCORE_BIAS", &preset.inactivity_score_bias);
    line(
        "INACTIVITY_SCORE_RECOVERY_RATE",
        &preset.inactivity_score_recovery_rate,
    );
    line("EJECTION_BALANCE", &preset.ejection_balance);
    line("MIN_PER_EPOCH_CHURN_LIMIT", &preset.min_per_epoch_churn_limit);
    line("CHURN_LIMIT_QUOTIENT", &preset.churn_limit_quotient);

    line("PROPOSER_SCORE_BOOST", &PROPOSER_SCORE_BOOST);

    // deposit contract
    line("DEPOSIT_CHAIN_ID", &execution.chain_id);
    line("DEPOSIT_NETWORK_ID", &execution.network_id);
    line(
        "DEPOSIT_CONTRACT_ADDRESS",
        &format!("0x{}", hex::encode(config.testnet_config.deposit_contract_address)),
    );

    // networking
    line("GOSSIP_MAX_SIZE", &preset.gossip_max_size);
    line("MAX_CHUNK_SIZE", &preset.max_chunk_size);
    line("MAX_REQUEST_BLOCKS", &preset.max_request_blocks);
    line(
        "EPOCHS_PER_SUBNET_SUBSCRIPTION",
        &preset.epochs_per_subnet_subscription,
    );
    line("SUBNETS_PER_NODE", &preset.subnets_per_node);
    line("ATTESTATION_SUBNET_COUNT", &preset.attestation_subnet_count);
    line(
        "ATTESTATION_SUBNET_EXTRA_BITS",
        &preset.attestation_subnet_extra_bits,
    );
    line(
        "ATTESTATION_SUBNET_PREFIX_BITS",
        &preset.attestation_subnet_prefix_bits,
    );
    line("TTFB_TIMEOUT", &preset.ttfb_timeout);
    line("RESP_TIMEOUT", &preset.resp_timeout);
    line(
        "ATTESTATION_PROPAGATION_SLOT_RANGE",
        &preset.attestation_propagation_slot_range,
    );
    line(
        "MAXIMUM_GOSSIP_CLOCK_DISPARITY",
        &preset.maximum_gossip_clock_disparity,
    );
    line(
        "MESSAGE_DOMAIN_INVALID_SNAPPY",
        &format!("0x{:08x}", preset.message_domain_invalid_snappy),
    );
    line(
        "MESSAGE_DOMAIN_VALID_SNAPPY",
        &format!("0x{:08x}", preset.message_domain_valid_snappy),
    );
    line(
        "MIN_EPOCHS_FOR_BLOCK_REQUESTS",
        &consensus.min_epochs_for_block_requests,
    );

    if consensus.is_deneb() {
        line("FIELD_ELEMENTS_PER_BLOB", &preset.field_elements_per_blob);
        line("MAX_BLOBS_PER_BLOCK", &preset.max_blobs_per_block);
    }

    Ok(out)
}

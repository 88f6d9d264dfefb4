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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The base preset a testnet extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetBase {
    Minimal,
    Mainnet,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown preset-base `{0}`, expected `minimal` or `mainnet`")]
pub struct UnknownPreset(pub String);

impl PresetBase {
    pub fn preset(&self) -> &'static Preset {
        match self {
            PresetBase::Minimal => &MINIMAL_PRESET,
            PresetBase::Mainnet => &MAINNET_PRESET,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetBase::Minimal => "minimal",
            PresetBase::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for PresetBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetBase {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(PresetBase::Minimal),
            "mainnet" => Ok(PresetBase::Mainnet),
            other => Err(UnknownPreset(other.to_string())),
        }
    }
}

/// Frozen table of the preset constants written into a testnet `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub slots_per_epoch: u64,
    pub epochs_per_eth1_voting_period: u64,
    pub seconds_per_slot: u64,
    pub seconds_per_eth1_block: u64,
    pub min_validator_withdrawability_delay: u64,
    pub shard_committee_period: u64,
    pub eth1_follow_distance: u64,

    // validator cycle
    pub inactivity_score_bias: u64,
    pub inactivity_score_recovery_rate: u64,
    pub ejection_balance: u64,
    pub min_per_epoch_churn_limit: u64,
    pub churn_limit_quotient: u64,
    pub proposer_score_boost: u64,

    // networking
    pub gossip_max_size: u64,
    pub max_request_blocks: u64,
    pub epochs_per_subnet_subscription: u64,
    pub min_epochs_for_block_requests: u64,
    pub max_chunk_size: u64,
    pub ttfb_timeout: u64,
    pub resp_timeout: u64,
    pub attestation_propagation_slot_range: u64,
    pub maximum_gossip_clock_disparity: u64,
    pub message_domain_invalid_snappy: u32,
    pub message_domain_valid_snappy: u32,
    pub subnets_per_node: u64,
    pub attestation_subnet_count: u64,
    pub attestation_subnet_extra_bits: u64,
    pub attestation_subnet_prefix_bits: u64,

    // deneb
    pub field_elements_per_blob: u64,
    pub max_blobs_per_block: u64,
}

pub static MINIMAL_PRESET: Preset = Preset {
    slots_per_epoch: 8,
    epochs_per_eth1_voting_period: 4,
    seconds_per_slot: 6,
    seconds_per_eth1_block: 14,
    min_validator_withdrawability_delay: 256,
    shard_committee_period: 64,
    eth1_follow_distance: 16,
    inactivity_score_bias: 4,
    inactivity_score_recovery_rate: 16,
    ejection_balance: 16_000_000_000,
    min_per_epoch_churn_limit: 4,
    churn_limit_quotient: 32,
    proposer_score_boost: 40,
    gossip_max_size: 10_485_760,
    max_request_blocks: 1024,
    epochs_per_subnet_subscription: 256,
    min_epochs_for_block_requests: 272,
    max_chunk_size: 10_485_760,
    ttfb_timeout: 5,
    resp_timeout: 10,
    attestation_propagation_slot_range: 32,
    maximum_gossip_clock_disparity: 500,
    message_domain_invalid_snappy: 0x0000_0000,
    message_domain_valid_snappy: 0x0100_0000,
    subnets_per_node: 2,
    attestation_subnet_count: 64,
    attestation_subnet_extra_bits: 0,
    attestation_subnet_prefix_bits: 6,
    field_elements_per_blob: 4,
    max_blobs_per_block: 4,
};

pub static MAINNET_PRESET: Preset = Preset {
    slots_per_epoch: 32,
    epochs_per_eth1_voting_period: 64,
    seconds_per_slot: 12,
    seconds_per_eth1_block: 14,
    min_validator_withdrawability_delay: 256,
    shard_committee_period: 256,
    eth1_follow_distance: 2048,
    inactivity_score_bias: 4,
    inactivity_score_recovery_rate: 16,
    ejection_balance: 16_000_000_000,
    min_per_epoch_churn_limit: 4,
    churn_limit_quotient: 65536,
    proposer_score_boost: 40,
    gossip_max_size: 10_485_760,
    max_request_blocks: 1024,
    epochs_per_subnet_subscription: 256,
    min_epochs_for_block_requests: 33024,
    max_chunk_size: 10_485_760,
    ttfb_timeout: 5,
    resp_timeout: 10,
    attestation_propagation_slot_range: 32,
    maximum_gossip_clock_disparity: 500,
    message_domain_invalid_snappy: 0x0000_0000,
    message_domain_valid_snappy: 0x0100_0000,
    subnets_per_node: 2,
    attestation_subnet_count: 64,
    attestation_subnet_extra_bits: 0,
    attestation_subnet_prefix_bits: 6,
    field_elements_per_blob: 4096,
    max_blobs_per_block: 4,
};

impl Preset {
    /// `MIN_VALIDATOR_WITHDRAWABILITY_DELAY + CHURN_LIMIT_QUOTIENT / 2`, the value clients
    /// expect for `MIN_EPOCHS_FOR_BLOCK_REQUESTS`.
    pub fn derived_min_epochs_for_block_requests(&self, withdrawability_delay: u64) -> u64 {
        withdrawability_delay + self.churn_limit_quotient / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_preset_base() {
        assert_eq!("minimal".parse::<PresetBase>(), Ok(PresetBase::Minimal));
        assert_eq!("mainnet".parse::<PresetBase>(), Ok(PresetBase::Mainnet));
        assert!("gnosis".parse::<PresetBase>().is_err());
    }

    #[test]
    fn presets_match_block_request_relation() {
        for preset in [&MINIMAL_PRESET, &MAINNET_PRESET] {
            assert_eq!(
                preset.derived_min_epochs_for_block_requests(
                    preset.min_validator_withdrawability_delay
                ),
                preset.min_epochs_for_block_requests
            );
        }
    }

    #[test]
    fn preset_base_serde() {
        let base: PresetBase = serde_yaml::from_str("mainnet").unwrap();
        assert_eq!(base, PresetBase::Mainnet);
        assert_eq!(base.preset().slots_per_epoch, 32);
    }
}

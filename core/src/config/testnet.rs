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

use std::collections::BTreeMap;

use alloy_primitives::Address;
use chainspec::{ConsensusFork, FAR_FUTURE_EPOCH, ForkName, Preset, PresetBase};
use serde::{Serialize, ser::SerializeMap};
use tracing::warn;

use crate::{ConfigError, InvariantError, lookup::Section};

/// The `testnet-config` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestnetConfig {
    #[serde(serialize_with = "serialize_address")]
    pub deposit_contract_address: Address,
    pub execution_layer: ExecutionLayerConfig,
    pub consensus_layer: ConsensusLayerConfig,
}

fn serialize_address<S: serde::Serializer>(address: &Address, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{}", hex::encode(address)))
}

/// `testnet-config.execution-layer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionLayerConfig {
    pub seconds_per_eth1_block: u64,
    pub chain_id: u64,
    pub network_id: u64,
    pub account_mnemonic: String,
    pub keystore_passphrase: String,
    /// Derivation path to balance in ETH.
    pub premines: BTreeMap<String, u64>,
}

/// `testnet-config.consensus-layer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusLayerConfig {
    pub preset_base: PresetBase,
    pub config_name: String,
    pub min_genesis_active_validator_count: u64,
    pub validator_mnemonic: String,
    pub min_validator_withdrawability_delay: u64,
    pub shard_committee_period: u64,
    pub min_epochs_for_block_requests: u64,
    /// One entry per [ForkName], in canonical order.
    pub forks: [ConsensusFork; 6],
}

impl TestnetConfig {
    pub(crate) fn parse(section: &Section) -> Result<Self, ConfigError> {
        let address = section.string("deposit-contract-address")?;
        let deposit_contract_address = parse_address(&address)?;
        Ok(Self {
            deposit_contract_address,
            execution_layer: ExecutionLayerConfig::parse(&section.child("execution-layer")?)?,
            consensus_layer: ConsensusLayerConfig::parse(&section.child("consensus-layer")?)?,
        })
    }
}

fn parse_address(address: &str) -> Result<Address, ConfigError> {
    let digits = address
        .strip_prefix("0x")
        .ok_or_else(|| ConfigError::InvalidAddress(address.to_string()))?;
    if digits.len() != 40 {
        return Err(ConfigError::InvalidAddress(address.to_string()));
    }
    address
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(address.to_string()))
}

impl ExecutionLayerConfig {
    fn parse(section: &Section) -> Result<Self, ConfigError> {
        let premines = section.child("premines")?;
        let premines = premines
            .entries()
            .map(|(path, _)| -> Result<(String, u64), ConfigError> {
                let balance = premines.u64(&path)?;
                Ok((path, balance))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self {
            seconds_per_eth1_block: section.u64("seconds-per-eth1-block")?,
            chain_id: section.u64("chain-id")?,
            network_id: section.u64("network-id")?,
            account_mnemonic: section.string("account-mnemonic")?,
            keystore_passphrase: section.string("keystore-passphrase")?,
            premines,
        })
    }
}

impl ConsensusLayerConfig {
    fn parse(section: &Section) -> Result<Self, ConfigError> {
        let preset_base: PresetBase = section.string("preset-base")?.parse().map_err(
            |e: chainspec::UnknownPreset| ConfigError::InvalidValue {
                path: section.key_path("preset-base"),
                reason: e.to_string(),
            },
        )?;
        let preset = preset_base.preset();

        let mut forks = Vec::with_capacity(ForkName::ALL.len());
        for name in ForkName::ALL {
            let version_key = format!("{name}-fork-version");
            let epoch_key = format!("{name}-fork-epoch");
            let required = name <= ForkName::Capella;
            let version = match section.optional_u32(&version_key)? {
                Some(version) => version,
                None if required => return Err(ConfigError::MissingKey(section.key_path(&version_key))),
                None => forks
                    .last()
                    .map_or(0, |prev: &ConsensusFork| prev.version.saturating_add(1)),
            };
            let epoch = match section.optional_u64(&epoch_key)? {
                Some(epoch) => epoch,
                None if required => return Err(ConfigError::MissingKey(section.key_path(&epoch_key))),
                None => FAR_FUTURE_EPOCH,
            };
            forks.push(ConsensusFork::new(name, version, epoch));
        }
        let forks: [ConsensusFork; 6] = forks
            .try_into()
            .map_err(|_| ConfigError::InvalidValue {
                path: section.path().to_string(),
                reason: "incomplete fork schedule".into(),
            })?;

        let config = Self {
            preset_base,
            config_name: section.string("config-name")?,
            min_genesis_active_validator_count: section.u64("min-genesis-active-validator-count")?,
            validator_mnemonic: section.string("validator-mnemonic")?,
            min_validator_withdrawability_delay: section
                .optional_u64("min-validator-withdrawability-delay")?
                .unwrap_or(preset.min_validator_withdrawability_delay),
            shard_committee_period: section
                .optional_u64("shard-committee-period")?
                .unwrap_or(preset.shard_committee_period),
            min_epochs_for_block_requests: section
                .optional_u64("min-epochs-for-block-requests")?
                .unwrap_or(preset.min_epochs_for_block_requests),
            forks,
        };
        config.check_fork_schedule()?;
        config.check_block_request_window();
        Ok(config)
    }

    pub fn preset(&self) -> &'static Preset {
        self.preset_base.preset()
    }

    pub fn fork(&self, name: ForkName) -> &ConsensusFork {
        &self.forks[name as usize]
    }

    /// The lowest-ordered fork scheduled at epoch 0.
    pub fn genesis_fork(&self) -> Result<&ConsensusFork, InvariantError> {
        self.forks
            .iter()
            .find(|fork| fork.epoch == 0)
            .ok_or(InvariantError::NoGenesisFork)
    }

    /// The highest-ordered fork scheduled at epoch 0, i.e. the fork in effect at genesis.
    pub fn genesis_state_fork(&self) -> Result<&ConsensusFork, InvariantError> {
        self.forks
            .iter()
            .rev()
            .find(|fork| fork.epoch == 0)
            .ok_or(InvariantError::NoGenesisFork)
    }

    /// Forks activating after genesis.
    pub fn scheduled_forks(&self) -> impl Iterator<Item = &ConsensusFork> {
        self.forks
            .iter()
            .filter(|fork| fork.epoch > 0 && fork.is_scheduled())
    }

    pub fn is_deneb(&self) -> bool {
        self.fork(ForkName::Deneb).is_scheduled()
    }

    fn check_fork_schedule(&self) -> Result<(), InvariantError> {
        self.genesis_fork()?;
        for (prev, next) in self.forks.iter().zip(self.forks.iter().skip(1)) {
            if next.version <= prev.version {
                return Err(InvariantError::ForkVersionOrder {
                    prev: prev.name,
                    prev_version: prev.version,
                    next: next.name,
                    next_version: next.version,
                });
            }
            if next.epoch < prev.epoch {
                return Err(InvariantError::ForkEpochOrder {
                    prev: prev.name,
                    prev_epoch: prev.epoch,
                    next: next.name,
                    next_epoch: next.epoch,
                });
            }
        }
        Ok(())
    }

    fn check_block_request_window(&self) {
        let derived = self
            .preset()
            .derived_min_epochs_for_block_requests(self.min_validator_withdrawability_delay);
        if derived != self.min_epochs_for_block_requests {
            warn!(
                min_epochs_for_block_requests = self.min_epochs_for_block_requests,
                expected = derived,
                "MIN_EPOCHS_FOR_BLOCK_REQUESTS does not match MIN_VALIDATOR_WITHDRAWABILITY_DELAY + CHURN_LIMIT_QUOTIENT / 2"
            );
        }
    }
}

impl Serialize for ConsensusLayerConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("preset-base", self.preset_base.as_str())?;
        map.serialize_entry("config-name", &self.config_name)?;
        map.serialize_entry(
            "min-genesis-active-validator-count",
            &self.min_genesis_active_validator_count,
        )?;
        map.serialize_entry("validator-mnemonic", &self.validator_mnemonic)?;
        map.serialize_entry(
            "min-validator-withdrawability-delay",
            &self.min_validator_withdrawability_delay,
        )?;
        map.serialize_entry("shard-committee-period", &self.shard_committee_period)?;
        map.serialize_entry(
            "min-epochs-for-block-requests",
            &self.min_epochs_for_block_requests,
        )?;
        for fork in &self.forks {
            map.serialize_entry(&format!("{}-fork-version", fork.name), &fork.version_hex())?;
            map.serialize_entry(&format!("{}-fork-epoch", fork.name), &fork.epoch)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_yaml::Value;

    use super::*;

    const CONSENSUS: &str = r#"
preset-base: minimal
config-name: test
min-genesis-active-validator-count: 64
validator-mnemonic: "abandon"
phase0-fork-version: 0x01000666
phase0-fork-epoch: 0
altair-fork-version: 0x02000666
altair-fork-epoch: 0
bellatrix-fork-version: 0x03000666
bellatrix-fork-epoch: 0
capella-fork-version: 0x04000666
capella-fork-epoch: 0
"#;

    fn consensus(extra: &str) -> Result<ConsensusLayerConfig, ConfigError> {
        let value: Value = serde_yaml::from_str(&format!("{CONSENSUS}{extra}")).unwrap();
        ConsensusLayerConfig::parse(&Section::root(&value).unwrap())
    }

    #[test]
    fn optional_forks_default_to_never() {
        let config = consensus("").unwrap();
        let deneb = config.fork(ForkName::Deneb);
        assert_eq!(deneb.version, 0x0400_0667);
        assert!(!deneb.is_scheduled());
        assert!(!config.is_deneb());
        assert_eq!(config.fork(ForkName::Sharding).version, 0x0400_0668);
    }

    #[test]
    fn genesis_forks() {
        let config = consensus("").unwrap();
        assert_eq!(config.genesis_fork().unwrap().name, ForkName::Phase0);
        assert_eq!(config.genesis_state_fork().unwrap().name, ForkName::Capella);
        assert_eq!(config.scheduled_forks().count(), 0);

        let config = consensus("deneb-fork-version: 0x05000666\ndeneb-fork-epoch: 3\n").unwrap();
        assert!(config.is_deneb());
        let scheduled: Vec<_> = config.scheduled_forks().map(|fork| fork.name).collect();
        assert_eq!(scheduled, vec![ForkName::Deneb]);
    }

    #[test]
    fn fork_schedule_must_be_ordered() {
        let value: Value = serde_yaml::from_str(&CONSENSUS.replace(
            "capella-fork-version: 0x04000666",
            "capella-fork-version: 0x02000666",
        ))
        .unwrap();
        let err = ConsensusLayerConfig::parse(&Section::root(&value).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invariant(InvariantError::ForkVersionOrder { next: ForkName::Capella, .. })
        ));

        let value: Value = serde_yaml::from_str(
            &CONSENSUS.replace("altair-fork-epoch: 0", "altair-fork-epoch: 4"),
        )
        .unwrap();
        let err = ConsensusLayerConfig::parse(&Section::root(&value).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invariant(InvariantError::ForkEpochOrder { prev: ForkName::Altair, .. })
        ));
    }

    #[test]
    fn requires_genesis_fork() {
        let doc = CONSENSUS.replace("fork-epoch: 0", "fork-epoch: 1");
        let value: Value = serde_yaml::from_str(&doc).unwrap();
        let err = ConsensusLayerConfig::parse(&Section::root(&value).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Invariant(InvariantError::NoGenesisFork)));
    }

    #[test]
    fn preset_overrides() {
        let config = consensus("shard-committee-period: 4\n").unwrap();
        assert_eq!(config.shard_committee_period, 4);
        assert_eq!(
            config.min_validator_withdrawability_delay,
            config.preset().min_validator_withdrawability_delay
        );
    }

    #[test]
    fn deposit_address_validation() {
        assert!(parse_address("0x8c594691c0e592ffa21f153a16ae41db5befcaaa").is_ok());
        assert!(parse_address("8c594691c0e592ffa21f153a16ae41db5befcaaa").is_err());
        assert!(parse_address("0x8c594691c0e592ffa21f153a16ae41db5befca").is_err());
        assert!(parse_address("0x8c594691c0e592ffa21f153a16ae41db5befcazz").is_err());
    }
}

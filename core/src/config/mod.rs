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

//! The typed etb-config model.
//!
//! A raw YAML document is populated with defaults (see [crate::defaults]), parsed into typed
//! sections, cross-validated and then exposed read-only. The only mutable field is the genesis
//! time, which the bootstrapper records once.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    net::Ipv4Addr,
    path::Path,
    sync::Arc,
};

use chainspec::{ForkName, Preset, Slot};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::{ConfigError, InvariantError, defaults, lookup::Section};

mod clients;
mod docker;
mod files;
mod instances;
mod testnet;

pub use clients::*;
pub use docker::*;
pub use files::*;
pub use instances::*;
pub use testnet::*;

/// Container environment, sorted by variable name.
pub type Env = BTreeMap<String, String>;

/// Validators backed by client instances versus the genesis validator count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidatorAccounting {
    /// Validators owned by all client instances.
    pub total: u64,
    /// `min-genesis-active-validator-count`.
    pub genesis: u64,
    /// Instance validators that are not part of genesis and must be deposited later.
    pub pending_deposits: u64,
    /// Genesis validators no client instance runs.
    pub unbacked_genesis: u64,
}

impl ValidatorAccounting {
    pub fn new(total: u64, genesis: u64) -> Self {
        Self {
            total,
            genesis,
            pending_deposits: total.saturating_sub(genesis),
            unbacked_genesis: genesis.saturating_sub(total),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EtbConfig {
    pub docker: DockerConfig,
    pub testnet_config: TestnetConfig,
    pub execution_configs: BTreeMap<String, Arc<ExecutionConfig>>,
    pub consensus_configs: BTreeMap<String, Arc<ConsensusConfig>>,
    /// In document order.
    pub client_collections: Vec<Arc<ClientCollection>>,
    /// In document order.
    pub generic_collections: Vec<Arc<InstanceCollection>>,
    pub files: FilesConfig,
    pub validators: ValidatorAccounting,
    generic_instances: Vec<GenericInstance>,
    client_instances: Vec<ClientInstance>,
    genesis_time: Option<u64>,
}

impl EtbConfig {
    /// Reads, populates and validates the config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loading etb-config");
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_yaml::from_str(raw)?)
    }

    pub fn from_value(mut doc: Value) -> Result<Self, ConfigError> {
        if !defaults::is_populated(&doc) {
            defaults::populate(&mut doc)?;
        }
        Self::parse(&Section::root(&doc)?)
    }

    fn parse(root: &Section) -> Result<Self, ConfigError> {
        let docker = DockerConfig::parse(&root.child("docker")?)?;
        let testnet_config = TestnetConfig::parse(&root.child("testnet-config")?)?;
        let files = FilesConfig::parse(
            &root.child_or_empty("files")?,
            testnet_config.consensus_layer.is_deneb(),
        )?;

        let execution_configs = root
            .child_or_empty("execution-configs")?
            .children()?
            .into_iter()
            .map(|(name, section)| Ok((name.clone(), Arc::new(ExecutionConfig::parse(&name, &section)?))))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;
        let consensus_configs = root
            .child_or_empty("consensus-configs")?
            .children()?
            .into_iter()
            .map(|(name, section)| Ok((name.clone(), Arc::new(ConsensusConfig::parse(&name, &section)?))))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let mut generic_collections = Vec::new();
        let mut generic_instances = Vec::new();
        for (name, section) in root.child("generic-instances")?.children()? {
            let collection = Arc::new(InstanceCollection::parse(&name, &section)?);
            for ndx in 0..collection.num_nodes {
                generic_instances.push(GenericInstance::new(collection.clone(), ndx)?);
            }
            generic_collections.push(collection);
        }

        let mut client_collections = Vec::new();
        let mut client_instances = Vec::new();
        for (name, section) in root.child("client-instances")?.children()? {
            let collection = Arc::new(ClientCollection::parse(
                &name,
                &section,
                &execution_configs,
                &consensus_configs,
                &files.local_testnet_dir,
            )?);
            for ndx in 0..collection.collection.num_nodes {
                client_instances.push(ClientInstance::new(collection.clone(), ndx)?);
            }
            client_collections.push(collection);
        }

        let genesis_time = root
            .child_or_empty("dynamic-entries")?
            .optional_u64("genesis-time")?;

        let total = client_collections
            .iter()
            .try_fold(0u64, |total, collection| {
                let range = collection.validator_range();
                total.checked_add(range.end - range.start)
            })
            .ok_or_else(|| ConfigError::InvalidValue {
                path: "client-instances".into(),
                reason: "total validator count overflows".into(),
            })?;
        let validators = ValidatorAccounting::new(
            total,
            testnet_config.consensus_layer.min_genesis_active_validator_count,
        );

        let config = Self {
            docker,
            testnet_config,
            execution_configs,
            consensus_configs,
            client_collections,
            generic_collections,
            files,
            validators,
            generic_instances,
            client_instances,
            genesis_time,
        };
        config.check_instance_names()?;
        config.check_ip_addresses()?;
        config.check_validator_ranges()?;
        config.report_validator_shortfall();
        debug!(
            client_instances = config.client_instances.len(),
            generic_instances = config.generic_instances.len(),
            "etb-config is valid"
        );
        Ok(config)
    }

    fn instances(&self) -> impl Iterator<Item = (&str, Ipv4Addr)> {
        self.generic_instances
            .iter()
            .map(|i| (i.name(), i.ip_address()))
            .chain(self.client_instances.iter().map(|i| (i.name(), i.ip_address())))
    }

    fn check_instance_names(&self) -> Result<(), InvariantError> {
        let mut seen = HashSet::new();
        for (name, _) in self.instances() {
            if !seen.insert(name) {
                return Err(InvariantError::DuplicateInstanceName(name.to_string()));
            }
        }
        Ok(())
    }

    fn check_ip_addresses(&self) -> Result<(), ConfigError> {
        let mut seen: HashMap<Ipv4Addr, &str> = HashMap::new();
        for (name, ip) in self.instances() {
            if let Some(first) = seen.insert(ip, name) {
                return Err(ConfigError::DuplicateIpAddress {
                    ip,
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }
            if !self.docker.ip_subnet.contains(&ip) {
                return Err(ConfigError::IpOutsideSubnet {
                    ip,
                    instance: name.to_string(),
                    subnet: self.docker.ip_subnet.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_validator_ranges(&self) -> Result<(), ConfigError> {
        let mut ranges: Vec<_> = self
            .client_collections
            .iter()
            .map(|collection| (collection.name(), collection.validator_range()))
            .filter(|(_, range)| !range.is_empty())
            .collect();
        ranges.sort_by_key(|(_, range)| range.start);
        for pair in ranges.windows(2) {
            let [(first, first_range), (second, second_range)] = pair else {
                continue;
            };
            if second_range.start < first_range.end {
                return Err(ConfigError::OverlappingValidators {
                    first: first.to_string(),
                    first_range: first_range.clone(),
                    second: second.to_string(),
                    second_range: second_range.clone(),
                });
            }
        }
        Ok(())
    }

    fn report_validator_shortfall(&self) {
        let accounting = &self.validators;
        if accounting.pending_deposits > 0 {
            warn!(
                total = accounting.total,
                genesis = accounting.genesis,
                "{} instance validators are not in genesis and must be deposited",
                accounting.pending_deposits
            );
        }
        if accounting.unbacked_genesis > 0 {
            warn!(
                total = accounting.total,
                genesis = accounting.genesis,
                "{} genesis validators are not run by any client instance",
                accounting.unbacked_genesis
            );
        }
    }

    pub fn generic_instances(&self) -> &[GenericInstance] {
        &self.generic_instances
    }

    /// Every client instance, grouped by collection in document order.
    pub fn client_instances(&self) -> &[ClientInstance] {
        &self.client_instances
    }

    pub fn num_client_nodes(&self) -> usize {
        self.client_instances.len()
    }

    pub fn preset(&self) -> &'static Preset {
        self.testnet_config.consensus_layer.preset()
    }

    pub fn genesis_time(&self) -> Result<u64, InvariantError> {
        self.genesis_time.ok_or(InvariantError::GenesisTimeUnset)
    }

    /// Records the genesis time; the only mutation after construction.
    pub fn set_genesis_time(&mut self, genesis_time: u64) {
        info!(genesis_time, "setting genesis time");
        self.genesis_time = Some(genesis_time);
    }

    pub fn epoch_to_slot(&self, epoch: u64) -> Slot {
        epoch * self.preset().slots_per_epoch
    }

    pub fn slot_to_epoch(&self, slot: Slot) -> u64 {
        slot / self.preset().slots_per_epoch
    }

    pub fn slot_to_time(&self, slot: Slot) -> Result<u64, InvariantError> {
        Ok(self.genesis_time()? + slot * self.preset().seconds_per_slot)
    }

    pub fn epoch_to_time(&self, epoch: u64) -> Result<u64, InvariantError> {
        self.slot_to_time(self.epoch_to_slot(epoch))
    }

    /// Seconds between genesis and the activation of `fork`, or `None` if it is never scheduled.
    pub fn consensus_fork_delay_seconds(&self, fork: ForkName) -> Option<u64> {
        let fork = self.testnet_config.consensus_layer.fork(fork);
        fork.is_scheduled()
            .then(|| fork.epoch * self.preset().slots_per_epoch * self.preset().seconds_per_slot)
    }

    fn fork_time(&self, fork: ForkName) -> Result<Option<u64>, InvariantError> {
        let genesis_time = self.genesis_time()?;
        Ok(self
            .consensus_fork_delay_seconds(fork)
            .map(|delay| genesis_time + delay))
    }

    /// Execution-layer timestamp of the capella fork.
    pub fn shanghai_time(&self) -> Result<Option<u64>, InvariantError> {
        self.fork_time(ForkName::Capella)
    }

    /// Execution-layer timestamp of the deneb fork.
    pub fn cancun_time(&self) -> Result<Option<u64>, InvariantError> {
        self.fork_time(ForkName::Deneb)
    }

    /// The fully resolved document; parsing it again needs no defaults.
    pub fn flatten(&self) -> Result<Value, ConfigError> {
        let mut doc = Mapping::new();
        doc.insert("docker".into(), serde_yaml::to_value(&self.docker)?);
        doc.insert("files".into(), serde_yaml::to_value(&self.files)?);
        doc.insert("testnet-config".into(), serde_yaml::to_value(&self.testnet_config)?);

        let mut execution_configs = Mapping::new();
        for (name, config) in &self.execution_configs {
            execution_configs.insert(name.as_str().into(), serde_yaml::to_value(config.as_ref())?);
        }
        doc.insert("execution-configs".into(), Value::Mapping(execution_configs));

        let mut consensus_configs = Mapping::new();
        for (name, config) in &self.consensus_configs {
            consensus_configs.insert(name.as_str().into(), serde_yaml::to_value(config.as_ref())?);
        }
        doc.insert("consensus-configs".into(), Value::Mapping(consensus_configs));

        let mut client_instances = Mapping::new();
        for collection in &self.client_collections {
            client_instances.insert(
                collection.name().into(),
                serde_yaml::to_value(collection.as_ref())?,
            );
        }
        doc.insert("client-instances".into(), Value::Mapping(client_instances));

        let mut generic_instances = Mapping::new();
        for collection in &self.generic_collections {
            generic_instances.insert(
                collection.name.as_str().into(),
                serde_yaml::to_value(collection.as_ref())?,
            );
        }
        doc.insert("generic-instances".into(), Value::Mapping(generic_instances));

        let mut dynamic_entries = Mapping::new();
        if let Some(genesis_time) = self.genesis_time {
            dynamic_entries.insert("genesis-time".into(), genesis_time.into());
        }
        doc.insert("dynamic-entries".into(), Value::Mapping(dynamic_entries));

        let mut special = Mapping::new();
        special.insert("is-populated".into(), 1.into());
        doc.insert("special".into(), Value::Mapping(special));

        Ok(Value::Mapping(doc))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(&self.flatten()?)?)
    }

    /// Writes the flattened config to `dest`.
    ///
    /// Fails once the etb-config checkpoint exists: other containers may already have read it.
    pub fn write_config(&self, dest: impl AsRef<Path>) -> Result<(), ConfigError> {
        let checkpoint = &self.files.etb_config_checkpoint_file;
        if checkpoint.exists() {
            return Err(ConfigError::CheckpointExists(checkpoint.clone()));
        }
        let dest = dest.as_ref();
        fs::write(dest, self.to_yaml()?).map_err(|source| ConfigError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        info!(path = %dest.display(), "wrote etb-config");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const MINIMAL_CONFIG: &str = r#"
docker:
  network-name: ethereum-testnet
  ip-subnet: 10.0.20.0/24
testnet-config:
  deposit-contract-address: "0x8c594691c0e592ffa21f153a16ae41db5befcaaa"
  execution-layer: {}
  consensus-layer:
    preset-base: minimal
    min-genesis-active-validator-count: 64
    phase0-fork-epoch: 0
    altair-fork-epoch: 0
    bellatrix-fork-epoch: 0
    capella-fork-epoch: 0
consensus-configs:
  lighthouse-consensus-client:
    client: lighthouse
    num-validators: 64
generic-instances:
  ethereum-testnet-bootstrapper:
    image: etb-all-clients
    tag: minimal-current
    start-ip-address: 10.0.20.201
    num-nodes: 1
    entrypoint: /source/entrypoint.sh --bootstrap-testnet
client-instances:
  single:
    start-ip-address: 10.0.20.10
    num-nodes: 1
    validator-offset-start: 0
    execution-config: geth-execution-config
    consensus-config: lighthouse-consensus-client
"#;

    /// Appends a second client collection sharing the lighthouse config.
    fn two_collections(second_ip: &str, second_offset: u64) -> String {
        format!(
            r#"{MINIMAL_CONFIG}  second:
    start-ip-address: {second_ip}
    num-nodes: 1
    validator-offset-start: {second_offset}
    execution-config: besu-execution-config
    consensus-config: lighthouse-consensus-client
"#
        )
    }

    #[test]
    fn parses_minimal_config() {
        let config = EtbConfig::from_yaml_str(MINIMAL_CONFIG).unwrap();
        assert_eq!(config.num_client_nodes(), 1);
        assert_eq!(config.generic_instances().len(), 1);

        let instance = &config.client_instances()[0];
        assert_eq!(instance.name, "single-0");
        assert_eq!(instance.ip_address, Ipv4Addr::new(10, 0, 20, 10));
        assert_eq!(
            instance.node_dir,
            Path::new("/data/local-testnet/single/node_0")
        );
        assert_eq!(instance.el_dir, Path::new("/data/local-testnet/single/node_0/geth"));
        assert_eq!(instance.validator_range(), 0..64);
        assert_eq!(instance.execution_rpc_url(), "http://10.0.20.10:8645");
        assert_eq!(instance.beacon_api_url(), "http://10.0.20.10:5052");

        assert_eq!(config.validators, ValidatorAccounting::new(64, 64));
        assert_eq!(config.testnet_config.execution_layer.chain_id, 1337);
        assert_eq!(config.execution_configs.len(), ExecutionClient::ALL.len());
    }

    #[test]
    fn derived_times() {
        let mut config = EtbConfig::from_yaml_str(MINIMAL_CONFIG).unwrap();
        assert_eq!(config.genesis_time(), Err(InvariantError::GenesisTimeUnset));
        config.set_genesis_time(1_000);

        // minimal preset: 8 slots per epoch, 6 seconds per slot
        assert_eq!(config.epoch_to_slot(3), 24);
        assert_eq!(config.slot_to_epoch(25), 3);
        assert_eq!(config.slot_to_time(10).unwrap(), 1_060);
        assert_eq!(config.consensus_fork_delay_seconds(ForkName::Capella), Some(0));
        assert_eq!(config.consensus_fork_delay_seconds(ForkName::Deneb), None);
        assert_eq!(config.shanghai_time().unwrap(), Some(1_000));
        assert_eq!(config.cancun_time().unwrap(), None);
    }

    #[test]
    fn flatten_round_trips() {
        let mut config = EtbConfig::from_yaml_str(MINIMAL_CONFIG).unwrap();
        config.set_genesis_time(1_700_000_000);
        let yaml = config.to_yaml().unwrap();
        assert!(!yaml.contains('&'), "anchors are not allowed");
        let reparsed = EtbConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(reparsed, config);
        assert_eq!(reparsed.genesis_time().unwrap(), 1_700_000_000);
    }

    #[test]
    fn rejects_duplicate_ip_addresses() {
        let err = EtbConfig::from_yaml_str(&two_collections("10.0.20.10", 64)).unwrap_err();
        assert!(
            matches!(err, ConfigError::DuplicateIpAddress { ip, .. } if ip == Ipv4Addr::new(10, 0, 20, 10)),
            "{err}"
        );
    }

    #[test]
    fn rejects_overlapping_validators() {
        let err = EtbConfig::from_yaml_str(&two_collections("10.0.20.20", 32)).unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingValidators { .. }), "{err}");
    }

    #[test]
    fn records_pending_deposits() {
        let config = EtbConfig::from_yaml_str(&two_collections("10.0.20.20", 64)).unwrap();
        assert_eq!(config.validators.total, 128);
        assert_eq!(config.validators.pending_deposits, 64);
        assert_eq!(config.validators.unbacked_genesis, 0);
    }

    #[test]
    fn rejects_ip_outside_subnet() {
        let doc = MINIMAL_CONFIG.replace("start-ip-address: 10.0.20.10", "start-ip-address: 10.0.21.10");
        let err = EtbConfig::from_yaml_str(&doc).unwrap_err();
        assert!(matches!(err, ConfigError::IpOutsideSubnet { .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_references() {
        let doc = MINIMAL_CONFIG.replace(
            "execution-config: geth-execution-config",
            "execution-config: erigon-execution-config",
        );
        let err = EtbConfig::from_yaml_str(&doc).unwrap_err();
        assert!(
            matches!(&err, ConfigError::UnknownReference { name, .. } if name == "erigon-execution-config"),
            "{err}"
        );
    }

    #[test]
    fn rejects_duplicate_instance_names() {
        let doc = MINIMAL_CONFIG.replace("ethereum-testnet-bootstrapper:", "single:");
        let err = EtbConfig::from_yaml_str(&doc).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invariant(InvariantError::DuplicateInstanceName(ref name)) if name == "single-0"),
            "{err}"
        );
    }

    #[test]
    fn missing_keys_are_named_by_path() {
        let doc = MINIMAL_CONFIG.replace("    num-nodes: 1\n    validator-offset-start: 0\n", "    num-nodes: 1\n");
        let err = EtbConfig::from_yaml_str(&doc).unwrap_err();
        assert!(
            matches!(&err, ConfigError::MissingKey(path) if path == "client-instances.single.validator-offset-start"),
            "{err}"
        );
    }

    #[test]
    fn write_config_refuses_after_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EtbConfig::from_yaml_str(MINIMAL_CONFIG).unwrap();
        config.files.etb_config_checkpoint_file = dir.path().join("etb-config-checkpoint.txt");
        let dest = dir.path().join("etb-config.yaml");

        config.write_config(&dest).unwrap();
        assert!(EtbConfig::load(&dest).is_ok());

        fs::write(&config.files.etb_config_checkpoint_file, "").unwrap();
        let err = config.write_config(&dest).unwrap_err();
        assert!(matches!(err, ConfigError::CheckpointExists(_)));
    }
}

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

use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    net::Ipv4Addr,
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;

use super::{ConsensusClient, ConsensusConfig, Env, ExecutionConfig};
use crate::{ConfigError, lookup::Section};

/// A template for a contiguous range of homogeneous containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceCollection {
    #[serde(skip)]
    pub name: String,
    pub image: String,
    pub tag: String,
    pub start_ip_address: Ipv4Addr,
    pub num_nodes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_env: BTreeMap<String, String>,
}

impl InstanceCollection {
    pub(crate) fn parse(name: &str, section: &Section) -> Result<Self, ConfigError> {
        let start_ip = section.string("start-ip-address")?;
        let start_ip_address = start_ip.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                path: section.key_path("start-ip-address"),
                reason: e.to_string(),
            }
        })?;
        let env = section.child_or_empty("additional-env")?;
        let additional_env = env
            .entries()
            .map(|(key, _)| -> Result<(String, String), ConfigError> {
                let value = env.string(&key)?;
                Ok((key, value))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            name: name.to_string(),
            image: section.string("image")?,
            tag: section.string("tag")?,
            start_ip_address,
            num_nodes: section.u64("num-nodes")?,
            entrypoint: section.optional_string("entrypoint")?,
            additional_env,
        })
    }

    /// `start_ip_address` with `ndx` added to its last octet.
    pub fn ip_address(&self, ndx: u64) -> Result<Ipv4Addr, ConfigError> {
        let [a, b, c, d] = self.start_ip_address.octets();
        u8::try_from(u64::from(d) + ndx)
            .map(|d| Ipv4Addr::new(a, b, c, d))
            .map_err(|_| ConfigError::InvalidValue {
                path: self.name.clone(),
                reason: format!("node {ndx} overflows the last octet of {}", self.start_ip_address),
            })
    }

    /// Additional env with keys uppercased and hyphens turned into underscores.
    pub fn env(&self) -> Env {
        self.additional_env
            .iter()
            .map(|(key, value)| (env_key(key), value.clone()))
            .collect()
    }
}

/// `foo-bar` becomes `FOO_BAR`.
pub fn env_key(key: &str) -> String {
    key.replace('-', "_").to_uppercase()
}

/// A collection of paired execution and consensus clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCollection {
    pub collection: InstanceCollection,
    pub validator_offset_start: u64,
    pub execution_config: Arc<ExecutionConfig>,
    pub consensus_config: Arc<ConsensusConfig>,
    pub collection_dir: PathBuf,
}

impl ClientCollection {
    pub(crate) fn parse(
        name: &str,
        section: &Section,
        execution_configs: &BTreeMap<String, Arc<ExecutionConfig>>,
        consensus_configs: &BTreeMap<String, Arc<ConsensusConfig>>,
        local_testnet_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let resolve = |key: &str, kind: &'static str, known: Vec<&String>| {
            let reference = section.string(key)?;
            if known.contains(&&reference) {
                Ok(reference)
            } else {
                Err(ConfigError::UnknownReference {
                    path: section.key_path(key),
                    kind,
                    name: reference,
                })
            }
        };
        let execution = resolve(
            "execution-config",
            "execution config",
            execution_configs.keys().collect(),
        )?;
        let consensus = resolve(
            "consensus-config",
            "consensus config",
            consensus_configs.keys().collect(),
        )?;

        let collection = InstanceCollection::parse(name, section)?;
        let validator_offset_start = section.u64("validator-offset-start")?;
        let consensus_config = consensus_configs[&consensus].clone();
        // validator_range relies on this end index fitting into a u64
        collection
            .num_nodes
            .checked_mul(consensus_config.num_validators)
            .and_then(|count| validator_offset_start.checked_add(count))
            .ok_or_else(|| ConfigError::InvalidValue {
                path: section.key_path("validator-offset-start"),
                reason: format!(
                    "{} nodes with {} validators each overflow the validator index",
                    collection.num_nodes, consensus_config.num_validators
                ),
            })?;

        Ok(Self {
            collection,
            validator_offset_start,
            execution_config: execution_configs[&execution].clone(),
            consensus_config,
            collection_dir: local_testnet_dir.join(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.collection.name
    }

    /// Validators owned by every node of this collection.
    pub fn validator_range(&self) -> Range<u64> {
        let count = self.collection.num_nodes * self.consensus_config.num_validators;
        self.validator_offset_start..self.validator_offset_start + count
    }

    /// Collection env plus the env exported by both client configs.
    pub fn env(&self) -> Env {
        let mut env = self.collection.env();
        env.extend(self.consensus_config.env());
        env.extend(self.execution_config.env());
        env
    }
}

impl Serialize for ClientCollection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "kebab-case")]
        struct Entry<'a> {
            #[serde(flatten)]
            collection: &'a InstanceCollection,
            validator_offset_start: u64,
            execution_config: &'a str,
            consensus_config: &'a str,
        }
        Entry {
            collection: &self.collection,
            validator_offset_start: self.validator_offset_start,
            execution_config: &self.execution_config.name,
            consensus_config: &self.consensus_config.name,
        }
        .serialize(serializer)
    }
}

/// Behaviour shared by every concrete container of the testnet.
pub trait Instance {
    fn name(&self) -> &str;

    fn ip_address(&self) -> Ipv4Addr;

    fn collection(&self) -> &InstanceCollection;

    /// Environment specific to this instance, before global env is merged in.
    fn env(&self) -> Env {
        let mut env = Env::from([("IP_ADDRESS".to_string(), self.ip_address().to_string())]);
        env.extend(self.collection().env());
        env
    }
}

/// One container of a `generic-instances` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericInstance {
    pub name: String,
    pub ndx: u64,
    pub ip_address: Ipv4Addr,
    pub collection: Arc<InstanceCollection>,
}

impl GenericInstance {
    pub(crate) fn new(collection: Arc<InstanceCollection>, ndx: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            name: format!("{}-{ndx}", collection.name),
            ip_address: collection.ip_address(ndx)?,
            ndx,
            collection,
        })
    }
}

impl Instance for GenericInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn ip_address(&self) -> Ipv4Addr {
        self.ip_address
    }

    fn collection(&self) -> &InstanceCollection {
        &self.collection
    }
}

/// One execution+consensus container of a `client-instances` collection.
///
/// Identity is the instance name, which is unique across the whole testnet.
#[derive(Debug, Clone)]
pub struct ClientInstance {
    pub name: String,
    pub ndx: u64,
    pub ip_address: Ipv4Addr,
    pub collection: Arc<ClientCollection>,
    pub node_dir: PathBuf,
    pub el_dir: PathBuf,
    pub jwt_secret_file: PathBuf,
    /// Prysm only.
    pub wallet_password_path: Option<PathBuf>,
    /// Prysm only.
    pub validator_password: Option<String>,
}

impl ClientInstance {
    pub(crate) fn new(collection: Arc<ClientCollection>, ndx: u64) -> Result<Self, ConfigError> {
        let node_dir = collection.collection_dir.join(format!("node_{ndx}"));
        let el_dir = node_dir.join(collection.execution_config.client.as_str());
        let is_prysm = collection.consensus_config.client == ConsensusClient::Prysm;
        let validator_password = is_prysm.then(|| {
            collection
                .collection
                .additional_env
                .get("validator-password")
                .cloned()
                .unwrap_or_else(|| crate::defaults::DEFAULT_PRYSM_VALIDATOR_PASSWORD.to_string())
        });
        Ok(Self {
            name: format!("{}-{ndx}", collection.name()),
            ip_address: collection.collection.ip_address(ndx)?,
            ndx,
            jwt_secret_file: node_dir.join("jwt_secret"),
            wallet_password_path: is_prysm.then(|| node_dir.join("wallet-password.txt")),
            validator_password,
            el_dir,
            node_dir,
            collection,
        })
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.collection.execution_config
    }

    pub fn consensus_config(&self) -> &ConsensusConfig {
        &self.collection.consensus_config
    }

    pub fn collection_dir(&self) -> &Path {
        &self.collection.collection_dir
    }

    /// `[offset + ndx * n, offset + (ndx + 1) * n)` for `n` validators per node.
    pub fn validator_range(&self) -> Range<u64> {
        let per_node = self.consensus_config().num_validators;
        let start = self.collection.validator_offset_start + self.ndx * per_node;
        start..start + per_node
    }

    pub fn execution_rpc_url(&self) -> String {
        format!("http://{}:{}", self.ip_address, self.execution_config().http_port)
    }

    pub fn execution_ws_url(&self) -> String {
        format!("ws://{}:{}", self.ip_address, self.execution_config().ws_port)
    }

    pub fn beacon_api_url(&self) -> String {
        format!("http://{}:{}", self.ip_address, self.consensus_config().beacon_api_port)
    }
}

impl Instance for ClientInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn ip_address(&self) -> Ipv4Addr {
        self.ip_address
    }

    fn collection(&self) -> &InstanceCollection {
        &self.collection.collection
    }

    fn env(&self) -> Env {
        let mut env = Env::from([("IP_ADDRESS".to_string(), self.ip_address.to_string())]);
        env.extend(self.collection.env());
        env
    }
}

impl PartialEq for ClientInstance {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClientInstance {}

impl Hash for ClientInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ClientInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.ip_address)
    }
}

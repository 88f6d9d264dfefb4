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
    path::{Path, PathBuf},
};

use serde::{Serialize, ser::SerializeMap};

use crate::{ConfigError, lookup::Section};

const TESTNET_ROOT: &str = "testnet-root";
const GETH_GENESIS: &str = "geth-genesis-file";
const BESU_GENESIS: &str = "besu-genesis-file";
const NETHERMIND_GENESIS: &str = "nethermind-genesis-file";
const CONSENSUS_CONFIG: &str = "consensus-config-file";
const CONSENSUS_GENESIS: &str = "consensus-genesis-file";
const CONSENSUS_BOOTNODE: &str = "consensus-bootnode-file";
const ETB_CONFIG: &str = "etb-config-file";
const LOCAL_TESTNET_DIR: &str = "local-testnet-dir";
const DOCKER_COMPOSE: &str = "docker-compose-file";
const ETB_CONFIG_CHECKPOINT: &str = "etb-config-checkpoint-file";
const CONSENSUS_CHECKPOINT: &str = "consensus-checkpoint-file";
const EXECUTION_CHECKPOINT: &str = "execution-checkpoint-file";
const CONSENSUS_BOOTNODE_CHECKPOINT: &str = "consensus-bootnode-checkpoint-file";
const DEPOSIT_BLOCK_HASH: &str = "deposit-contract-deployment-block-hash-file";
const DEPOSIT_BLOCK_NUMBER: &str = "deposit-contract-deployment-block-number-file";
const DEPOSIT_CONTRACT_BYTECODE: &str = "deposit-contract-bytecode-file";
const TRUSTED_SETUP_TXT: &str = "trusted-setup-txt-file";
const TRUSTED_SETUP_JSON: &str = "trusted-setup-json-file";

/// Known file keys and their default paths, in emission order.
const DEFAULT_PATHS: [(&str, &str); 17] = [
    (TESTNET_ROOT, "/data/"),
    (GETH_GENESIS, "/data/geth-genesis.json"),
    (BESU_GENESIS, "/data/besu-genesis.json"),
    (NETHERMIND_GENESIS, "/data/nethermind-genesis.json"),
    (CONSENSUS_CONFIG, "/data/config.yaml"),
    (CONSENSUS_GENESIS, "/data/genesis.ssz"),
    (CONSENSUS_BOOTNODE, "/data/consensus-bootnodes.txt"),
    (ETB_CONFIG, "/data/etb-config.yaml"),
    (LOCAL_TESTNET_DIR, "/data/local-testnet/"),
    (DOCKER_COMPOSE, "/source/docker-compose.yaml"),
    (ETB_CONFIG_CHECKPOINT, "/data/etb-config-checkpoint.txt"),
    (CONSENSUS_CHECKPOINT, "/data/consensus-checkpoint.txt"),
    (EXECUTION_CHECKPOINT, "/data/execution-checkpoint.txt"),
    (CONSENSUS_BOOTNODE_CHECKPOINT, "/data/consensus-bootnode-checkpoint.txt"),
    (DEPOSIT_BLOCK_HASH, "/data/deposit-contract-deployment-block-hash.txt"),
    (DEPOSIT_BLOCK_NUMBER, "/data/deposit-contract-deployment-block-number.txt"),
    (
        DEPOSIT_CONTRACT_BYTECODE,
        "/source/deps/deposit-contract/deposit_contract.hex",
    ),
];

const DENEB_DEFAULT_PATHS: [(&str, &str); 2] = [
    (TRUSTED_SETUP_TXT, "/data/trusted-setup.txt"),
    (TRUSTED_SETUP_JSON, "/data/trusted-setup.json"),
];

/// Alternative spellings accepted for known keys.
const ALIASES: [(&str, &str); 1] = [("nether-mind-genesis-file", NETHERMIND_GENESIS)];

/// The `files` section: canonical paths shared between the bootstrapper and every container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesConfig {
    pub testnet_root: PathBuf,
    pub geth_genesis_file: PathBuf,
    pub besu_genesis_file: PathBuf,
    pub nethermind_genesis_file: PathBuf,
    pub consensus_config_file: PathBuf,
    pub consensus_genesis_file: PathBuf,
    pub consensus_bootnode_file: PathBuf,
    pub etb_config_file: PathBuf,
    pub local_testnet_dir: PathBuf,
    pub docker_compose_file: PathBuf,
    pub etb_config_checkpoint_file: PathBuf,
    pub consensus_checkpoint_file: PathBuf,
    pub execution_checkpoint_file: PathBuf,
    pub consensus_bootnode_checkpoint_file: PathBuf,
    pub deposit_contract_deployment_block_hash_file: PathBuf,
    pub deposit_contract_deployment_block_number_file: PathBuf,
    pub deposit_contract_bytecode_file: PathBuf,
    /// Present only when deneb is scheduled.
    pub trusted_setup: Option<TrustedSetupFiles>,
    /// Unknown keys from the document, exported to every container as environment variables.
    pub extra: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedSetupFiles {
    pub txt: PathBuf,
    pub json: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self::resolve(&BTreeMap::new(), false)
    }
}

impl FilesConfig {
    pub(crate) fn parse(section: &Section, is_deneb: bool) -> Result<Self, ConfigError> {
        let mut overrides = BTreeMap::new();
        for (key, value) in section.entries() {
            let path = crate::lookup::scalar_to_string(value).ok_or_else(|| {
                ConfigError::InvalidValue {
                    path: section.key_path(&key),
                    reason: "expected a path".into(),
                }
            })?;
            let key = key.replace('_', "-");
            let key = ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .map_or(key.clone(), |(_, canonical)| canonical.to_string());
            overrides.insert(key, PathBuf::from(path));
        }
        Ok(Self::resolve(&overrides, is_deneb))
    }

    fn resolve(overrides: &BTreeMap<String, PathBuf>, is_deneb: bool) -> Self {
        let path = |key: &str| -> PathBuf {
            overrides.get(key).cloned().unwrap_or_else(|| {
                DEFAULT_PATHS
                    .iter()
                    .chain(DENEB_DEFAULT_PATHS.iter())
                    .find(|(known, _)| *known == key)
                    .map(|(_, default)| PathBuf::from(default))
                    .unwrap_or_default()
            })
        };
        let known = |key: &str| {
            DEFAULT_PATHS
                .iter()
                .chain(DENEB_DEFAULT_PATHS.iter())
                .any(|(known, _)| *known == key)
        };

        Self {
            testnet_root: path(TESTNET_ROOT),
            geth_genesis_file: path(GETH_GENESIS),
            besu_genesis_file: path(BESU_GENESIS),
            nethermind_genesis_file: path(NETHERMIND_GENESIS),
            consensus_config_file: path(CONSENSUS_CONFIG),
            consensus_genesis_file: path(CONSENSUS_GENESIS),
            consensus_bootnode_file: path(CONSENSUS_BOOTNODE),
            etb_config_file: path(ETB_CONFIG),
            local_testnet_dir: path(LOCAL_TESTNET_DIR),
            docker_compose_file: path(DOCKER_COMPOSE),
            etb_config_checkpoint_file: path(ETB_CONFIG_CHECKPOINT),
            consensus_checkpoint_file: path(CONSENSUS_CHECKPOINT),
            execution_checkpoint_file: path(EXECUTION_CHECKPOINT),
            consensus_bootnode_checkpoint_file: path(CONSENSUS_BOOTNODE_CHECKPOINT),
            deposit_contract_deployment_block_hash_file: path(DEPOSIT_BLOCK_HASH),
            deposit_contract_deployment_block_number_file: path(DEPOSIT_BLOCK_NUMBER),
            deposit_contract_bytecode_file: path(DEPOSIT_CONTRACT_BYTECODE),
            trusted_setup: is_deneb.then(|| TrustedSetupFiles {
                txt: path(TRUSTED_SETUP_TXT),
                json: path(TRUSTED_SETUP_JSON),
            }),
            extra: overrides
                .iter()
                .filter(|(key, _)| !known(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    /// Every known path as `(key, path)`, in emission order.
    pub fn entries(&self) -> Vec<(&'static str, &Path)> {
        let mut entries: Vec<(&'static str, &Path)> = vec![
            (TESTNET_ROOT, &self.testnet_root),
            (GETH_GENESIS, &self.geth_genesis_file),
            (BESU_GENESIS, &self.besu_genesis_file),
            (NETHERMIND_GENESIS, &self.nethermind_genesis_file),
            (CONSENSUS_CONFIG, &self.consensus_config_file),
            (CONSENSUS_GENESIS, &self.consensus_genesis_file),
            (CONSENSUS_BOOTNODE, &self.consensus_bootnode_file),
            (ETB_CONFIG, &self.etb_config_file),
            (LOCAL_TESTNET_DIR, &self.local_testnet_dir),
            (DOCKER_COMPOSE, &self.docker_compose_file),
            (ETB_CONFIG_CHECKPOINT, &self.etb_config_checkpoint_file),
            (CONSENSUS_CHECKPOINT, &self.consensus_checkpoint_file),
            (EXECUTION_CHECKPOINT, &self.execution_checkpoint_file),
            (
                CONSENSUS_BOOTNODE_CHECKPOINT,
                &self.consensus_bootnode_checkpoint_file,
            ),
            (
                DEPOSIT_BLOCK_HASH,
                &self.deposit_contract_deployment_block_hash_file,
            ),
            (
                DEPOSIT_BLOCK_NUMBER,
                &self.deposit_contract_deployment_block_number_file,
            ),
            (
                DEPOSIT_CONTRACT_BYTECODE,
                &self.deposit_contract_bytecode_file,
            ),
        ];
        if let Some(trusted_setup) = &self.trusted_setup {
            entries.push((TRUSTED_SETUP_TXT, &trusted_setup.txt));
            entries.push((TRUSTED_SETUP_JSON, &trusted_setup.json));
        }
        entries
    }
}

impl Serialize for FilesConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len() + self.extra.len()))?;
        for (key, path) in entries {
            map.serialize_entry(key, &path.display().to_string())?;
        }
        for (key, path) in &self.extra {
            map.serialize_entry(key, &path.display().to_string())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_yaml::Value;

    use super::*;

    fn files(yaml: &str, is_deneb: bool) -> FilesConfig {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        FilesConfig::parse(&Section::root(&value).unwrap(), is_deneb).unwrap()
    }

    #[test]
    fn known_overrides_replace_defaults() {
        let files = files("testnet-root: /tmp/etb\nnether_mind_genesis_file: /tmp/nm.json\n", false);
        assert_eq!(files.testnet_root, PathBuf::from("/tmp/etb"));
        assert_eq!(files.nethermind_genesis_file, PathBuf::from("/tmp/nm.json"));
        assert_eq!(files.geth_genesis_file, PathBuf::from("/data/geth-genesis.json"));
        assert!(files.extra.is_empty());
        assert!(files.trusted_setup.is_none());
    }

    #[test]
    fn unknown_overrides_are_kept() {
        let files = files("fuzzer-config-file: /data/fuzz.yaml\n", true);
        assert_eq!(files.extra["fuzzer-config-file"], PathBuf::from("/data/fuzz.yaml"));
        assert_eq!(
            files.trusted_setup.unwrap().json,
            PathBuf::from("/data/trusted-setup.json")
        );
    }

    #[test]
    fn flattened_files_parse_back() {
        let original = files("local-testnet-dir: /tmp/lt\nextra-file: /x\n", true);
        let value = serde_yaml::to_value(&original).unwrap();
        let parsed = FilesConfig::parse(&Section::root(&value).unwrap(), true).unwrap();
        assert_eq!(parsed, original);
    }
}

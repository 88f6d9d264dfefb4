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

//! Default values for everything an etb-config may leave unspecified, and the population pass
//! that writes them into a raw document before it is parsed.
//!
//! Execution and consensus config fields resolve in order: client-specific default, then the
//! family default shared by every client of that layer.

use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::{
    ConfigError,
    config::{ConsensusClient, ExecutionClient},
    lookup::Section,
};

pub const DEFAULT_CONFIG_NAME: &str = "local-minimal-testnet";
pub const DEFAULT_SECONDS_PER_ETH1_BLOCK: u64 = 14;
pub const DEFAULT_CHAIN_ID: u64 = 1337;
pub const DEFAULT_NETWORK_ID: u64 = 1337;
pub const DEFAULT_ACCOUNT_MNEMONIC: &str =
    "cat swing flag economy stadium alone churn speed unique patch report train";
pub const DEFAULT_KEYSTORE_PASSPHRASE: &str = "testnet-password";
pub const DEFAULT_PREMINE_BALANCE: u64 = 100_000_000;
pub const DEFAULT_PREMINE_PATHS: [&str; 4] = [
    "m/44'/60'/0'/0/0",
    "m/44'/60'/0'/0/1",
    "m/44'/60'/0'/0/2",
    "m/44'/60'/0'/0/3",
];
pub const DEFAULT_VALIDATOR_MNEMONIC: &str = "ocean style run case glory clip into nature guess jacket document firm fiscal hello kite disagree symptom tide net coral envelope wink render festival";

/// `(fork, version, epoch)` defaults. Forks missing from this table are never scheduled.
pub const DEFAULT_FORKS: [(&str, u32, u64); 6] = [
    ("phase0", 0x0100_0666, 0),
    ("altair", 0x0200_0666, 0),
    ("bellatrix", 0x0300_0666, 0),
    ("capella", 0x0400_0666, 2),
    ("deneb", 0x0500_0666, chainspec::FAR_FUTURE_EPOCH),
    ("sharding", 0x0600_0666, chainspec::FAR_FUTURE_EPOCH),
];

pub const DEFAULT_EXECUTION_HTTP_PORT: u16 = 8645;
pub const DEFAULT_EXECUTION_WS_PORT: u16 = 8646;
pub const DEFAULT_EXECUTION_P2P_PORT: u16 = 30303;
pub const DEFAULT_EXECUTION_ENGINE_HTTP_PORT: u16 = 8551;
pub const DEFAULT_EXECUTION_METRIC_PORT: u16 = 6060;

pub const DEFAULT_CONSENSUS_P2P_PORT: u16 = 13000;
pub const DEFAULT_CONSENSUS_BEACON_API_PORT: u16 = 5052;
pub const DEFAULT_CONSENSUS_BEACON_RPC_PORT: u16 = 3500;
pub const DEFAULT_CONSENSUS_BEACON_METRIC_PORT: u16 = 8080;
pub const DEFAULT_CONSENSUS_VALIDATOR_METRIC_PORT: u16 = 8081;
pub const DEFAULT_CONSENSUS_VALIDATOR_RPC_PORT: u16 = 7000;
pub const DEFAULT_NUM_VALIDATORS: u64 = 4;

pub const DEFAULT_PRYSM_VALIDATOR_PASSWORD: &str = "testnet-password";

pub const DEFAULT_DOCKER_VOLUMES: [&str; 2] = ["./data:/data", "./:/source/"];
pub const DEFAULT_ENTRYPOINT: [&str; 2] = ["/bin/sh", "-c"];

pub fn execution_launcher(client: ExecutionClient) -> &'static str {
    match client {
        ExecutionClient::Geth => "/source/deps/launchers/el/launch-geth.sh",
        ExecutionClient::Reth => "/source/deps/launchers/el/launch-reth.sh",
        ExecutionClient::Besu => "/source/deps/launchers/el/launch-besu.sh",
        ExecutionClient::Nethermind => "/source/deps/launchers/el/launch-nethermind.sh",
    }
}

pub fn execution_apis(client: ExecutionClient) -> &'static str {
    match client {
        ExecutionClient::Geth => "admin,net,eth,web3,engine",
        ExecutionClient::Reth => "eth,net,admin,web3",
        ExecutionClient::Besu => "ADMIN,ETH,NET,TXPOOL,WEB3,ENGINE",
        ExecutionClient::Nethermind => "net,eth,consensus,subscribe,web3,admin",
    }
}

pub fn execution_log_level(client: ExecutionClient) -> &'static str {
    match client {
        ExecutionClient::Geth | ExecutionClient::Reth => "4",
        ExecutionClient::Besu => "info",
        ExecutionClient::Nethermind => "INFO",
    }
}

/// Nethermind is the only client that serves the engine API over distinct HTTP and WS ports.
pub fn engine_ws_port(client: ExecutionClient, engine_http_port: u16) -> u16 {
    match client {
        ExecutionClient::Nethermind => engine_http_port.saturating_add(1),
        _ => engine_http_port,
    }
}

pub fn consensus_launcher(client: ConsensusClient) -> &'static str {
    match client {
        ConsensusClient::Prysm => "/source/deps/launchers/cl/launch-prysm.sh",
        ConsensusClient::Lighthouse => "/source/deps/launchers/cl/launch-lighthouse.sh",
        ConsensusClient::Teku => "/source/deps/launchers/cl/launch-teku.sh",
        ConsensusClient::Nimbus => "/source/deps/launchers/cl/launch-nimbus.sh",
        ConsensusClient::Lodestar => "/source/deps/launchers/cl/launch-lodestar.sh",
    }
}

pub fn consensus_log_level(client: ConsensusClient) -> &'static str {
    match client {
        ConsensusClient::Teku => "INFO",
        _ => "info",
    }
}

pub fn execution_config_name(client: ExecutionClient) -> String {
    format!("{client}-execution-config")
}

pub fn consensus_config_name(client: ConsensusClient) -> String {
    format!("{client}-consensus-client")
}

/// Default docker image and tag for client instances of a preset.
pub fn client_image(preset: chainspec::PresetBase) -> (&'static str, &'static str) {
    match preset {
        chainspec::PresetBase::Minimal => ("etb-all-clients", "minimal-current"),
        chainspec::PresetBase::Mainnet => ("etb-all-clients", "mainnet-current"),
    }
}

/// Whether a raw document already went through [populate].
pub fn is_populated(doc: &Value) -> bool {
    Section::root(doc)
        .and_then(|root| root.child("special"))
        .and_then(|special| special.optional_u64("is-populated"))
        .is_ok_and(|flag| flag == Some(1))
}

/// Fills every unspecified field with its default and marks the document as populated.
///
/// User-provided entries always win over defaults. Keys are compared in both their kebab-case
/// and snake_case spellings.
pub fn populate(doc: &mut Value) -> Result<(), ConfigError> {
    let root = doc.as_mapping_mut().ok_or_else(|| ConfigError::InvalidValue {
        path: "<root>".into(),
        reason: "expected a mapping".into(),
    })?;

    let preset = {
        let raw = Value::Mapping(root.clone());
        let section = Section::root(&raw)?;
        let preset = section
            .child("testnet-config")?
            .child("consensus-layer")?
            .string("preset-base")?;
        preset
            .parse::<chainspec::PresetBase>()
            .map_err(|e| ConfigError::InvalidValue {
                path: "testnet-config.consensus-layer.preset-base".into(),
                reason: e.to_string(),
            })?
    };

    if has_key(root, "docker") {
        populate_docker(mapping_entry(root, "docker", "docker")?);
    }
    populate_execution_configs(mapping_entry(root, "execution-configs", "execution-configs")?)?;
    populate_consensus_configs(mapping_entry(root, "consensus-configs", "consensus-configs")?)?;

    let consensus_clients = consensus_clients_by_config(root)?;
    let total_validators = if has_key(root, "client-instances") {
        let instances = mapping_entry(root, "client-instances", "client-instances")?;
        populate_client_instances(instances, preset, &consensus_clients)?
    } else {
        0
    };

    let testnet = mapping_entry(root, "testnet-config", "testnet-config")?;
    populate_testnet_config(testnet, total_validators)?;

    let special = mapping_entry(root, "special", "special")?;
    special.insert("is-populated".into(), 1.into());
    info!("populated etb-config with default values");
    Ok(())
}

fn has_key(map: &Mapping, key: &str) -> bool {
    let present = |k: &str| map.get(k).is_some_and(|v| !v.is_null());
    present(key) || present(&key.replace('-', "_"))
}

fn set_default(map: &mut Mapping, key: &str, value: impl Into<Value>) {
    if !has_key(map, key) {
        map.insert(key.into(), value.into());
    }
}

/// Returns the nested mapping at `key`, creating it when absent or null.
fn mapping_entry<'m>(
    map: &'m mut Mapping,
    key: &str,
    path: &str,
) -> Result<&'m mut Mapping, ConfigError> {
    let existing = if map.get(key).is_some_and(|v| !v.is_null()) {
        key.to_string()
    } else if map.get(key.replace('-', "_").as_str()).is_some_and(|v| !v.is_null()) {
        key.replace('-', "_")
    } else {
        map.insert(key.into(), Value::Mapping(Mapping::new()));
        key.to_string()
    };
    map.get_mut(existing.as_str())
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| ConfigError::InvalidValue {
            path: path.to_string(),
            reason: "expected a mapping".into(),
        })
}

fn string_field(map: &Mapping, key: &str) -> Option<String> {
    map.get(key)
        .or_else(|| map.get(key.replace('-', "_").as_str()))
        .and_then(crate::lookup::scalar_to_string)
}

fn populate_docker(docker: &mut Mapping) {
    let volumes: Vec<Value> = DEFAULT_DOCKER_VOLUMES.iter().map(|v| (*v).into()).collect();
    set_default(docker, "volumes", Value::Sequence(volumes));
}

fn populate_execution_configs(configs: &mut Mapping) -> Result<(), ConfigError> {
    for client in ExecutionClient::ALL {
        let name = execution_config_name(client);
        if !configs.contains_key(name.as_str()) {
            let mut config = Mapping::new();
            config.insert("client".into(), client.as_str().into());
            configs.insert(name.into(), Value::Mapping(config));
        }
    }

    for (name, config) in configs.iter_mut() {
        let name = crate::lookup::scalar_to_string(name).unwrap_or_default();
        let path = format!("execution-configs.{name}");
        let config = config
            .as_mapping_mut()
            .ok_or_else(|| ConfigError::InvalidValue {
                path: path.clone(),
                reason: "expected a mapping".into(),
            })?;
        let client = parse_client::<ExecutionClient>(config, &path)?;

        set_default(config, "launcher", execution_launcher(client));
        set_default(config, "log-level", execution_log_level(client));
        set_default(config, "p2p-port", DEFAULT_EXECUTION_P2P_PORT);
        set_default(config, "http-apis", execution_apis(client));
        set_default(config, "http-port", DEFAULT_EXECUTION_HTTP_PORT);
        set_default(config, "ws-apis", execution_apis(client));
        set_default(config, "ws-port", DEFAULT_EXECUTION_WS_PORT);
        set_default(config, "engine-http-port", DEFAULT_EXECUTION_ENGINE_HTTP_PORT);
        let engine_http = config
            .get("engine-http-port")
            .or_else(|| config.get("engine_http_port"))
            .and_then(crate::lookup::value_to_u64)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_EXECUTION_ENGINE_HTTP_PORT);
        set_default(config, "engine-ws-port", engine_ws_port(client, engine_http));
        set_default(config, "metric-port", DEFAULT_EXECUTION_METRIC_PORT);
        debug!(config = name, %client, "populated execution config");
    }
    Ok(())
}

fn populate_consensus_configs(configs: &mut Mapping) -> Result<(), ConfigError> {
    for client in ConsensusClient::ALL {
        let name = consensus_config_name(client);
        if !configs.contains_key(name.as_str()) {
            let mut config = Mapping::new();
            config.insert("client".into(), client.as_str().into());
            configs.insert(name.into(), Value::Mapping(config));
        }
    }

    for (name, config) in configs.iter_mut() {
        let name = crate::lookup::scalar_to_string(name).unwrap_or_default();
        let path = format!("consensus-configs.{name}");
        let config = config
            .as_mapping_mut()
            .ok_or_else(|| ConfigError::InvalidValue {
                path: path.clone(),
                reason: "expected a mapping".into(),
            })?;
        let client = parse_client::<ConsensusClient>(config, &path)?;

        set_default(config, "launcher", consensus_launcher(client));
        set_default(config, "log-level", consensus_log_level(client));
        set_default(config, "p2p-port", DEFAULT_CONSENSUS_P2P_PORT);
        set_default(config, "beacon-api-port", DEFAULT_CONSENSUS_BEACON_API_PORT);
        set_default(config, "beacon-rpc-port", DEFAULT_CONSENSUS_BEACON_RPC_PORT);
        set_default(config, "beacon-metric-port", DEFAULT_CONSENSUS_BEACON_METRIC_PORT);
        set_default(config, "validator-rpc-port", DEFAULT_CONSENSUS_VALIDATOR_RPC_PORT);
        set_default(config, "validator-metric-port", DEFAULT_CONSENSUS_VALIDATOR_METRIC_PORT);
        set_default(config, "num-validators", DEFAULT_NUM_VALIDATORS);
        debug!(config = name, %client, "populated consensus config");
    }
    Ok(())
}

fn parse_client<C>(config: &Mapping, path: &str) -> Result<C, ConfigError>
where
    C: std::str::FromStr,
    C::Err: std::fmt::Display,
{
    let client = string_field(config, "client")
        .ok_or_else(|| ConfigError::MissingKey(format!("{path}.client")))?;
    client.parse().map_err(|e: C::Err| ConfigError::InvalidValue {
        path: format!("{path}.client"),
        reason: e.to_string(),
    })
}

/// `config name -> (client, num-validators)` of the already populated consensus configs.
fn consensus_clients_by_config(
    root: &Mapping,
) -> Result<Vec<(String, ConsensusClient, u64)>, ConfigError> {
    let raw = Value::Mapping(root.clone());
    let section = Section::root(&raw)?;
    let configs = section.child("consensus-configs")?;
    configs
        .children()?
        .into_iter()
        .map(|(name, config)| {
            let client = config.string("client")?;
            let client = client.parse().map_err(|e: crate::config::UnknownClient| {
                ConfigError::InvalidValue {
                    path: config.key_path("client"),
                    reason: e.to_string(),
                }
            })?;
            Ok((name, client, config.u64("num-validators")?))
        })
        .collect()
}

/// Fills image/tag and client-specific additional env; returns the total number of instance
/// validators.
fn populate_client_instances(
    instances: &mut Mapping,
    preset: chainspec::PresetBase,
    consensus_configs: &[(String, ConsensusClient, u64)],
) -> Result<u64, ConfigError> {
    let (image, tag) = client_image(preset);
    let mut total_validators = 0u64;

    for (name, instance) in instances.iter_mut() {
        let name = crate::lookup::scalar_to_string(name).unwrap_or_default();
        let path = format!("client-instances.{name}");
        let instance = instance
            .as_mapping_mut()
            .ok_or_else(|| ConfigError::InvalidValue {
                path: path.clone(),
                reason: "expected a mapping".into(),
            })?;
        set_default(instance, "image", image);
        set_default(instance, "tag", tag);

        // unresolved references are reported when the populated document is parsed
        let Some(reference) = string_field(instance, "consensus-config") else {
            continue;
        };
        let Some((_, client, num_validators)) =
            consensus_configs.iter().find(|(config, ..)| *config == reference)
        else {
            continue;
        };

        let num_nodes = instance
            .get("num-nodes")
            .or_else(|| instance.get("num_nodes"))
            .and_then(crate::lookup::value_to_u64)
            .unwrap_or(0);
        total_validators = num_nodes
            .checked_mul(*num_validators)
            .and_then(|count| total_validators.checked_add(count))
            .ok_or_else(|| ConfigError::InvalidValue {
                path: format!("{path}.num-nodes"),
                reason: format!(
                    "{num_nodes} nodes with {num_validators} validators each overflow the validator index"
                ),
            })?;

        let defaults: &[(&str, &str)] = match (client, preset) {
            (ConsensusClient::Prysm, _) => &[("validator-password", DEFAULT_PRYSM_VALIDATOR_PASSWORD)],
            (ConsensusClient::Lodestar, chainspec::PresetBase::Minimal) => {
                &[("LODESTAR_PRESET", "minimal")]
            }
            _ => &[],
        };
        if !defaults.is_empty() {
            let env = mapping_entry(instance, "additional-env", &format!("{path}.additional-env"))?;
            for (key, value) in defaults {
                set_default(env, key, *value);
            }
        }
    }
    Ok(total_validators)
}

fn populate_testnet_config(testnet: &mut Mapping, total_validators: u64) -> Result<(), ConfigError> {
    let execution = mapping_entry(testnet, "execution-layer", "testnet-config.execution-layer")?;
    set_default(execution, "seconds-per-eth1-block", DEFAULT_SECONDS_PER_ETH1_BLOCK);
    set_default(execution, "chain-id", DEFAULT_CHAIN_ID);
    set_default(execution, "network-id", DEFAULT_NETWORK_ID);
    set_default(execution, "account-mnemonic", DEFAULT_ACCOUNT_MNEMONIC);
    set_default(execution, "keystore-passphrase", DEFAULT_KEYSTORE_PASSPHRASE);
    if !has_key(execution, "premines") {
        let premines: Mapping = DEFAULT_PREMINE_PATHS
            .iter()
            .map(|path| ((*path).into(), DEFAULT_PREMINE_BALANCE.into()))
            .collect();
        execution.insert("premines".into(), Value::Mapping(premines));
    }

    let consensus = mapping_entry(testnet, "consensus-layer", "testnet-config.consensus-layer")?;
    set_default(consensus, "config-name", DEFAULT_CONFIG_NAME);
    set_default(consensus, "validator-mnemonic", DEFAULT_VALIDATOR_MNEMONIC);
    set_default(consensus, "min-genesis-active-validator-count", total_validators);
    for (fork, version, epoch) in DEFAULT_FORKS {
        set_default(consensus, &format!("{fork}-fork-version"), format!("0x{version:08x}"));
        set_default(consensus, &format!("{fork}-fork-epoch"), epoch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPARSE: &str = r#"
docker:
  network-name: etb-net
  ip-subnet: 10.0.20.0/24
testnet-config:
  deposit-contract-address: "0x8c594691c0e592ffa21f153a16ae41db5befcaaa"
  execution-layer:
    chain_id: 42
  consensus-layer:
    preset-base: minimal
execution-configs:
  geth-execution-config:
    client: geth
    http-port: 9000
  nm-custom:
    client: nethermind
    engine-http-port: 9551
consensus-configs:
  lodestar-consensus-client:
    client: lodestar
    num-validators: 8
client-instances:
  prysm-geth:
    start-ip-address: 10.0.20.10
    num-nodes: 2
    validator-offset-start: 0
    execution-config: geth-execution-config
    consensus-config: prysm-consensus-client
  lodestar-nm:
    start-ip-address: 10.0.20.20
    num-nodes: 1
    validator-offset-start: 8
    execution-config: nm-custom
    consensus-config: lodestar-consensus-client
generic-instances: {}
"#;

    fn populated() -> Value {
        let mut doc: Value = serde_yaml::from_str(SPARSE).unwrap();
        populate(&mut doc).unwrap();
        doc
    }

    #[test]
    fn fills_every_default_config() {
        let doc = populated();
        let root = Section::root(&doc).unwrap();
        let execution = root.child("execution-configs").unwrap();
        for client in ExecutionClient::ALL {
            assert!(execution.contains(&execution_config_name(client)));
        }
        let consensus = root.child("consensus-configs").unwrap();
        for client in ConsensusClient::ALL {
            assert!(consensus.contains(&consensus_config_name(client)));
        }
    }

    #[test]
    fn user_values_win_over_defaults() {
        let doc = populated();
        let root = Section::root(&doc).unwrap();
        let geth = root
            .child("execution-configs")
            .unwrap()
            .child("geth-execution-config")
            .unwrap();
        assert_eq!(geth.u64("http-port").unwrap(), 9000);
        assert_eq!(geth.u64("ws-port").unwrap(), u64::from(DEFAULT_EXECUTION_WS_PORT));
        assert_eq!(geth.u64("engine-ws-port").unwrap(), 8551);

        let execution_layer = root
            .child("testnet-config")
            .unwrap()
            .child("execution-layer")
            .unwrap();
        assert_eq!(execution_layer.u64("chain-id").unwrap(), 42);
        assert_eq!(execution_layer.u64("network-id").unwrap(), DEFAULT_NETWORK_ID);
    }

    #[test]
    fn nethermind_engine_ports_differ() {
        let doc = populated();
        let root = Section::root(&doc).unwrap();
        let configs = root.child("execution-configs").unwrap();
        let custom = configs.child("nm-custom").unwrap();
        assert_eq!(custom.u64("engine-ws-port").unwrap(), 9552);
        let default = configs.child("nethermind-execution-config").unwrap();
        assert_eq!(default.u64("engine-ws-port").unwrap(), 8552);
    }

    #[test]
    fn client_specific_additional_env() {
        let doc = populated();
        let instances = Section::root(&doc)
            .unwrap()
            .child("client-instances")
            .unwrap();
        let prysm_env = instances
            .child("prysm-geth")
            .unwrap()
            .child("additional-env")
            .unwrap();
        assert_eq!(
            prysm_env.string("validator-password").unwrap(),
            DEFAULT_PRYSM_VALIDATOR_PASSWORD
        );
        let lodestar_env = instances
            .child("lodestar-nm")
            .unwrap()
            .child("additional-env")
            .unwrap();
        assert_eq!(lodestar_env.string("LODESTAR_PRESET").unwrap(), "minimal");
    }

    #[test]
    fn genesis_count_defaults_to_instance_validators() {
        let doc = populated();
        let consensus = Section::root(&doc)
            .unwrap()
            .child("testnet-config")
            .unwrap()
            .child("consensus-layer")
            .unwrap();
        // 2 prysm nodes with 4 validators each, 1 lodestar node with 8
        assert_eq!(consensus.u64("min-genesis-active-validator-count").unwrap(), 16);
        assert_eq!(consensus.string("config-name").unwrap(), DEFAULT_CONFIG_NAME);
        assert_eq!(consensus.u64("capella-fork-epoch").unwrap(), 2);
        assert_eq!(consensus.u64("deneb-fork-epoch").unwrap(), u64::MAX);
    }

    #[test]
    fn marks_document_populated() {
        let mut doc: Value = serde_yaml::from_str(SPARSE).unwrap();
        assert!(!is_populated(&doc));
        populate(&mut doc).unwrap();
        assert!(is_populated(&doc));
    }

    #[test]
    fn preset_base_is_required() {
        let mut doc: Value = serde_yaml::from_str(
            "docker: {}\ntestnet-config:\n  consensus-layer: {}\nclient-instances: {}\n",
        )
        .unwrap();
        let err = populate(&mut doc).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingKey(ref p) if p == "testnet-config.consensus-layer.preset-base")
        );
    }
}

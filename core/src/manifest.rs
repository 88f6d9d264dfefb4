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

//! The docker-compose manifest: one service per instance on a single bridge network.

use std::{collections::BTreeMap, fs, net::Ipv4Addr, path::Path};

use serde::{Serialize, ser::SerializeMap};
use tracing::info;

use crate::{
    ConfigError, EtbConfig,
    config::{ClientInstance, Env, ExecutionClient, Instance, InstanceCollection, env_key},
    defaults::DEFAULT_ENTRYPOINT,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceNetwork {
    pub ipv4_address: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub container_name: String,
    pub hostname: String,
    pub image: String,
    pub volumes: Vec<String>,
    pub networks: BTreeMap<String, ServiceNetwork>,
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    pub environment: Env,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub driver: String,
    pub ipam: Ipam,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipam {
    pub config: Vec<IpamConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpamConfig {
    pub subnet: String,
}

/// Services keep instance order: generic instances first, then client instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub services: Vec<Service>,
    pub networks: BTreeMap<String, Network>,
}

impl Serialize for Manifest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Services<'a>(&'a [Service]);

        impl Serialize for Services<'_> {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for service in self.0 {
                    map.serialize_entry(&service.container_name, service)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("services", &Services(&self.services))?;
        map.serialize_entry("networks", &self.networks)?;
        map.end()
    }
}

impl Manifest {
    pub fn new(config: &EtbConfig) -> Self {
        let global_env = global_env(config);
        let mut services: Vec<Service> = config
            .generic_instances()
            .iter()
            .map(|instance| service(config, instance, &global_env))
            .collect();
        services.extend(
            config
                .client_instances()
                .iter()
                .map(|instance| client_service(config, instance, &global_env)),
        );

        let network = Network {
            driver: "bridge".into(),
            ipam: Ipam {
                config: vec![IpamConfig {
                    subnet: config.docker.ip_subnet.to_string(),
                }],
            },
        };
        Self {
            services,
            networks: BTreeMap::from([(config.docker.network_name.clone(), network)]),
        }
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.container_name == name)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_yaml()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), services = self.services.len(), "wrote docker-compose manifest");
        Ok(())
    }
}

/// Environment shared by every service.
pub fn global_env(config: &EtbConfig) -> Env {
    let files = &config.files;
    let execution = &config.testnet_config.execution_layer;
    let path = |p: &Path| p.display().to_string();
    let mut env = Env::from([
        ("ETB_CONFIG_CHECKPOINT_FILE".into(), path(&files.etb_config_checkpoint_file)),
        ("CONSENSUS_CHECKPOINT_FILE".into(), path(&files.consensus_checkpoint_file)),
        ("EXECUTION_CHECKPOINT_FILE".into(), path(&files.execution_checkpoint_file)),
        (
            "CONSENSUS_BOOTNODE_CHECKPOINT_FILE".into(),
            path(&files.consensus_bootnode_checkpoint_file),
        ),
        ("CONSENSUS_BOOTNODE_FILE".into(), path(&files.consensus_bootnode_file)),
        ("IP_SUBNET".into(), config.docker.ip_subnet.to_string()),
        ("NUM_CLIENT_NODES".into(), config.num_client_nodes().to_string()),
        ("CHAIN_ID".into(), execution.chain_id.to_string()),
        ("NETWORK_ID".into(), execution.network_id.to_string()),
        (
            "IS_DENEB".into(),
            u8::from(config.testnet_config.consensus_layer.is_deneb()).to_string(),
        ),
    ]);
    if let Some(trusted_setup) = &files.trusted_setup {
        env.insert("TRUSTED_SETUP_TXT_FILE".into(), path(&trusted_setup.txt));
        env.insert("TRUSTED_SETUP_JSON_FILE".into(), path(&trusted_setup.json));
    }
    for (key, value) in &files.extra {
        env.insert(env_key(key), path(value));
    }
    env
}

fn entrypoint(collection: &InstanceCollection) -> Vec<String> {
    match &collection.entrypoint {
        Some(entrypoint) => entrypoint.split_whitespace().map(String::from).collect(),
        None => DEFAULT_ENTRYPOINT.iter().map(|s| s.to_string()).collect(),
    }
}

fn service(config: &EtbConfig, instance: &impl Instance, global_env: &Env) -> Service {
    let collection = instance.collection();
    let mut environment = global_env.clone();
    environment.extend(instance.env());
    Service {
        container_name: instance.name().to_string(),
        hostname: instance.name().to_string(),
        image: format!("{}:{}", collection.image, collection.tag),
        volumes: config.docker.volumes.clone(),
        networks: BTreeMap::from([(
            config.docker.network_name.clone(),
            ServiceNetwork {
                ipv4_address: instance.ip_address(),
            },
        )]),
        entrypoint: entrypoint(collection),
        command: None,
        environment,
    }
}

fn client_service(config: &EtbConfig, instance: &ClientInstance, global_env: &Env) -> Service {
    let mut service = service(config, instance, global_env);
    let path = |p: &Path| p.display().to_string();
    let files = &config.files;
    let execution_genesis = match instance.execution_config().client {
        ExecutionClient::Geth | ExecutionClient::Reth => &files.geth_genesis_file,
        ExecutionClient::Besu => &files.besu_genesis_file,
        ExecutionClient::Nethermind => &files.nethermind_genesis_file,
    };
    service.environment.extend([
        ("JWT_SECRET_FILE".to_string(), path(&instance.jwt_secret_file)),
        ("CONSENSUS_NODE_DIR".into(), path(&instance.node_dir)),
        ("COLLECTION_DIR".into(), path(instance.collection_dir())),
        (
            "CONSENSUS_CONFIG_FILE".into(),
            path(&instance.collection_dir().join("config.yaml")),
        ),
        (
            "CONSENSUS_GENESIS_FILE".into(),
            path(&instance.collection_dir().join("genesis.ssz")),
        ),
        ("EXECUTION_NODE_DIR".into(), path(&instance.el_dir)),
        ("CONSENSUS_GRAFFITI".into(), instance.name.clone()),
        (
            "NUM_VALIDATORS".into(),
            instance.consensus_config().num_validators.to_string(),
        ),
        ("EXECUTION_GENESIS_FILE".into(), path(execution_genesis)),
    ]);
    service.command = Some(vec![format!(
        "{} & {}",
        instance.execution_config().launcher.display(),
        instance.consensus_config().launcher.display()
    )]);
    service
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::MINIMAL_CONFIG;

    fn manifest(doc: &str) -> Manifest {
        Manifest::new(&EtbConfig::from_yaml_str(doc).unwrap())
    }

    #[test]
    fn one_service_per_instance() {
        let manifest = manifest(MINIMAL_CONFIG);
        let names: Vec<_> = manifest.services.iter().map(|s| s.container_name.as_str()).collect();
        assert_eq!(names, ["ethereum-testnet-bootstrapper-0", "single-0"]);
        assert_eq!(
            manifest.networks["ethereum-testnet"].ipam.config[0].subnet,
            "10.0.20.0/24"
        );
    }

    #[test]
    fn generic_service() {
        let manifest = manifest(MINIMAL_CONFIG);
        let service = manifest.service("ethereum-testnet-bootstrapper-0").unwrap();
        assert_eq!(service.hostname, service.container_name);
        assert_eq!(service.image, "etb-all-clients:minimal-current");
        assert_eq!(service.entrypoint, ["/source/entrypoint.sh", "--bootstrap-testnet"]);
        assert!(service.command.is_none());
        assert_eq!(service.volumes, ["./data:/data", "./:/source/"]);
        assert_eq!(
            service.networks["ethereum-testnet"].ipv4_address,
            Ipv4Addr::new(10, 0, 20, 201)
        );
        assert_eq!(service.environment["IP_ADDRESS"], "10.0.20.201");
        assert_eq!(service.environment["NUM_CLIENT_NODES"], "1");
        assert_eq!(service.environment["IS_DENEB"], "0");
        assert!(!service.environment.contains_key("JWT_SECRET_FILE"));
    }

    #[test]
    fn client_service_env() {
        let manifest = manifest(MINIMAL_CONFIG);
        let service = manifest.service("single-0").unwrap();
        let env = &service.environment;
        assert_eq!(service.entrypoint, DEFAULT_ENTRYPOINT);
        assert_eq!(
            service.command.as_deref(),
            Some(&["/source/deps/launchers/el/launch-geth.sh & /source/deps/launchers/cl/launch-lighthouse.sh".to_string()][..])
        );
        assert_eq!(env["CHAIN_ID"], "1337");
        assert_eq!(env["EXECUTION_CLIENT"], "geth");
        assert_eq!(env["CONSENSUS_CLIENT"], "lighthouse");
        assert_eq!(env["JWT_SECRET_FILE"], "/data/local-testnet/single/node_0/jwt_secret");
        assert_eq!(env["CONSENSUS_CONFIG_FILE"], "/data/local-testnet/single/config.yaml");
        assert_eq!(env["EXECUTION_NODE_DIR"], "/data/local-testnet/single/node_0/geth");
        assert_eq!(env["CONSENSUS_GRAFFITI"], "single-0");
        assert_eq!(env["NUM_VALIDATORS"], "64");
        assert_eq!(env["EXECUTION_GENESIS_FILE"], "/data/geth-genesis.json");
        assert_eq!(env["RUN_JSON_RPC_SNOOPER"], "false");
    }

    #[test]
    fn extra_files_become_global_env() {
        let doc = format!("files:\n  fuzzer-config-file: /data/fuzz.yaml\n{MINIMAL_CONFIG}");
        let manifest = manifest(&doc);
        for service in &manifest.services {
            assert_eq!(service.environment["FUZZER_CONFIG_FILE"], "/data/fuzz.yaml");
        }
    }

    #[test]
    fn yaml_has_services_and_networks_only() {
        let yaml = manifest(MINIMAL_CONFIG).to_yaml().unwrap();
        // `&name` and `*name` mark anchors and aliases, a lone `&` is the shell operator
        let is_anchor =
            |token: &str| matches!(token.as_bytes(), [b'&' | b'*', c, ..] if !c.is_ascii_whitespace());
        for line in yaml.lines() {
            let node = line.trim_start().trim_start_matches("- ");
            let value = node.split_once(": ").map_or(node, |(_, value)| value);
            assert!(!is_anchor(node) && !is_anchor(value), "anchor or alias in `{line}`");
        }
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let keys: Vec<_> = doc
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, ["services", "networks"]);
        assert_eq!(
            doc["services"]["single-0"]["networks"]["ethereum-testnet"]["ipv4_address"],
            "10.0.20.10"
        );
        assert_eq!(
            doc["services"]["single-0"]["command"][0],
            "/source/deps/launchers/el/launch-geth.sh & /source/deps/launchers/cl/launch-lighthouse.sh"
        );
    }
}

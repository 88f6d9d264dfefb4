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

//! Runs the bootstrapper end to end against fake key and genesis tools and mocked execution
//! clients listening on loopback addresses.

#![cfg(unix)]

use std::{fs, path::Path, time::Duration};

use etb_core::{ConfigError, EtbConfig, config::{ConsensusClient, ExecutionClient}};
use etb_host::{
    Bootstrapper, RetryPolicy,
    test_utils::{
        FAKE_ETH2_TESTNET_GENESIS, FAKE_ETH2_VAL_TOOLS, LocalCollection, local_testnet_yaml,
        write_fake_tool,
    },
    tools::{Eth2TestnetGenesis, Eth2ValTools, Tool},
};
use rand::{SeedableRng, rngs::StdRng};
use serde_json::{Value, json};
use test_log::test;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method},
};

const BLOCK_HASH: &str = "0x4e3a3754410177e6937ef1f84bba68ea139e8d1a2258c5f85db9f1cd715a1bdd";

async fn server() -> MockServer {
    MockServer::builder()
        .listener(std::net::TcpListener::bind("0.0.0.0:0").unwrap())
        .start()
        .await
}

fn bootstrapper(tools: &Path) -> Bootstrapper<StdRng> {
    let policy = RetryPolicy::new(2, Duration::from_secs(5));
    Bootstrapper::new(StdRng::seed_from_u64(1337))
        .with_val_tools(Eth2ValTools::new(Tool::new(write_fake_tool(
            tools,
            "eth2-val-tools",
            FAKE_ETH2_VAL_TOOLS,
        ))))
        .with_genesis_tool(Eth2TestnetGenesis::new(Tool::new(write_fake_tool(
            tools,
            "eth2-testnet-genesis",
            FAKE_ETH2_TESTNET_GENESIS,
        ))))
        .with_request_policies(policy, policy)
}

fn config_value(config_yaml: &str, key: &str) -> String {
    config_yaml
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{key}: ")))
        .unwrap_or_else(|| panic!("{key} missing from config.yaml"))
        .trim_matches('"')
        .to_string()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test(tokio::test)]
async fn single_instance_testnet() {
    let server = server().await;
    let port = server.address().port();
    let root = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let yaml = local_testnet_yaml(root.path(), port, &[LocalCollection::geth_lighthouse("single", 1)]);
    let config = EtbConfig::from_yaml_str(&yaml).unwrap();
    let mut bootstrapper = bootstrapper(tools.path());

    bootstrapper.init(&config).unwrap();
    let node = root.path().join("local-testnet/single/node_0");
    assert!(node.join("geth").is_dir());
    assert!(node.join("keys").is_dir());
    assert!(node.join("secrets").is_dir());
    let jwt = fs::read_to_string(node.join("jwt_secret")).unwrap();
    assert_eq!(jwt.len(), 66);
    assert!(jwt.starts_with("0x"));

    fs::write(root.path().join("deposit_contract.hex"), "0x60806040").unwrap();
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "admin_nodeInfo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": { "enode": "enode://single-0@127.0.0.10:30303" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "admin_addPeer"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getBlockByNumber", "params": ["0x0", true]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": { "hash": BLOCK_HASH, "number": "0x0" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    // the bootstrapper container works from the snapshot written by init
    let mut config = EtbConfig::load(root.path().join("etb-config.yaml")).unwrap();
    bootstrapper.bootstrap(&mut config).await.unwrap();
    let genesis_time = config.genesis_time().unwrap();

    let published = EtbConfig::load(&config.files.etb_config_file).unwrap();
    assert_eq!(published.genesis_time().unwrap(), genesis_time);

    let geth = read_json(&config.files.geth_genesis_file);
    assert_eq!(geth["config"]["chainId"], 1337);
    assert!(config.files.besu_genesis_file.is_file());
    assert!(config.files.nethermind_genesis_file.is_file());

    let consensus = fs::read_to_string(&config.files.consensus_config_file).unwrap();
    assert_eq!(config_value(&consensus, "DEPOSIT_CHAIN_ID"), "1337");
    assert_eq!(config_value(&consensus, "MIN_GENESIS_TIME"), genesis_time.to_string());

    assert_eq!(
        fs::read_to_string(&config.files.deposit_contract_deployment_block_hash_file).unwrap(),
        BLOCK_HASH
    );
    assert_eq!(
        fs::read_to_string(&config.files.deposit_contract_deployment_block_number_file).unwrap(),
        "0"
    );

    let collection = root.path().join("local-testnet/single");
    assert_eq!(fs::read_to_string(collection.join("config.yaml")).unwrap(), consensus);
    assert_eq!(fs::read(collection.join("genesis.ssz")).unwrap(), b"ssz-genesis-state");
    assert_eq!(fs::read_to_string(collection.join("deploy_block.txt")).unwrap(), "0");

    let genesis_args = fs::read_to_string(root.path().join("genesis.ssz.args")).unwrap();
    assert!(genesis_args.starts_with("capella --mnemonics"));
    assert!(genesis_args.contains("--preset-capella minimal"));
    assert!(genesis_args.contains("--eth1-config"));

    let files = &config.files;
    for checkpoint in [
        &files.etb_config_checkpoint_file,
        &files.consensus_bootnode_checkpoint_file,
        &files.execution_checkpoint_file,
        &files.consensus_checkpoint_file,
    ] {
        assert!(checkpoint.is_file(), "{} missing", checkpoint.display());
    }
    let created = |path: &Path| fs::metadata(path).unwrap().modified().unwrap();
    assert!(created(&files.execution_checkpoint_file) <= created(&files.consensus_checkpoint_file));
}

#[test(tokio::test)]
async fn pairs_every_execution_client() {
    let server = server().await;
    let port = server.address().port();
    let root = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let yaml = local_testnet_yaml(
        root.path(),
        port,
        &[
            LocalCollection::geth_lighthouse("client-a", 2),
            LocalCollection::new("client-b", ExecutionClient::Besu, ConsensusClient::Teku, 2),
        ],
    )
    .replace("preset-base: minimal", "preset-base: mainnet");
    let config = EtbConfig::from_yaml_str(&yaml).unwrap();
    let instances = config.client_instances();
    assert_eq!(instances.len(), 4);

    for instance in instances {
        let host = format!("{}:{port}", instance.ip_address);
        Mock::given(method("POST"))
            .and(header("host", host.as_str()))
            .and(body_partial_json(json!({"method": "admin_nodeInfo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "enode": format!("enode://{}@{}:30303", instance.name, instance.ip_address) }
            })))
            .expect(1)
            .mount(&server)
            .await;
        // every client is told about the three others, never about itself
        let own_enode = format!("enode://{}@{}:30303", instance.name, instance.ip_address);
        Mock::given(method("POST"))
            .and(header("host", host.as_str()))
            .and(body_partial_json(json!({"method": "admin_addPeer", "params": [own_enode]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("host", host.as_str()))
            .and(body_partial_json(json!({"method": "admin_addPeer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(3)
            .mount(&server)
            .await;
    }

    bootstrapper(tools.path())
        .pair_execution_clients(&config)
        .await
        .unwrap();
    server.verify().await;
}

#[test(tokio::test)]
async fn unreachable_admin_api_is_fatal() {
    let server = server().await;
    let port = server.address().port();
    let root = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let yaml = local_testnet_yaml(root.path(), port, &[LocalCollection::geth_lighthouse("a", 2)]);
    let config = EtbConfig::from_yaml_str(&yaml).unwrap();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = bootstrapper(tools.path())
        .pair_execution_clients(&config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("a-0"), "{err}");
}

#[test]
fn duplicate_ip_addresses_fail_before_any_file_is_written() {
    let root = tempfile::tempdir().unwrap();
    let yaml = local_testnet_yaml(
        root.path(),
        8645,
        &[
            LocalCollection::geth_lighthouse("first", 1),
            LocalCollection::geth_lighthouse("second", 1),
        ],
    )
    .replace("start-ip-address: 127.0.0.20", "start-ip-address: 127.0.0.10");

    let err = EtbConfig::from_yaml_str(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateIpAddress { .. }), "{err}");
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

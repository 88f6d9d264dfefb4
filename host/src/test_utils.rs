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

//! Helpers for running the bootstrapper against locally reachable fakes.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use etb_core::config::{ConsensusClient, ExecutionClient};

/// Validators per node in local test networks.
pub const LOCAL_VALIDATORS_PER_NODE: u64 = 8;

/// A client collection of a local test network.
#[derive(Debug, Clone, Copy)]
pub struct LocalCollection<'a> {
    pub name: &'a str,
    pub execution: ExecutionClient,
    pub consensus: ConsensusClient,
    pub num_nodes: u64,
}

impl<'a> LocalCollection<'a> {
    pub fn new(
        name: &'a str,
        execution: ExecutionClient,
        consensus: ConsensusClient,
        num_nodes: u64,
    ) -> Self {
        Self {
            name,
            execution,
            consensus,
            num_nodes,
        }
    }

    pub fn geth_lighthouse(name: &'a str, num_nodes: u64) -> Self {
        Self::new(name, ExecutionClient::Geth, ConsensusClient::Lighthouse, num_nodes)
    }
}

/// An etb-config whose files live under `root` and whose clients all listen on `port` of
/// distinct loopback addresses, `127.0.0.10` onwards.
pub fn local_testnet_yaml(root: &Path, port: u16, collections: &[LocalCollection]) -> String {
    let root = root.display();
    let mut yaml = format!(
        r#"docker:
  network-name: etb-test
  ip-subnet: 127.0.0.0/24
files:
  testnet-root: {root}
  geth-genesis-file: {root}/geth-genesis.json
  besu-genesis-file: {root}/besu-genesis.json
  nethermind-genesis-file: {root}/nethermind-genesis.json
  consensus-config-file: {root}/config.yaml
  consensus-genesis-file: {root}/genesis.ssz
  consensus-bootnode-file: {root}/consensus-bootnodes.txt
  etb-config-file: {root}/etb-config.yaml
  local-testnet-dir: {root}/local-testnet
  docker-compose-file: {root}/docker-compose.yaml
  etb-config-checkpoint-file: {root}/etb-config-checkpoint.txt
  consensus-checkpoint-file: {root}/consensus-checkpoint.txt
  execution-checkpoint-file: {root}/execution-checkpoint.txt
  consensus-bootnode-checkpoint-file: {root}/consensus-bootnode-checkpoint.txt
  deposit-contract-deployment-block-hash-file: {root}/deposit-contract-deployment-block-hash.txt
  deposit-contract-deployment-block-number-file: {root}/deposit-contract-deployment-block-number.txt
  deposit-contract-bytecode-file: {root}/deposit_contract.hex
testnet-config:
  deposit-contract-address: "0x8c594691c0e592ffa21f153a16ae41db5befcaaa"
  execution-layer: {{}}
  consensus-layer:
    preset-base: minimal
    phase0-fork-epoch: 0
    altair-fork-epoch: 0
    bellatrix-fork-epoch: 0
    capella-fork-epoch: 0
generic-instances: {{}}
"#
    );

    let mut execution = String::from("execution-configs:\n");
    let mut consensus = String::from("consensus-configs:\n");
    let mut instances = String::from("client-instances:\n");
    let mut offset = 0;
    for (ndx, collection) in collections.iter().enumerate() {
        let name = collection.name;
        // writing to a String cannot fail
        let _ = write!(
            execution,
            "  {name}-execution:\n    client: {}\n    http-port: {port}\n",
            collection.execution
        );
        let _ = write!(
            consensus,
            "  {name}-consensus:\n    client: {}\n    beacon-api-port: {port}\n    num-validators: {LOCAL_VALIDATORS_PER_NODE}\n",
            collection.consensus
        );
        let _ = write!(
            instances,
            "  {name}:\n    start-ip-address: 127.0.0.{}\n    num-nodes: {}\n    validator-offset-start: {offset}\n    execution-config: {name}-execution\n    consensus-config: {name}-consensus\n",
            10 + 10 * ndx,
            collection.num_nodes
        );
        offset += collection.num_nodes * LOCAL_VALIDATORS_PER_NODE;
    }
    yaml.push_str(&execution);
    yaml.push_str(&consensus);
    yaml.push_str(&instances);
    yaml
}

/// Writes an executable `#!/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write fake tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("failed to make fake tool executable");
    path
}

/// Stand-in for `eth2-val-tools keystores` producing every client specific layout.
pub const FAKE_ETH2_VAL_TOOLS: &str = r#"
out=""
prysm=""
min=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out-loc) out="$2"; shift ;;
    --prysm-pass) prysm="$2"; shift ;;
    --source-min) min="$2"; shift ;;
  esac
  shift
done
for d in keys teku-keys nimbus-keys; do
  mkdir -p "$out/$d/0x$min"
  echo "keystore $min" > "$out/$d/0x$min/voting-keystore.json"
done
for d in secrets teku-secrets lodestar-secrets; do
  mkdir -p "$out/$d"
  echo "secret $min" > "$out/$d/0x$min"
done
if [ -n "$prysm" ]; then
  mkdir -p "$out/prysm/direct/accounts"
  echo "$prysm" > "$out/prysm/direct/accounts/all-accounts.keystore.json"
  echo "{}" > "$out/prysm/keymanageropts.json"
fi
"#;

/// Stand-in for `eth2-testnet-genesis`: records its arguments next to the state it writes.
pub const FAKE_ETH2_TESTNET_GENESIS: &str = r#"
out=""
args="$*"
while [ $# -gt 0 ]; do
  case "$1" in
    --state-output) out="$2"; shift ;;
  esac
  shift
done
echo "$args" > "$out.args"
printf 'ssz-genesis-state' > "$out"
echo "generated genesis state" >&2
"#;

#[cfg(test)]
pub(crate) fn local_testnet(
    port: u16,
    collections: &[LocalCollection],
) -> (tempfile::TempDir, etb_core::EtbConfig) {
    let dir = tempfile::tempdir().unwrap();
    let yaml = local_testnet_yaml(dir.path(), port, collections);
    let config = etb_core::EtbConfig::from_yaml_str(&yaml).unwrap();
    (dir, config)
}

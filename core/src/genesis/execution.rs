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

//! Execution-layer genesis documents for geth/reth, besu and nethermind.
//!
//! All three are rendered from one [ExecutionGenesis], so they describe the same chain: same
//! chain id, same allocations, same fork activations.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use chainspec::WEI_PER_ETH;
use serde::Serialize;
use serde_json::{Value, json};

use super::DepositContract;
use crate::{EtbConfig, GenesisError, keys::premine_keys};

/// Number of single-wei accounts allocated at `0x00..00` through `0x00..ff`.
const NUM_PRECOMPILE_ALLOCS: u16 = 256;

const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const GAS_LIMIT: &str = "0x400000";
const NONCE: &str = "0x1234";

/// The merge happens at genesis: terminal total difficulty is 0.
pub const MERGE_FORK_BLOCK: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenesisAccount {
    #[serde(serialize_with = "decimal")]
    pub balance: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<String, String>,
}

fn decimal<S: serde::Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

impl GenesisAccount {
    fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            code: None,
            storage: BTreeMap::new(),
        }
    }
}

fn address_key(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionGenesis {
    pub chain_id: u64,
    pub network_id: u64,
    pub timestamp: u64,
    pub shanghai_time: Option<u64>,
    pub cancun_time: Option<u64>,
    /// Lowercase `0x` address to account.
    pub alloc: BTreeMap<String, GenesisAccount>,
}

impl ExecutionGenesis {
    /// Requires the genesis time to be set.
    pub fn new(config: &EtbConfig, deposit_contract: &DepositContract) -> Result<Self, GenesisError> {
        let execution = &config.testnet_config.execution_layer;
        let mut alloc = BTreeMap::new();

        for n in 0..NUM_PRECOMPILE_ALLOCS {
            let address = Address::with_last_byte(n as u8);
            alloc.insert(address_key(&address), GenesisAccount::with_balance(U256::from(1)));
        }

        for key in premine_keys(execution)? {
            let eth = execution.premines.get(&key.path).copied().unwrap_or_default();
            let wei = U256::from(eth) * U256::from(WEI_PER_ETH);
            alloc.insert(key.address_hex(), GenesisAccount::with_balance(wei));
        }

        alloc.insert(
            address_key(&deposit_contract.address),
            GenesisAccount {
                balance: U256::ZERO,
                code: Some(deposit_contract.code_hex()),
                storage: deposit_contract
                    .storage()
                    .into_iter()
                    .map(|(slot, value)| {
                        (format!("0x{}", hex::encode(slot)), format!("0x{}", hex::encode(value)))
                    })
                    .collect(),
            },
        );

        Ok(Self {
            chain_id: execution.chain_id,
            network_id: execution.network_id,
            timestamp: config.genesis_time()?,
            shanghai_time: config.shanghai_time()?,
            cancun_time: config.cancun_time()?,
            alloc,
        })
    }

    fn insert_fork_times(&self, config: &mut serde_json::Map<String, Value>) {
        if let Some(time) = self.shanghai_time {
            config.insert("shanghaiTime".into(), time.into());
        }
        if let Some(time) = self.cancun_time {
            config.insert("cancunTime".into(), time.into());
        }
    }

    /// Legacy block forks, all active at genesis.
    fn block_forks() -> serde_json::Map<String, Value> {
        [
            "homesteadBlock",
            "eip150Block",
            "eip155Block",
            "eip158Block",
            "byzantiumBlock",
            "constantinopleBlock",
            "petersburgBlock",
            "istanbulBlock",
            "berlinBlock",
            "londonBlock",
        ]
        .into_iter()
        .map(|fork| (fork.to_string(), Value::from(0)))
        .collect()
    }

    /// geth and reth genesis.
    pub fn geth(&self) -> Value {
        let mut config = serde_json::Map::new();
        config.insert("chainId".into(), self.chain_id.into());
        config.extend(Self::block_forks());
        config.insert("arrowGlacierBlock".into(), 0.into());
        config.insert("grayGlacierBlock".into(), 0.into());
        config.insert("mergeForkBlock".into(), MERGE_FORK_BLOCK.into());
        config.insert("terminalTotalDifficulty".into(), 0.into());
        config.insert("terminalTotalDifficultyPassed".into(), true.into());
        self.insert_fork_times(&mut config);

        json!({
            "config": config,
            "alloc": self.alloc,
            "coinbase": ZERO_ADDRESS,
            "difficulty": "0x01",
            "extraData": "",
            "gasLimit": GAS_LIMIT,
            "nonce": NONCE,
            "mixhash": ZERO_HASH,
            "parentHash": ZERO_HASH,
            "timestamp": format!("{:#x}", self.timestamp),
        })
    }

    pub fn besu(&self) -> Value {
        let mut config = serde_json::Map::new();
        config.insert("chainId".into(), self.chain_id.into());
        config.extend(Self::block_forks());
        config.insert("mergeNetSplitBlock".into(), MERGE_FORK_BLOCK.into());
        config.insert("terminalTotalDifficulty".into(), 0.into());
        self.insert_fork_times(&mut config);
        config.insert("ethash".into(), json!({}));

        json!({
            "config": config,
            "alloc": self.alloc,
            "coinbase": ZERO_ADDRESS,
            "difficulty": "0x01",
            "extraData": "0x",
            "gasLimit": GAS_LIMIT,
            "nonce": NONCE,
            "mixHash": ZERO_HASH,
            "parentHash": ZERO_HASH,
            "timestamp": format!("{:#x}", self.timestamp),
            "baseFeePerGas": "0x7",
        })
    }

    /// Nethermind chainspec: every transition is a hex string.
    pub fn nethermind(&self) -> Value {
        let hex = |n: u64| format!("{n:#x}");
        let mut params = serde_json::Map::new();
        for (key, value) in [
            ("gasLimitBoundDivisor", "0x400"),
            ("registrar", ZERO_ADDRESS),
            ("accountStartNonce", "0x0"),
            ("maximumExtraDataSize", "0xffff"),
            ("minGasLimit", "0x1388"),
        ] {
            params.insert(key.into(), value.into());
        }
        params.insert("chainID".into(), hex(self.chain_id).into());
        params.insert("networkID".into(), hex(self.network_id).into());
        params.insert("MergeForkIdTransition".into(), hex(MERGE_FORK_BLOCK).into());
        params.insert("terminalTotalDifficulty".into(), "0x0".into());
        for eip in [
            "eip150", "eip158", "eip160", "eip161abc", "eip161d", "eip155", "eip140", "eip211",
            "eip214", "eip658", "eip145", "eip1014", "eip1052", "eip1283", "eip1283Disable",
            "eip152", "eip1108", "eip1344", "eip1884", "eip2028", "eip2200", "eip2565",
            "eip2929", "eip2930", "eip1559", "eip3198", "eip3529", "eip3541",
        ] {
            params.insert(format!("{eip}Transition"), "0x0".into());
        }
        if let Some(time) = self.shanghai_time {
            for eip in ["eip3651", "eip3855", "eip3860", "eip4895"] {
                params.insert(format!("{eip}TransitionTimestamp"), hex(time).into());
            }
        }
        if let Some(time) = self.cancun_time {
            for eip in ["eip1153", "eip4788", "eip4844", "eip5656", "eip6780"] {
                params.insert(format!("{eip}TransitionTimestamp"), hex(time).into());
            }
        }

        json!({
            "name": "etb-testnet",
            "engine": { "Ethash": {} },
            "params": params,
            "genesis": {
                "seal": {
                    "ethereum": {
                        "nonce": NONCE,
                        "mixHash": ZERO_HASH,
                    }
                },
                "difficulty": "0x01",
                "author": ZERO_ADDRESS,
                "timestamp": hex(self.timestamp),
                "parentHash": ZERO_HASH,
                "extraData": "0x",
                "gasLimit": GAS_LIMIT,
            },
            "accounts": self.alloc,
            "nodes": [],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::MINIMAL_CONFIG;

    fn build(extra_consensus: &str) -> ExecutionGenesis {
        let doc = MINIMAL_CONFIG.replace(
            "    capella-fork-epoch: 0\n",
            &format!("    capella-fork-epoch: 1\n{extra_consensus}"),
        );
        let mut config = EtbConfig::from_yaml_str(&doc).unwrap();
        config.set_genesis_time(1_000);
        let contract = DepositContract::new(
            config.testnet_config.deposit_contract_address,
            vec![0x60, 0x80],
        );
        ExecutionGenesis::new(&config, &contract).unwrap()
    }

    fn hex_u64(value: &Value) -> u64 {
        u64::from_str_radix(value.as_str().unwrap().trim_start_matches("0x"), 16).unwrap()
    }

    #[test]
    fn allocations() {
        let genesis = build("");
        // 256 single-wei accounts, 4 default premines, the deposit contract
        assert_eq!(genesis.alloc.len(), 256 + 4 + 1);
        assert_eq!(
            genesis.alloc["0x00000000000000000000000000000000000000ff"].balance,
            U256::from(1)
        );
        let premined = genesis
            .alloc
            .values()
            .filter(|account| account.balance == U256::from(100_000_000u64) * U256::from(WEI_PER_ETH))
            .count();
        assert_eq!(premined, 4);

        let contract = &genesis.alloc["0x8c594691c0e592ffa21f153a16ae41db5befcaaa"];
        assert_eq!(contract.code.as_deref(), Some("0x6080"));
        assert_eq!(contract.storage.len(), 31);
    }

    #[test]
    fn fork_times_follow_consensus_epochs() {
        // minimal preset: capella at epoch 1 is 8 slots of 6 seconds after genesis
        let genesis = build("");
        assert_eq!(genesis.timestamp, 1_000);
        assert_eq!(genesis.shanghai_time, Some(1_048));
        assert_eq!(genesis.cancun_time, None);

        let geth = genesis.geth();
        assert_eq!(geth["config"]["shanghaiTime"], 1_048);
        assert!(geth["config"].get("cancunTime").is_none());

        let genesis = build("    deneb-fork-epoch: 2\n");
        assert_eq!(genesis.cancun_time, Some(1_096));
        assert_eq!(genesis.nethermind()["params"]["eip4844TransitionTimestamp"], "0x448");
    }

    #[test]
    fn all_formats_describe_the_same_chain() {
        let genesis = build("");
        let geth = genesis.geth();
        let besu = genesis.besu();
        let nethermind = genesis.nethermind();

        assert_eq!(geth["config"]["chainId"], 1337);
        assert_eq!(besu["config"]["chainId"], 1337);
        assert_eq!(hex_u64(&nethermind["params"]["chainID"]), 1337);

        assert_eq!(geth["config"]["terminalTotalDifficulty"], 0);
        assert_eq!(besu["config"]["terminalTotalDifficulty"], 0);
        assert_eq!(hex_u64(&nethermind["params"]["terminalTotalDifficulty"]), 0);

        assert_eq!(geth["config"]["mergeForkBlock"], 0);
        assert_eq!(besu["config"]["mergeNetSplitBlock"], 0);
        assert_eq!(hex_u64(&nethermind["params"]["MergeForkIdTransition"]), 0);

        assert_eq!(geth["config"]["shanghaiTime"], besu["config"]["shanghaiTime"]);
        assert_eq!(
            hex_u64(&nethermind["params"]["eip4895TransitionTimestamp"]),
            geth["config"]["shanghaiTime"].as_u64().unwrap()
        );

        assert_eq!(geth["alloc"], besu["alloc"]);
        assert_eq!(geth["alloc"], nethermind["accounts"]);
    }
}

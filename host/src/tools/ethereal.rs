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

use alloy_primitives::Address;

use super::{Tool, ToolError};

/// Submits deposits to the deposit contract through an execution client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ethereal {
    tool: Tool,
}

impl Default for Ethereal {
    fn default() -> Self {
        Self::new(Tool::new("ethereal"))
    }
}

/// `ethereal beacon deposit`
#[derive(Debug, Clone)]
pub struct BeaconDeposit<'a> {
    /// Execution client JSON-RPC endpoint.
    pub connection: &'a str,
    /// Deposit data JSON as produced by `eth2-val-tools deposit-data`.
    pub data: &'a str,
    pub chain_id: u64,
    pub contract: Address,
    pub from: Address,
    pub private_key: &'a str,
    pub wait: bool,
}

impl BeaconDeposit<'_> {
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "beacon",
            "deposit",
            "--allow-duplicate-deposit",
            "--allow-excessive-deposit",
            "--allow-new-data",
            "--allow-old-data",
            "--allow-unknown-contract",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.extend([
            "--connection".into(),
            self.connection.into(),
            "--data".into(),
            self.data.into(),
            "--chainid".into(),
            format!("0x{:08x}", self.chain_id),
            "--address".into(),
            self.contract.to_string(),
            "--from".into(),
            self.from.to_string(),
            "--privatekey".into(),
            self.private_key.into(),
        ]);
        if self.wait {
            args.push("--wait".into());
        }
        args
    }
}

impl Ethereal {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    pub fn beacon_deposit(&self, deposit: &BeaconDeposit) -> Result<String, ToolError> {
        self.tool.run(deposit.args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn deposit_args() {
        let deposit = BeaconDeposit {
            connection: "http://10.0.20.10:8645",
            data: "{}",
            chain_id: 1337,
            contract: address!("8c594691c0e592ffa21f153a16ae41db5befcaaa"),
            from: address!("878705ba3f8bc32fcf7f4caa1a35e72af65cf766"),
            private_key: "0xabc",
            wait: true,
        };
        let args = deposit.args();
        assert_eq!(args[..2], ["beacon", "deposit"]);
        let chain_id = args.iter().position(|arg| arg == "--chainid").unwrap();
        assert_eq!(args[chain_id + 1], "0x00000539");
        assert_eq!(args.last().map(String::as_str), Some("--wait"));

        let no_wait = BeaconDeposit { wait: false, ..deposit }.args();
        assert!(!no_wait.contains(&"--wait".to_string()));
    }
}

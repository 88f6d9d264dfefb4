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

use std::{ops::Range, path::Path};

use tracing::info;

use super::{Tool, ToolError};

/// Deposit amount of a full validator.
pub const MAX_EFFECTIVE_BALANCE_GWEI: u64 = 32_000_000_000;

/// Validator key material generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eth2ValTools {
    tool: Tool,
}

impl Default for Eth2ValTools {
    fn default() -> Self {
        Self::new(Tool::new("eth2-val-tools"))
    }
}

/// Keystores for the validators in `range`, written to `out_dir`.
#[derive(Debug, Clone)]
pub struct KeystoresRequest<'a> {
    pub mnemonic: &'a str,
    pub range: Range<u64>,
    pub out_dir: &'a Path,
    /// Also emit a prysm wallet protected by this password.
    pub prysm_password: Option<&'a str>,
}

impl KeystoresRequest<'_> {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "keystores".to_string(),
            "--source-min".into(),
            self.range.start.to_string(),
            "--source-max".into(),
            self.range.end.to_string(),
            "--source-mnemonic".into(),
            self.mnemonic.into(),
            "--out-loc".into(),
            self.out_dir.display().to_string(),
        ];
        if let Some(password) = self.prysm_password {
            args.extend(["--prysm-pass".into(), password.into()]);
        }
        args
    }
}

/// Deposit data of a single validator index.
#[derive(Debug, Clone)]
pub struct DepositDataRequest<'a> {
    pub index: u64,
    pub amount_gwei: u64,
    pub fork_version: u32,
    pub validators_mnemonic: &'a str,
    pub withdrawals_mnemonic: &'a str,
}

impl DepositDataRequest<'_> {
    pub fn args(&self) -> Vec<String> {
        vec![
            "deposit-data".to_string(),
            "--amount".into(),
            self.amount_gwei.to_string(),
            "--fork-version".into(),
            format!("0x{:08x}", self.fork_version),
            "--source-min".into(),
            self.index.to_string(),
            "--source-max".into(),
            (self.index + 1).to_string(),
            "--validators-mnemonic".into(),
            self.validators_mnemonic.into(),
            "--withdrawals-mnemonic".into(),
            self.withdrawals_mnemonic.into(),
        ]
    }
}

impl Eth2ValTools {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    pub fn keystores(&self, request: &KeystoresRequest) -> Result<(), ToolError> {
        self.tool.run(request.args())?;
        info!(
            out_dir = %request.out_dir.display(),
            "generated keystores for validators {:?}",
            request.range
        );
        Ok(())
    }

    /// Returns the deposit data JSON printed by the tool.
    pub fn deposit_data(&self, request: &DepositDataRequest) -> Result<String, ToolError> {
        self.tool.run(request.args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystores_args() {
        let request = KeystoresRequest {
            mnemonic: "test test",
            range: 8..16,
            out_dir: Path::new("/data/local-testnet/a/node_1/keystores"),
            prysm_password: None,
        };
        assert_eq!(
            request.args(),
            [
                "keystores",
                "--source-min",
                "8",
                "--source-max",
                "16",
                "--source-mnemonic",
                "test test",
                "--out-loc",
                "/data/local-testnet/a/node_1/keystores",
            ]
        );

        let prysm = KeystoresRequest {
            prysm_password: Some("secret"),
            ..request
        };
        assert_eq!(prysm.args()[9..], ["--prysm-pass", "secret"]);
    }

    #[test]
    fn deposit_data_covers_one_index() {
        let args = DepositDataRequest {
            index: 70,
            amount_gwei: MAX_EFFECTIVE_BALANCE_GWEI,
            fork_version: 0x0100_0666,
            validators_mnemonic: "v",
            withdrawals_mnemonic: "w",
        }
        .args();
        assert_eq!(args[1..3], ["--amount", "32000000000"]);
        assert_eq!(args[3..5], ["--fork-version", "0x01000666"]);
        assert_eq!(args[5..9], ["--source-min", "70", "--source-max", "71"]);
    }
}

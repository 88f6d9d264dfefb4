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

use std::{fs, path::Path};

use chainspec::{ForkName, PresetBase};
use serde::Serialize;
use tracing::info;

use super::{Tool, ToolError};

/// Consensus genesis state generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eth2TestnetGenesis {
    tool: Tool,
}

impl Default for Eth2TestnetGenesis {
    fn default() -> Self {
        Self::new(Tool::new("eth2-testnet-genesis"))
    }
}

#[derive(Serialize)]
struct ValidatorMnemonic<'a> {
    mnemonic: &'a str,
    count: u64,
}

/// Writes the mnemonics file consumed by the genesis tool: `count` validators from `mnemonic`.
pub fn write_validators_yaml(path: &Path, mnemonic: &str, count: u64) -> Result<(), ToolError> {
    let yaml = serde_yaml::to_string(&[ValidatorMnemonic { mnemonic, count }])?;
    fs::write(path, yaml).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Inputs of a genesis state in effect at `fork`.
#[derive(Debug, Clone)]
pub struct GenesisStateRequest<'a> {
    pub fork: ForkName,
    pub preset: PresetBase,
    pub validators_yaml: &'a Path,
    pub config: &'a Path,
    /// Execution genesis the payload header is derived from; used from bellatrix on.
    pub eth1_config: &'a Path,
    pub state_output: &'a Path,
}

impl GenesisStateRequest<'_> {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.fork.as_str().to_string(),
            "--mnemonics".into(),
            self.validators_yaml.display().to_string(),
            "--config".into(),
            self.config.display().to_string(),
            "--state-output".into(),
            self.state_output.display().to_string(),
        ];
        for fork in ForkName::ALL
            .into_iter()
            .filter(|fork| *fork <= self.fork && *fork != ForkName::Sharding)
        {
            args.push(format!("--preset-{}", fork.as_str()));
            args.push(self.preset.as_str().into());
        }
        if self.fork >= ForkName::Bellatrix {
            args.push("--eth1-config".into());
            args.push(self.eth1_config.display().to_string());
        }
        args
    }
}

impl Eth2TestnetGenesis {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    /// Produces the genesis state and returns its ssz bytes.
    pub fn genesis_state(&self, request: &GenesisStateRequest) -> Result<Vec<u8>, ToolError> {
        self.tool
            .run_for_artifact(request.args(), request.state_output)?;
        let state = fs::read(request.state_output).map_err(|source| ToolError::Io {
            path: request.state_output.to_path_buf(),
            source,
        })?;
        info!(
            fork = %request.fork,
            path = %request.state_output.display(),
            bytes = state.len(),
            "generated consensus genesis state"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(fork: ForkName) -> GenesisStateRequest<'static> {
        GenesisStateRequest {
            fork,
            preset: PresetBase::Minimal,
            validators_yaml: Path::new("/data/validators.yaml"),
            config: Path::new("/data/config.yaml"),
            eth1_config: Path::new("/data/geth-genesis.json"),
            state_output: Path::new("/data/genesis.ssz"),
        }
    }

    #[test]
    fn phase0_genesis() {
        assert_eq!(
            request(ForkName::Phase0).args(),
            [
                "phase0",
                "--mnemonics",
                "/data/validators.yaml",
                "--config",
                "/data/config.yaml",
                "--state-output",
                "/data/genesis.ssz",
                "--preset-phase0",
                "minimal",
            ]
        );
    }

    #[test]
    fn capella_genesis() {
        let args = request(ForkName::Capella).args();
        assert_eq!(args[0], "capella");
        let presets: Vec<_> = args
            .iter()
            .filter(|arg| arg.starts_with("--preset-"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            presets,
            ["--preset-phase0", "--preset-altair", "--preset-bellatrix", "--preset-capella"]
        );
        assert_eq!(args[args.len() - 2..], ["--eth1-config", "/data/geth-genesis.json"]);
    }

    #[test]
    fn validators_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validators.yaml");
        write_validators_yaml(&path, "abandon abandon", 64).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["mnemonic"].as_str(), Some("abandon abandon"));
        assert_eq!(parsed[0]["count"].as_u64(), Some(64));
    }
}

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

use std::{net::Ipv4Addr, path::PathBuf};

use chainspec::ForkName;

/// Structural or semantic problems in an etb-config document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing required key `{0}`")]
    MissingKey(String),
    #[error("invalid value for `{path}`: {reason}")]
    InvalidValue { path: String, reason: String },
    #[error("`{path}` references unknown {kind} `{name}`")]
    UnknownReference {
        path: String,
        kind: &'static str,
        name: String,
    },
    #[error("invalid deposit-contract-address `{0}`: expected a 20-byte hex string")]
    InvalidAddress(String),
    #[error("validator ranges of {first} {first_range:?} and {second} {second_range:?} overlap")]
    OverlappingValidators {
        first: String,
        first_range: std::ops::Range<u64>,
        second: String,
        second_range: std::ops::Range<u64>,
    },
    #[error("duplicate ip address {ip} used by {first} and {second}")]
    DuplicateIpAddress {
        ip: Ipv4Addr,
        first: String,
        second: String,
    },
    #[error("ip address {ip} of {instance} is outside of subnet {subnet}")]
    IpOutsideSubnet {
        ip: Ipv4Addr,
        instance: String,
        subnet: String,
    },
    #[error("execution config `{config}`: {reason}")]
    EnginePorts { config: String, reason: &'static str },
    #[error("refusing to write config: checkpoint {0} exists")]
    CheckpointExists(PathBuf),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

/// A derived invariant of the testnet does not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("no consensus fork is scheduled at epoch 0")]
    NoGenesisFork,
    #[error("duplicate instance name `{0}`")]
    DuplicateInstanceName(String),
    #[error("fork version of {next} (0x{next_version:08x}) must be greater than {prev} (0x{prev_version:08x})")]
    ForkVersionOrder {
        prev: ForkName,
        prev_version: u32,
        next: ForkName,
        next_version: u32,
    },
    #[error("fork epoch of {next} ({next_epoch}) precedes {prev} ({prev_epoch})")]
    ForkEpochOrder {
        prev: ForkName,
        prev_epoch: u64,
        next: ForkName,
        next_epoch: u64,
    },
    #[error("genesis time has not been set")]
    GenesisTimeUnset,
}

/// Failure deriving a premine account.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid derivation path `{path}`: {source}")]
    DerivationPath {
        path: String,
        #[source]
        source: alloy_signer_local::LocalSignerError,
    },
    #[error("could not derive key from mnemonic: {0}")]
    Mnemonic(#[from] alloy_signer_local::LocalSignerError),
}

/// Failure producing genesis artifacts.
#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid deposit contract bytecode: {0}")]
    Bytecode(#[from] hex::FromHexError),
}

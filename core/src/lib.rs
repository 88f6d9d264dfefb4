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

//! Configuration and derivation engine of the ethereum testnet bootstrapper.
//!
//! Everything in this crate is synchronous and network-free: it turns an etb-config document
//! into typed instances, genesis artifacts and the docker-compose manifest.

pub mod config;
pub mod defaults;
mod error;
pub mod genesis;
pub mod keys;
mod lookup;
pub mod manifest;

pub use config::EtbConfig;
pub use error::*;
pub use genesis::{DepositContract, ExecutionGenesis, consensus_config_yaml};
pub use keys::PremineKey;
pub use manifest::Manifest;

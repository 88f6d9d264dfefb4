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

//! Consensus presets and the fork schedule vocabulary shared by every etb crate.

mod fork;
mod preset;

pub use fork::*;
pub use preset::*;

pub type Epoch = u64;
pub type Slot = u64;

/// Epoch value meaning "never scheduled".
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;

/// Terminal block hash used by every testnet: the merge happens at genesis.
pub const TERMINAL_BLOCK_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Wei per ether.
pub const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;

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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Epoch, FAR_FUTURE_EPOCH};

/// Consensus forks in activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Sharding,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fork name `{0}`")]
pub struct UnknownFork(pub String);

impl ForkName {
    pub const ALL: [ForkName; 6] = [
        ForkName::Phase0,
        ForkName::Altair,
        ForkName::Bellatrix,
        ForkName::Capella,
        ForkName::Deneb,
        ForkName::Sharding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForkName::Phase0 => "phase0",
            ForkName::Altair => "altair",
            ForkName::Bellatrix => "bellatrix",
            ForkName::Capella => "capella",
            ForkName::Deneb => "deneb",
            ForkName::Sharding => "sharding",
        }
    }

    /// The fork that follows this one, if any.
    pub fn next(&self) -> Option<ForkName> {
        Self::ALL.get(*self as usize + 1).copied()
    }
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForkName {
    type Err = UnknownFork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|fork| fork.as_str() == s)
            .ok_or_else(|| UnknownFork(s.to_string()))
    }
}

/// A scheduled consensus fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsensusFork {
    pub name: ForkName,
    pub version: u32,
    pub epoch: Epoch,
}

impl ConsensusFork {
    pub const fn new(name: ForkName, version: u32, epoch: Epoch) -> Self {
        Self {
            name,
            version,
            epoch,
        }
    }

    /// Returns `false` for forks at [FAR_FUTURE_EPOCH].
    pub fn is_scheduled(&self) -> bool {
        self.epoch != FAR_FUTURE_EPOCH
    }

    /// The fork version as it appears in a `config.yaml`.
    pub fn version_hex(&self) -> String {
        format!("0x{:08x}", self.version)
    }
}

impl fmt::Display for ConsensusFork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scheduled() {
            write!(f, "{} ({}) @ epoch {}", self.name, self.version_hex(), self.epoch)
        } else {
            write!(f, "{} ({}) never", self.name, self.version_hex())
        }
    }
}

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

//! Genesis allocation of the deposit contract.

use std::{collections::BTreeMap, fs, path::Path};

use alloy_primitives::{Address, B256};
use sha2::{Digest, Sha256};

use crate::GenesisError;

pub const DEPOSIT_CONTRACT_TREE_DEPTH: usize = 32;

/// Storage slot of the zero hash at depth 1; depths 1..=31 occupy consecutive slots.
const FIRST_ZERO_HASH_SLOT: u8 = 0x22;

/// Zero hashes of the deposit Merkle tree: `z[0] = 0`, `z[i + 1] = sha256(z[i] ++ z[i])`.
pub fn zero_hashes() -> [B256; DEPOSIT_CONTRACT_TREE_DEPTH] {
    let mut hashes = [B256::ZERO; DEPOSIT_CONTRACT_TREE_DEPTH];
    for depth in 1..DEPOSIT_CONTRACT_TREE_DEPTH {
        let mut hasher = Sha256::new();
        hasher.update(hashes[depth - 1]);
        hasher.update(hashes[depth - 1]);
        hashes[depth] = B256::from_slice(&hasher.finalize());
    }
    hashes
}

/// Deposit contract code plus the storage it holds right after deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositContract {
    pub address: Address,
    pub code: Vec<u8>,
}

impl DepositContract {
    pub fn new(address: Address, code: Vec<u8>) -> Self {
        Self { address, code }
    }

    /// Parses hex-encoded runtime code, with or without a `0x` prefix.
    pub fn from_hex(address: Address, text: &str) -> Result<Self, GenesisError> {
        let text = text.trim();
        let digits = text.strip_prefix("0x").unwrap_or(text);
        Ok(Self::new(address, hex::decode(digits)?))
    }

    pub fn load(address: Address, path: &Path) -> Result<Self, GenesisError> {
        let text = fs::read_to_string(path).map_err(|source| GenesisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_hex(address, &text)
    }

    /// `slot -> zero hash` for depths 1..=31 at slots `0x22..=0x40`.
    pub fn storage(&self) -> BTreeMap<B256, B256> {
        zero_hashes()
            .into_iter()
            .enumerate()
            .skip(1)
            .map(|(depth, hash)| {
                let slot = FIRST_ZERO_HASH_SLOT + (depth as u8 - 1);
                (B256::with_last_byte(slot), hash)
            })
            .collect()
    }

    pub fn code_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.code))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::b256;

    use super::*;

    #[test]
    fn known_zero_hashes() {
        let hashes = zero_hashes();
        assert_eq!(hashes[0], B256::ZERO);
        assert_eq!(
            hashes[1],
            b256!("f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a92759fb4b")
        );
        assert_eq!(
            hashes[2],
            b256!("db56114e00fdd4c1f85c892bf35ac9a89289aaecb1ebd0a96cde606a748b5d71")
        );
    }

    #[test]
    fn storage_layout() {
        let contract = DepositContract::new(Address::ZERO, vec![0x60, 0x80]);
        let storage = contract.storage();
        assert_eq!(storage.len(), 31);
        assert_eq!(storage[&B256::with_last_byte(0x22)], zero_hashes()[1]);
        assert_eq!(storage[&B256::with_last_byte(0x40)], zero_hashes()[31]);
        assert!(!storage.contains_key(&B256::with_last_byte(0x41)));
    }

    #[test]
    fn parses_bytecode_text() {
        let contract = DepositContract::from_hex(Address::ZERO, "0x6080604052\n").unwrap();
        assert_eq!(contract.code, vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(contract.code_hex(), "0x6080604052");
        assert!(DepositContract::from_hex(Address::ZERO, "0xzz").is_err());
    }
}

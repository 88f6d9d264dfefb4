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

//! Premine account derivation.

use alloy_primitives::{Address, B256};
use alloy_signer_local::{MnemonicBuilder, coins_bip39::English};

use crate::{KeyError, config::ExecutionLayerConfig};

/// A funded execution-layer account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremineKey {
    pub path: String,
    pub address: Address,
    pub private_key: B256,
}

impl PremineKey {
    /// Derives the secp256k1 key at `path` from `mnemonic`, using `passphrase` as the BIP-39
    /// password when it is non-empty.
    pub fn derive(mnemonic: &str, path: &str, passphrase: &str) -> Result<Self, KeyError> {
        let mut builder = MnemonicBuilder::<English>::default()
            .phrase(mnemonic)
            .derivation_path(path)
            .map_err(|source| KeyError::DerivationPath {
                path: path.to_string(),
                source,
            })?;
        if !passphrase.is_empty() {
            builder = builder.password(passphrase);
        }
        let signer = builder.build()?;
        Ok(Self {
            path: path.to_string(),
            address: signer.address(),
            private_key: B256::from_slice(signer.credential().to_bytes().as_slice()),
        })
    }

    /// Lowercase `0x`-prefixed address, as written into genesis files.
    pub fn address_hex(&self) -> String {
        format!("0x{}", hex::encode(self.address))
    }

    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.private_key))
    }
}

/// Every premine account of the execution layer, ordered by derivation path.
pub fn premine_keys(config: &ExecutionLayerConfig) -> Result<Vec<PremineKey>, KeyError> {
    config
        .premines
        .keys()
        .map(|path| PremineKey::derive(&config.account_mnemonic, path, &config.keystore_passphrase))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn derives_known_account() {
        let key = PremineKey::derive(TEST_MNEMONIC, "m/44'/60'/0'/0/0", "").unwrap();
        assert_eq!(
            key.address,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
        assert_eq!(key.address_hex(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(
            key.private_key_hex(),
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
    }

    #[test]
    fn distinct_paths_give_distinct_keys() {
        let keys: Vec<_> = (0..4)
            .map(|i| PremineKey::derive(TEST_MNEMONIC, &format!("m/44'/60'/0'/0/{i}"), "").unwrap())
            .collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a.address, b.address);
            }
        }
    }

    #[test]
    fn passphrase_changes_the_key() {
        let plain = PremineKey::derive(TEST_MNEMONIC, "m/44'/60'/0'/0/0", "").unwrap();
        let salted = PremineKey::derive(TEST_MNEMONIC, "m/44'/60'/0'/0/0", "testnet-password").unwrap();
        assert_ne!(plain.address, salted.address);
    }

    #[test]
    fn deterministic() {
        let a = PremineKey::derive(TEST_MNEMONIC, "m/44'/60'/0'/0/7", "pw").unwrap();
        let b = PremineKey::derive(TEST_MNEMONIC, "m/44'/60'/0'/0/7", "pw").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_derivation_path() {
        let err = PremineKey::derive(TEST_MNEMONIC, "m/44'/sixty'/0'/0/0", "").unwrap_err();
        assert!(matches!(err, KeyError::DerivationPath { .. }));
    }
}

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

//! Key-normalizing access to a raw YAML document.
//!
//! Keys are looked up by their kebab-case spelling first and then by the snake-case
//! spelling, so `num-nodes` and `num_nodes` address the same entry. Every accessor reports
//! failures by the dotted path of the key.

use serde_yaml::{Mapping, Value};

use crate::ConfigError;

#[derive(Debug, Clone)]
pub(crate) struct Section<'a> {
    path: String,
    map: Option<&'a Mapping>,
}

impl<'a> Section<'a> {
    pub fn root(value: &'a Value) -> Result<Self, ConfigError> {
        match value {
            Value::Mapping(map) => Ok(Self {
                path: String::new(),
                map: Some(map),
            }),
            _ => Err(ConfigError::InvalidValue {
                path: "<root>".into(),
                reason: "expected a mapping".into(),
            }),
        }
    }

    /// A section that behaves as an empty mapping.
    pub fn empty(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            map: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn lookup(&self, key: &str) -> Option<&'a Value> {
        let map = self.map?;
        map.get(key)
            .or_else(|| map.get(key.replace('-', "_").as_str()))
            .filter(|value| !value.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.lookup(key)
    }

    pub fn child(&self, key: &str) -> Result<Section<'a>, ConfigError> {
        self.optional_child(key)?
            .ok_or_else(|| ConfigError::MissingKey(self.key_path(key)))
    }

    pub fn optional_child(&self, key: &str) -> Result<Option<Section<'a>>, ConfigError> {
        let path = self.key_path(key);
        match self.lookup(key) {
            None => Ok(None),
            Some(Value::Mapping(map)) => Ok(Some(Section {
                path,
                map: Some(map),
            })),
            Some(_) => Err(ConfigError::InvalidValue {
                path,
                reason: "expected a mapping".into(),
            }),
        }
    }

    /// Like [Section::optional_child], but an absent key yields an empty section.
    pub fn child_or_empty(&self, key: &str) -> Result<Section<'a>, ConfigError> {
        Ok(self
            .optional_child(key)?
            .unwrap_or_else(|| Section::empty(self.key_path(key))))
    }

    /// Nested section for each entry of a mapping of mappings, keyed by entry name.
    pub fn children(&self) -> Result<Vec<(String, Section<'a>)>, ConfigError> {
        self.entries()
            .map(|(name, _)| {
                let child = self.child(&name)?;
                Ok((name, child))
            })
            .collect()
    }

    /// Iterates `(key, value)` pairs in document order.
    pub fn entries(&self) -> impl Iterator<Item = (String, &'a Value)> + use<'a> {
        self.map
            .into_iter()
            .flat_map(Mapping::iter)
            .filter_map(|(key, value)| scalar_to_string(key).map(|key| (key, value)))
    }

    pub fn string(&self, key: &str) -> Result<String, ConfigError> {
        self.optional_string(key)?
            .ok_or_else(|| ConfigError::MissingKey(self.key_path(key)))
    }

    pub fn optional_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.lookup(key)
            .map(|value| {
                scalar_to_string(value).ok_or_else(|| ConfigError::InvalidValue {
                    path: self.key_path(key),
                    reason: "expected a scalar".into(),
                })
            })
            .transpose()
    }

    pub fn u64(&self, key: &str) -> Result<u64, ConfigError> {
        self.optional_u64(key)?
            .ok_or_else(|| ConfigError::MissingKey(self.key_path(key)))
    }

    pub fn optional_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.lookup(key)
            .map(|value| value_to_u64(value).ok_or_else(|| self.invalid_int(key)))
            .transpose()
    }

    pub fn optional_u16(&self, key: &str) -> Result<Option<u16>, ConfigError> {
        self.optional_u64(key)?
            .map(|value| u16::try_from(value).map_err(|_| self.invalid_int(key)))
            .transpose()
    }

    pub fn optional_u32(&self, key: &str) -> Result<Option<u32>, ConfigError> {
        self.optional_u64(key)?
            .map(|value| u32::try_from(value).map_err(|_| self.invalid_int(key)))
            .transpose()
    }

    /// A list given either as a YAML sequence or as a comma separated string.
    pub fn optional_list(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        let Some(value) = self.lookup(key) else {
            return Ok(None);
        };
        let invalid = || ConfigError::InvalidValue {
            path: self.key_path(key),
            reason: "expected a list or a comma separated string".into(),
        };
        let items = match value {
            Value::Sequence(items) => items
                .iter()
                .map(|item| scalar_to_string(item).ok_or_else(invalid))
                .collect::<Result<Vec<_>, _>>()?,
            other => scalar_to_string(other)
                .ok_or_else(invalid)?
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        };
        Ok(Some(items))
    }

    fn invalid_int(&self, key: &str) -> ConfigError {
        ConfigError::InvalidValue {
            path: self.key_path(key),
            reason: "expected an unsigned integer".into(),
        }
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integers may be written as YAML numbers, decimal strings, or `0x` hex strings.
pub(crate) fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn normalizes_snake_case_keys() {
        let value = doc("num_nodes: 3\nstart-ip-address: 10.0.0.1\n");
        let section = Section::root(&value).unwrap();
        assert_eq!(section.u64("num-nodes").unwrap(), 3);
        assert_eq!(section.string("start-ip-address").unwrap(), "10.0.0.1");
    }

    #[test]
    fn missing_keys_name_their_path() {
        let value = doc("docker:\n  ip-subnet: 10.0.0.0/16\n");
        let root = Section::root(&value).unwrap();
        let docker = root.child("docker").unwrap();
        let err = docker.string("network-name").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref p) if p == "docker.network-name"));
        assert!(matches!(
            root.child("testnet-config"),
            Err(ConfigError::MissingKey(ref p)) if p == "testnet-config"
        ));
    }

    #[test]
    fn integers_in_several_spellings() {
        let value = doc("a: 0x01000666\nb: '0x02000666'\nc: '42'\nd: 18446744073709551615\ne: -1\n");
        let section = Section::root(&value).unwrap();
        assert_eq!(section.u64("a").unwrap(), 0x0100_0666);
        assert_eq!(section.u64("b").unwrap(), 0x0200_0666);
        assert_eq!(section.u64("c").unwrap(), 42);
        assert_eq!(section.u64("d").unwrap(), u64::MAX);
        assert!(section.u64("e").is_err());
    }

    #[test]
    fn lists_from_strings_and_sequences() {
        let value = doc("a: 'admin, eth,net'\nb: [eth, web3]\n");
        let section = Section::root(&value).unwrap();
        assert_eq!(
            section.optional_list("a").unwrap().unwrap(),
            vec!["admin", "eth", "net"]
        );
        assert_eq!(section.optional_list("b").unwrap().unwrap(), vec!["eth", "web3"]);
        assert_eq!(section.optional_list("c").unwrap(), None);
    }
}

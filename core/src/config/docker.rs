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

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::{ConfigError, defaults, lookup::Section};

/// The `docker` section: bridge network and shared volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DockerConfig {
    pub network_name: String,
    #[serde(serialize_with = "serialize_subnet")]
    pub ip_subnet: Ipv4Net,
    pub volumes: Vec<String>,
}

fn serialize_subnet<S: serde::Serializer>(net: &Ipv4Net, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(net)
}

impl DockerConfig {
    pub(crate) fn parse(section: &Section) -> Result<Self, ConfigError> {
        let subnet = section.string("ip-subnet")?;
        let ip_subnet = subnet.parse().map_err(|e: ipnet::AddrParseError| {
            ConfigError::InvalidValue {
                path: section.key_path("ip-subnet"),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            network_name: section.string("network-name")?,
            ip_subnet,
            volumes: section.optional_list("volumes")?.unwrap_or_else(|| {
                defaults::DEFAULT_DOCKER_VOLUMES
                    .iter()
                    .map(|v| v.to_string())
                    .collect()
            }),
        })
    }
}

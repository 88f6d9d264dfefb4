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

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Serialize, Serializer};

use super::Env;
use crate::{ConfigError, defaults, lookup::Section};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown client `{0}`")]
pub struct UnknownClient(pub String);

macro_rules! client_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: [$name; [$($str),+].len()] = [$($name::$variant),+];

            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $str),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownClient;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok($name::$variant),)+
                    _ => Err(UnknownClient(s.to_string())),
                }
            }
        }
    };
}

client_enum!(
    /// Execution layer client implementations.
    ExecutionClient {
        Geth => "geth",
        Reth => "reth",
        Besu => "besu",
        Nethermind => "nethermind",
    }
);

client_enum!(
    /// Consensus layer client implementations.
    ConsensusClient {
        Prysm => "prysm",
        Lighthouse => "lighthouse",
        Teku => "teku",
        Nimbus => "nimbus",
        Lodestar => "lodestar",
    }
);

fn comma_separated<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&items.join(","))
}

fn parse_client<C: FromStr<Err = UnknownClient>>(section: &Section) -> Result<C, ConfigError> {
    section
        .string("client")?
        .parse()
        .map_err(|e: UnknownClient| ConfigError::InvalidValue {
            path: section.key_path("client"),
            reason: e.to_string(),
        })
}

fn port(section: &Section, key: &str, default: u16) -> Result<u16, ConfigError> {
    Ok(section.optional_u16(key)?.unwrap_or(default))
}

/// An entry of `execution-configs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionConfig {
    #[serde(skip)]
    pub name: String,
    pub client: ExecutionClient,
    pub launcher: PathBuf,
    pub log_level: String,
    pub p2p_port: u16,
    #[serde(serialize_with = "comma_separated")]
    pub http_apis: Vec<String>,
    pub http_port: u16,
    #[serde(serialize_with = "comma_separated")]
    pub ws_apis: Vec<String>,
    pub ws_port: u16,
    pub engine_http_port: u16,
    pub engine_ws_port: u16,
    pub metric_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_rpc_snooper_proxy_port: Option<u16>,
}

impl ExecutionConfig {
    pub(crate) fn parse(name: &str, section: &Section) -> Result<Self, ConfigError> {
        let client: ExecutionClient = parse_client(section)?;
        let apis = |key: &str| -> Result<Vec<String>, ConfigError> {
            Ok(section.optional_list(key)?.unwrap_or_else(|| {
                defaults::execution_apis(client)
                    .split(',')
                    .map(str::to_string)
                    .collect()
            }))
        };
        let engine_http_port = port(
            section,
            "engine-http-port",
            defaults::DEFAULT_EXECUTION_ENGINE_HTTP_PORT,
        )?;
        let engine_ws_port = port(
            section,
            "engine-ws-port",
            defaults::engine_ws_port(client, engine_http_port),
        )?;

        let config = Self {
            name: name.to_string(),
            client,
            launcher: section
                .optional_string("launcher")?
                .unwrap_or_else(|| defaults::execution_launcher(client).to_string())
                .into(),
            log_level: section
                .optional_string("log-level")?
                .unwrap_or_else(|| defaults::execution_log_level(client).to_string()),
            p2p_port: port(section, "p2p-port", defaults::DEFAULT_EXECUTION_P2P_PORT)?,
            http_apis: apis("http-apis")?,
            http_port: port(section, "http-port", defaults::DEFAULT_EXECUTION_HTTP_PORT)?,
            ws_apis: apis("ws-apis")?,
            ws_port: port(section, "ws-port", defaults::DEFAULT_EXECUTION_WS_PORT)?,
            engine_http_port,
            engine_ws_port,
            metric_port: port(section, "metric-port", defaults::DEFAULT_EXECUTION_METRIC_PORT)?,
            json_rpc_snooper_proxy_port: section.optional_u16("json-rpc-snooper-proxy-port")?,
        };
        config.check_engine_ports()?;
        Ok(config)
    }

    fn check_engine_ports(&self) -> Result<(), ConfigError> {
        let distinct = self.engine_http_port != self.engine_ws_port;
        match (self.client, distinct) {
            (ExecutionClient::Nethermind, false) => Err(ConfigError::EnginePorts {
                config: self.name.clone(),
                reason: "nethermind requires distinct engine-http-port and engine-ws-port",
            }),
            (ExecutionClient::Nethermind, true) | (_, false) => Ok(()),
            (_, true) => Err(ConfigError::EnginePorts {
                config: self.name.clone(),
                reason: "engine-http-port and engine-ws-port must be identical",
            }),
        }
    }

    /// Whether any of the enabled HTTP APIs matches `api`, in either case.
    pub fn has_http_api(&self, api: &str) -> bool {
        self.http_apis
            .iter()
            .any(|enabled| enabled.contains(api) || enabled.contains(&api.to_uppercase()))
    }

    /// The engine port the consensus client connects to.
    pub fn cl_engine_http_port(&self) -> u16 {
        self.json_rpc_snooper_proxy_port
            .unwrap_or(self.engine_http_port)
    }

    pub fn env(&self) -> Env {
        Env::from([
            ("EXECUTION_CLIENT".into(), self.client.to_string()),
            ("EXECUTION_LAUNCHER".into(), self.launcher.display().to_string()),
            ("EXECUTION_LOG_LEVEL".into(), self.log_level.clone()),
            ("EXECUTION_P2P_PORT".into(), self.p2p_port.to_string()),
            ("EXECUTION_HTTP_APIS".into(), self.http_apis.join(",")),
            ("EXECUTION_HTTP_PORT".into(), self.http_port.to_string()),
            ("EXECUTION_WS_APIS".into(), self.ws_apis.join(",")),
            ("EXECUTION_WS_PORT".into(), self.ws_port.to_string()),
            ("EXECUTION_ENGINE_HTTP_PORT".into(), self.engine_http_port.to_string()),
            ("EXECUTION_ENGINE_WS_PORT".into(), self.engine_ws_port.to_string()),
            ("EXECUTION_METRIC_PORT".into(), self.metric_port.to_string()),
            (
                "RUN_JSON_RPC_SNOOPER".into(),
                self.json_rpc_snooper_proxy_port.is_some().to_string(),
            ),
            (
                "CL_EXECUTION_ENGINE_HTTP_PORT".into(),
                self.cl_engine_http_port().to_string(),
            ),
        ])
    }
}

/// An entry of `consensus-configs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsensusConfig {
    #[serde(skip)]
    pub name: String,
    pub client: ConsensusClient,
    pub launcher: PathBuf,
    pub log_level: String,
    pub p2p_port: u16,
    pub beacon_api_port: u16,
    pub beacon_rpc_port: u16,
    pub beacon_metric_port: u16,
    pub validator_rpc_port: u16,
    pub validator_metric_port: u16,
    pub num_validators: u64,
}

impl ConsensusConfig {
    pub(crate) fn parse(name: &str, section: &Section) -> Result<Self, ConfigError> {
        use defaults::*;

        let client: ConsensusClient = parse_client(section)?;
        Ok(Self {
            name: name.to_string(),
            client,
            launcher: section
                .optional_string("launcher")?
                .unwrap_or_else(|| consensus_launcher(client).to_string())
                .into(),
            log_level: section
                .optional_string("log-level")?
                .unwrap_or_else(|| consensus_log_level(client).to_string()),
            p2p_port: port(section, "p2p-port", DEFAULT_CONSENSUS_P2P_PORT)?,
            beacon_api_port: port(section, "beacon-api-port", DEFAULT_CONSENSUS_BEACON_API_PORT)?,
            beacon_rpc_port: port(section, "beacon-rpc-port", DEFAULT_CONSENSUS_BEACON_RPC_PORT)?,
            beacon_metric_port: port(
                section,
                "beacon-metric-port",
                DEFAULT_CONSENSUS_BEACON_METRIC_PORT,
            )?,
            validator_rpc_port: port(
                section,
                "validator-rpc-port",
                DEFAULT_CONSENSUS_VALIDATOR_RPC_PORT,
            )?,
            validator_metric_port: port(
                section,
                "validator-metric-port",
                DEFAULT_CONSENSUS_VALIDATOR_METRIC_PORT,
            )?,
            num_validators: section
                .optional_u64("num-validators")?
                .unwrap_or(DEFAULT_NUM_VALIDATORS),
        })
    }

    pub fn env(&self) -> Env {
        Env::from([
            ("CONSENSUS_CLIENT".into(), self.client.to_string()),
            ("CONSENSUS_LAUNCHER".into(), self.launcher.display().to_string()),
            ("CONSENSUS_LOG_LEVEL".into(), self.log_level.clone()),
            ("CONSENSUS_P2P_PORT".into(), self.p2p_port.to_string()),
            ("CONSENSUS_BEACON_API_PORT".into(), self.beacon_api_port.to_string()),
            ("CONSENSUS_BEACON_RPC_PORT".into(), self.beacon_rpc_port.to_string()),
            (
                "CONSENSUS_BEACON_METRIC_PORT".into(),
                self.beacon_metric_port.to_string(),
            ),
            (
                "CONSENSUS_VALIDATOR_RPC_PORT".into(),
                self.validator_rpc_port.to_string(),
            ),
            (
                "CONSENSUS_VALIDATOR_METRIC_PORT".into(),
                self.validator_metric_port.to_string(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use serde_yaml::Value;

    use super::*;

    fn execution(yaml: &str) -> Result<ExecutionConfig, ConfigError> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        ExecutionConfig::parse("el", &Section::root(&value).unwrap())
    }

    #[test]
    fn client_names_round_trip() {
        for client in ExecutionClient::ALL {
            assert_eq!(client.as_str().parse::<ExecutionClient>().unwrap(), client);
        }
        for client in ConsensusClient::ALL {
            assert_eq!(client.to_string().parse::<ConsensusClient>().unwrap(), client);
        }
        assert!("erigon".parse::<ExecutionClient>().is_err());
    }

    #[test]
    fn engine_port_rules() {
        assert!(execution("client: geth").is_ok());
        assert!(matches!(
            execution("client: geth\nengine-http-port: 8551\nengine-ws-port: 8552"),
            Err(ConfigError::EnginePorts { .. })
        ));
        assert_eq!(execution("client: nethermind").unwrap().engine_ws_port, 8552);
        assert!(matches!(
            execution("client: nethermind\nengine-http-port: 8551\nengine-ws-port: 8551"),
            Err(ConfigError::EnginePorts { .. })
        ));
    }

    #[test]
    fn admin_api_detection() {
        assert!(execution("client: besu").unwrap().has_http_api("admin"));
        assert!(execution("client: geth").unwrap().has_http_api("eth"));
        assert!(!execution("client: geth\nhttp-apis: eth,net").unwrap().has_http_api("admin"));
    }

    #[test]
    fn snooper_changes_cl_engine_port() {
        let plain = execution("client: geth").unwrap().env();
        assert_eq!(plain["RUN_JSON_RPC_SNOOPER"], "false");
        assert_eq!(plain["CL_EXECUTION_ENGINE_HTTP_PORT"], "8551");

        let snooped = execution("client: geth\njson-rpc-snooper-proxy-port: 9551")
            .unwrap()
            .env();
        assert_eq!(snooped["RUN_JSON_RPC_SNOOPER"], "true");
        assert_eq!(snooped["CL_EXECUTION_ENGINE_HTTP_PORT"], "9551");
    }

    #[test]
    fn apis_serialize_as_comma_string() {
        let config = execution("client: reth\nhttp-apis: [eth, admin]").unwrap();
        let value = serde_yaml::to_value(&config).unwrap();
        assert_eq!(value["http-apis"], Value::from("eth,admin"));
        assert_eq!(value["ws-apis"], Value::from("eth,net,admin,web3"));
        assert!(value.get("json-rpc-snooper-proxy-port").is_none());
    }
}

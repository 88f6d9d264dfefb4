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

//! The bootstrap driver: `clean`, `init` and the `bootstrap` state machine.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use etb_core::{
    ConfigError, DepositContract, EtbConfig, ExecutionGenesis, GenesisError, InvariantError,
    Manifest,
    config::{ClientInstance, ConsensusClient, FilesConfig},
    consensus_config_yaml,
};
use rand::{Rng, RngCore};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    checkpoint,
    client_request::{
        AdminAddPeer, AdminNodeInfo, GetBlockByNumber, RequestError, RetryPolicy, TypedRequest,
        join_batch, perform_batched_request, perform_typed,
    },
    tools::{
        Eth2TestnetGenesis, Eth2ValTools, GenesisStateRequest, KeystoresRequest, ToolError,
        write_validators_yaml,
    },
};

/// Upper bound for a single request issued while bootstrapping.
pub const GLOBAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Attempts at reaching an execution client's admin API; clients may still be starting.
pub const NODE_INFO_RETRIES: u32 = 40;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Genesis(#[from] GenesisError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("could not access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("request to {instance} failed: {source}")]
    Request {
        instance: String,
        #[source]
        source: RequestError,
    },
    #[error("{} already exists, clean the testnet first", .0.display())]
    AlreadyInitialized(PathBuf),
    #[error("no client instance exposes the `{0}` http api")]
    NoClientWithApi(&'static str),
    #[error("bootstrap failed in state {state}: {source}")]
    Fatal {
        state: BootstrapState,
        #[source]
        source: Box<BootstrapError>,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BootstrapError + '_ {
    move |source| BootstrapError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), BootstrapError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(path, contents).map_err(io_error(path))
}

fn copy_file(from: &Path, to: &Path) -> Result<(), BootstrapError> {
    fs::copy(from, to).map_err(io_error(from))?;
    Ok(())
}

fn move_path(from: &Path, to: &Path) -> Result<(), BootstrapError> {
    fs::rename(from, to).map_err(io_error(from))
}

fn touch(path: &Path) -> Result<(), BootstrapError> {
    checkpoint::touch(path).map_err(io_error(path))
}

fn write_json(path: &Path, value: &Value) -> Result<(), BootstrapError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| BootstrapError::Io {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    write_file(path, json)?;
    info!(path = %path.display(), "wrote execution genesis");
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Removes everything under the testnet root and the docker-compose manifest.
pub fn clean(files: &FilesConfig) -> Result<(), BootstrapError> {
    let root = &files.testnet_root;
    if root.exists() {
        for entry in fs::read_dir(root).map_err(io_error(root))? {
            let path = entry.map_err(io_error(root))?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(io_error(&path))?;
            } else {
                fs::remove_file(&path).map_err(io_error(&path))?;
            }
        }
    }
    let compose = &files.docker_compose_file;
    if compose.exists() {
        fs::remove_file(compose).map_err(io_error(compose))?;
    }
    info!(root = %root.display(), "cleaned testnet");
    Ok(())
}

/// Progress of [Bootstrapper::bootstrap]; each state is entered once its checkpoint exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootstrapState {
    Start,
    ConfigPublished,
    BootnodeReleased,
    ExecutionReleased,
    ExecutionPeered,
    DepositBlockRecorded,
    ConsensusGenesisWritten,
    Done,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapState::Start => "start",
            BootstrapState::ConfigPublished => "config-published",
            BootstrapState::BootnodeReleased => "bootnode-released",
            BootstrapState::ExecutionReleased => "execution-released",
            BootstrapState::ExecutionPeered => "execution-peered",
            BootstrapState::DepositBlockRecorded => "deposit-block-recorded",
            BootstrapState::ConsensusGenesisWritten => "consensus-genesis-written",
            BootstrapState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Drives a testnet from a config to running clients.
pub struct Bootstrapper<R> {
    http: reqwest::Client,
    val_tools: Eth2ValTools,
    genesis_tool: Eth2TestnetGenesis,
    rng: R,
    peering_policy: RetryPolicy,
    request_policy: RetryPolicy,
}

impl<R: RngCore> Bootstrapper<R> {
    pub fn new(rng: R) -> Self {
        Self {
            http: reqwest::Client::new(),
            val_tools: Eth2ValTools::default(),
            genesis_tool: Eth2TestnetGenesis::default(),
            rng,
            peering_policy: RetryPolicy::new(NODE_INFO_RETRIES, GLOBAL_TIMEOUT),
            request_policy: RetryPolicy::new(3, GLOBAL_TIMEOUT),
        }
    }

    pub fn with_val_tools(mut self, val_tools: Eth2ValTools) -> Self {
        self.val_tools = val_tools;
        self
    }

    pub fn with_genesis_tool(mut self, genesis_tool: Eth2TestnetGenesis) -> Self {
        self.genesis_tool = genesis_tool;
        self
    }

    /// Overrides the retry policies of the admin_nodeInfo collection and of all other requests.
    pub fn with_request_policies(mut self, peering: RetryPolicy, other: RetryPolicy) -> Self {
        self.peering_policy = peering;
        self.request_policy = other;
        self
    }

    /// Lays out the per-instance directories, secrets and keys, then snapshots the config and
    /// writes the docker-compose manifest.
    #[tracing::instrument(skip_all)]
    pub fn init(&mut self, config: &EtbConfig) -> Result<(), BootstrapError> {
        let files = &config.files;
        let local_testnet_dir = &files.local_testnet_dir;
        if local_testnet_dir.exists() {
            return Err(BootstrapError::AlreadyInitialized(local_testnet_dir.clone()));
        }
        fs::create_dir_all(local_testnet_dir).map_err(io_error(local_testnet_dir))?;

        for instance in config.client_instances() {
            fs::create_dir_all(&instance.el_dir).map_err(io_error(&instance.el_dir))?;
            self.write_jwt_secret(instance)?;
            self.write_keystores(config, instance)?;
        }

        config.write_config(&files.etb_config_file)?;
        Manifest::new(config).write(&files.docker_compose_file)?;
        info!(
            instances = config.num_client_nodes(),
            dir = %local_testnet_dir.display(),
            "initialized testnet"
        );
        Ok(())
    }

    fn write_jwt_secret(&mut self, instance: &ClientInstance) -> Result<(), BootstrapError> {
        let mut secret = [0u8; 32];
        self.rng.fill_bytes(&mut secret);
        write_file(&instance.jwt_secret_file, format!("0x{}", hex::encode(secret)))
    }

    fn write_keystores(
        &self,
        config: &EtbConfig,
        instance: &ClientInstance,
    ) -> Result<(), BootstrapError> {
        let out_dir = instance.node_dir.join("keystores");
        self.val_tools.keystores(&KeystoresRequest {
            mnemonic: &config.testnet_config.consensus_layer.validator_mnemonic,
            range: instance.validator_range(),
            out_dir: &out_dir,
            prysm_password: instance.validator_password.as_deref(),
        })?;

        let client = instance.consensus_config().client;
        if client == ConsensusClient::Prysm {
            let prysm_dir = out_dir.join("prysm");
            for entry in fs::read_dir(&prysm_dir).map_err(io_error(&prysm_dir))? {
                let entry = entry.map_err(io_error(&prysm_dir))?;
                move_path(&entry.path(), &instance.node_dir.join(entry.file_name()))?;
            }
            if let (Some(path), Some(password)) =
                (&instance.wallet_password_path, &instance.validator_password)
            {
                write_file(path, password)?;
            }
        } else {
            let (keys, secrets) = match client {
                ConsensusClient::Teku => ("teku-keys", "teku-secrets"),
                ConsensusClient::Nimbus => ("nimbus-keys", "secrets"),
                ConsensusClient::Lodestar => ("keys", "lodestar-secrets"),
                _ => ("keys", "secrets"),
            };
            move_path(&out_dir.join(keys), &instance.node_dir.join("keys"))?;
            move_path(&out_dir.join(secrets), &instance.node_dir.join("secrets"))?;
            if client == ConsensusClient::Lodestar {
                let db = instance.node_dir.join("validatordb");
                fs::create_dir_all(&db).map_err(io_error(&db))?;
            }
        }
        fs::remove_dir_all(&out_dir).map_err(io_error(&out_dir))?;
        debug!(instance = %instance, %client, "installed validator keys");
        Ok(())
    }

    /// Runs the bootstrap state machine to completion.
    ///
    /// Any failure is fatal; there is no rollback and [clean] is the recovery path.
    #[tracing::instrument(skip_all)]
    pub async fn bootstrap(&mut self, config: &mut EtbConfig) -> Result<(), BootstrapError> {
        let mut state = BootstrapState::Start;
        while state != BootstrapState::Done {
            state = self
                .step(state, config)
                .await
                .map_err(|source| BootstrapError::Fatal {
                    state,
                    source: Box::new(source),
                })?;
            debug!(%state, "bootstrap state reached");
        }
        info!("testnet bootstrapped");
        Ok(())
    }

    async fn step(
        &mut self,
        state: BootstrapState,
        config: &mut EtbConfig,
    ) -> Result<BootstrapState, BootstrapError> {
        let next = match state {
            BootstrapState::Start => {
                // the config is only replaced once the new snapshot has been written
                let mut published = config.clone();
                published.set_genesis_time(unix_now());
                published.write_config(&published.files.etb_config_file)?;
                *config = published;
                touch(&config.files.etb_config_checkpoint_file)?;
                BootstrapState::ConfigPublished
            }
            BootstrapState::ConfigPublished => {
                touch(&config.files.consensus_bootnode_checkpoint_file)?;
                BootstrapState::BootnodeReleased
            }
            BootstrapState::BootnodeReleased => {
                self.write_execution_genesis(config)?;
                touch(&config.files.execution_checkpoint_file)?;
                BootstrapState::ExecutionReleased
            }
            BootstrapState::ExecutionReleased => {
                self.pair_execution_clients(config).await?;
                BootstrapState::ExecutionPeered
            }
            BootstrapState::ExecutionPeered => {
                self.record_deposit_block(config).await?;
                BootstrapState::DepositBlockRecorded
            }
            BootstrapState::DepositBlockRecorded => {
                self.write_consensus_genesis(config)?;
                BootstrapState::ConsensusGenesisWritten
            }
            BootstrapState::ConsensusGenesisWritten => {
                touch(&config.files.consensus_checkpoint_file)?;
                BootstrapState::Done
            }
            BootstrapState::Done => BootstrapState::Done,
        };
        Ok(next)
    }

    fn write_execution_genesis(&self, config: &EtbConfig) -> Result<(), BootstrapError> {
        let files = &config.files;
        let deposit_contract = DepositContract::load(
            config.testnet_config.deposit_contract_address,
            &files.deposit_contract_bytecode_file,
        )?;
        let genesis = ExecutionGenesis::new(config, &deposit_contract)?;
        write_json(&files.geth_genesis_file, &genesis.geth())?;
        write_json(&files.besu_genesis_file, &genesis.besu())?;
        write_json(&files.nethermind_genesis_file, &genesis.nethermind())?;
        Ok(())
    }

    /// Connects every execution client exposing the admin API to every other one.
    #[tracing::instrument(skip_all)]
    pub async fn pair_execution_clients(&self, config: &EtbConfig) -> Result<(), BootstrapError> {
        let admins: Vec<ClientInstance> = config
            .client_instances()
            .iter()
            .filter(|instance| instance.execution_config().has_http_api("admin"))
            .cloned()
            .collect();

        let node_info = AdminNodeInfo.request(self.peering_policy);
        let mut enodes = Vec::with_capacity(admins.len());
        let batch = perform_batched_request(&self.http, &node_info, &admins);
        for (instance, result) in join_batch(batch).await {
            let enode = result
                .and_then(|response| AdminNodeInfo.parse(&response))
                .map_err(|source| BootstrapError::Request {
                    instance: instance.name.clone(),
                    source,
                })?;
            debug!(instance = %instance, %enode, "collected enode");
            enodes.push((instance, enode));
        }

        for (peer, enode) in &enodes {
            let clients: Vec<ClientInstance> = enodes
                .iter()
                .map(|(client, _)| client)
                .filter(|client| *client != peer)
                .cloned()
                .collect();
            let add_peer = AdminAddPeer {
                enode: enode.clone(),
            };
            let request = add_peer.request(self.request_policy);
            let batch = perform_batched_request(&self.http, &request, &clients);
            for (client, result) in join_batch(batch).await {
                let added = result
                    .and_then(|response| add_peer.parse(&response))
                    .map_err(|source| BootstrapError::Request {
                        instance: client.name.clone(),
                        source,
                    })?;
                if !added {
                    warn!(client = %client, peer = %peer, "admin_addPeer returned false");
                }
            }
        }
        info!(clients = enodes.len(), "paired execution clients");
        Ok(())
    }

    /// Records hash and number of the deposit contract deployment block, i.e. block 0.
    #[tracing::instrument(skip_all)]
    pub async fn record_deposit_block(&mut self, config: &EtbConfig) -> Result<(), BootstrapError> {
        let candidates: Vec<&ClientInstance> = config
            .client_instances()
            .iter()
            .filter(|instance| instance.execution_config().has_http_api("eth"))
            .collect();
        if candidates.is_empty() {
            return Err(BootstrapError::NoClientWithApi("eth"));
        }
        let instance = candidates[self.rng.random_range(0..candidates.len())];

        let block = perform_typed(
            &GetBlockByNumber::new("0x0"),
            &self.http,
            instance,
            self.request_policy,
        )
        .await
        .map_err(|source| BootstrapError::Request {
            instance: instance.name.clone(),
            source,
        })?;

        let files = &config.files;
        write_file(
            &files.deposit_contract_deployment_block_hash_file,
            block.hash.to_string(),
        )?;
        write_file(
            &files.deposit_contract_deployment_block_number_file,
            block.number.to_string(),
        )?;
        info!(
            from = %instance,
            hash = %block.hash,
            number = block.number,
            "recorded deposit contract block"
        );
        Ok(())
    }

    /// Writes config.yaml and genesis.ssz and distributes them to every client collection.
    #[tracing::instrument(skip_all)]
    pub fn write_consensus_genesis(&self, config: &EtbConfig) -> Result<(), BootstrapError> {
        let files = &config.files;
        let consensus = &config.testnet_config.consensus_layer;

        write_file(&files.consensus_config_file, consensus_config_yaml(config)?)?;

        let validators_yaml = files.testnet_root.join("genesis-validators.yaml");
        write_validators_yaml(
            &validators_yaml,
            &consensus.validator_mnemonic,
            consensus.min_genesis_active_validator_count,
        )?;
        self.genesis_tool.genesis_state(&GenesisStateRequest {
            fork: consensus.genesis_state_fork()?.name,
            preset: consensus.preset_base,
            validators_yaml: &validators_yaml,
            config: &files.consensus_config_file,
            eth1_config: &files.geth_genesis_file,
            state_output: &files.consensus_genesis_file,
        })?;

        for collection in &config.client_collections {
            let dir = &collection.collection_dir;
            fs::create_dir_all(dir).map_err(io_error(dir))?;
            copy_file(&files.consensus_config_file, &dir.join("config.yaml"))?;
            copy_file(&files.consensus_genesis_file, &dir.join("genesis.ssz"))?;
            match collection.consensus_config.client {
                ConsensusClient::Lighthouse => copy_file(
                    &files.deposit_contract_deployment_block_number_file,
                    &dir.join("deploy_block.txt"),
                )?,
                ConsensusClient::Nimbus => {
                    copy_file(
                        &files.deposit_contract_deployment_block_hash_file,
                        &dir.join("deposit_contract_block_hash.txt"),
                    )?;
                    copy_file(
                        &files.deposit_contract_deployment_block_number_file,
                        &dir.join("deposit_contract_block.txt"),
                    )?;
                }
                _ => {}
            }
            debug!(collection = collection.name(), "distributed consensus genesis");
        }
        Ok(())
    }
}

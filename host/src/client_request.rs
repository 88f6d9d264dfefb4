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

use std::{collections::HashMap, fmt, time::Duration};

use alloy_primitives::B256;
use etb_core::config::ClientInstance;
use futures::future;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use serde_with::{DisplayFromStr, serde_as};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use url::Url;

/// Pause between two attempts of the same request.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Errors returned by a [ClientRequest].
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("could not parse URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("execution client returned an error: {0}")]
    ErrorResponse(Value),
    #[error("could not decode response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("{url} unreachable after {attempts} attempts: {last}")]
    Unreachable {
        url: String,
        attempts: u32,
        last: Box<RequestError>,
    },
    #[error("request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How often and how long a request is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// What a request talks to on a client instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// JSON-RPC call against the execution client's http port.
    Execution { method: String, params: Value },
    /// GET against the consensus client's beacon API.
    Beacon { path: String },
}

/// A successful HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    pub status: u16,
    pub body: Value,
}

pub type RequestResult = Result<ClientResponse, RequestError>;

/// Whether `result` carries a 200 response without a top-level `error`.
pub fn is_valid(result: &RequestResult) -> bool {
    matches!(result, Ok(response) if response.status == 200 && response.body.get("error").is_none())
}

/// A request against one [ClientInstance], retried according to its [RetryPolicy].
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub endpoint: Endpoint,
    pub policy: RetryPolicy,
}

impl ClientRequest {
    pub fn execution(method: impl Into<String>, params: Value, policy: RetryPolicy) -> Self {
        Self {
            endpoint: Endpoint::Execution {
                method: method.into(),
                params,
            },
            policy,
        }
    }

    pub fn beacon(path: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            endpoint: Endpoint::Beacon { path: path.into() },
            policy,
        }
    }

    pub fn url(&self, instance: &ClientInstance) -> Result<Url, RequestError> {
        match &self.endpoint {
            Endpoint::Execution { .. } => Ok(Url::parse(&instance.execution_rpc_url())?),
            Endpoint::Beacon { path } => Ok(Url::parse(&instance.beacon_api_url())?.join(path)?),
        }
    }

    /// Performs the request, retrying failures up to `max_retries` times.
    ///
    /// Exhausted retries yield [RequestError::Unreachable] carrying the last failure.
    #[tracing::instrument(skip_all, fields(instance = %instance.name))]
    pub async fn perform(&self, http: &reqwest::Client, instance: &ClientInstance) -> RequestResult {
        let url = self.url(instance)?;
        let attempts = self.policy.max_retries.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.attempt(http, url.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if attempt >= attempts {
                debug!(%url, attempts, "giving up: {err}");
                return Err(RequestError::Unreachable {
                    url: url.to_string(),
                    attempts,
                    last: Box::new(err),
                });
            }
            trace!(%url, attempt, "request failed: {err}");
            tokio::time::sleep(RETRY_DELAY).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, http: &reqwest::Client, url: Url) -> RequestResult {
        let builder = match &self.endpoint {
            Endpoint::Execution { method, params } => http.post(url).json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1,
            })),
            Endpoint::Beacon { .. } => http.get(url),
        };
        let resp = builder.timeout(self.policy.timeout).send().await?;
        let resp = resp.error_for_status()?;
        let status = resp.status().as_u16();
        let body: Value = resp.json().await?;
        if let Some(error) = body.get("error") {
            return Err(RequestError::ErrorResponse(error.clone()));
        }
        Ok(ClientResponse { status, body })
    }
}

/// Issues `request` against every instance concurrently.
///
/// Returns exactly one handle per instance; each resolves independently.
pub fn perform_batched_request(
    http: &reqwest::Client,
    request: &ClientRequest,
    instances: &[ClientInstance],
) -> HashMap<ClientInstance, JoinHandle<RequestResult>> {
    instances
        .iter()
        .map(|instance| {
            let http = http.clone();
            let request = request.clone();
            let target = instance.clone();
            let handle = tokio::spawn(async move { request.perform(&http, &target).await });
            (instance.clone(), handle)
        })
        .collect()
}

/// Awaits every handle of a batch, ordered by instance name.
pub async fn join_batch(
    batch: HashMap<ClientInstance, JoinHandle<RequestResult>>,
) -> Vec<(ClientInstance, RequestResult)> {
    let (instances, handles): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
    let results = future::join_all(handles).await;
    instances
        .into_iter()
        .zip(results)
        .map(|(instance, result)| (instance, result.unwrap_or_else(|err| Err(err.into()))))
        .sorted_by(|(a, _), (b, _)| a.name.cmp(&b.name))
        .collect()
}

/// A [ClientRequest] with a typed interpretation of its response.
pub trait TypedRequest {
    type Output;

    fn endpoint(&self) -> Endpoint;

    fn parse(&self, response: &ClientResponse) -> Result<Self::Output, RequestError>;

    fn request(&self, policy: RetryPolicy) -> ClientRequest {
        ClientRequest {
            endpoint: self.endpoint(),
            policy,
        }
    }
}

/// Performs a typed request against a single instance.
pub async fn perform_typed<R: TypedRequest>(
    request: &R,
    http: &reqwest::Client,
    instance: &ClientInstance,
    policy: RetryPolicy,
) -> Result<R::Output, RequestError> {
    let response = request.request(policy).perform(http, instance).await?;
    request.parse(&response)
}

fn execution_result<T: DeserializeOwned>(response: &ClientResponse) -> Result<T, RequestError> {
    let result = response
        .body
        .get("result")
        .cloned()
        .ok_or_else(|| RequestError::Parse("missing `result`".into()))?;
    Ok(serde_json::from_value(result)?)
}

/// Wrapper returned by the beacon API calls.
#[derive(Serialize, Deserialize)]
struct Response<T> {
    data: T,
    #[serde(flatten)]
    meta: HashMap<String, Value>,
}

fn beacon_data<T: DeserializeOwned>(response: &ClientResponse) -> Result<T, RequestError> {
    let result: Response<T> = serde_json::from_value(response.body.clone())?;
    Ok(result.data)
}

fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let digits = raw.strip_prefix("0x").unwrap_or(&raw);
    u64::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
}

/// The hex encoded last four bytes of a root.
pub fn root_suffix(root: &B256) -> String {
    format!("0x{}", hex::encode(&root[28..]))
}

/// Graffiti as text, with NUL padding removed.
pub fn decode_graffiti(graffiti: &B256) -> String {
    String::from_utf8_lossy(graffiti.as_slice()).replace('\0', "")
}

/// Execution block header fields used by the bootstrapper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionBlock {
    pub hash: B256,
    #[serde(deserialize_with = "quantity")]
    pub number: u64,
}

/// `eth_getBlockByNumber`
#[derive(Debug, Clone)]
pub struct GetBlockByNumber {
    pub block: String,
    pub full_transactions: bool,
}

impl GetBlockByNumber {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            full_transactions: true,
        }
    }
}

impl TypedRequest for GetBlockByNumber {
    type Output = ExecutionBlock;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Execution {
            method: "eth_getBlockByNumber".into(),
            params: json!([self.block, self.full_transactions]),
        }
    }

    fn parse(&self, response: &ClientResponse) -> Result<ExecutionBlock, RequestError> {
        execution_result(response)
    }
}

#[derive(Deserialize)]
struct NodeInfo {
    enode: String,
}

/// `admin_nodeInfo`, yielding the enode of the instance.
#[derive(Debug, Clone, Copy)]
pub struct AdminNodeInfo;

impl TypedRequest for AdminNodeInfo {
    type Output = String;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Execution {
            method: "admin_nodeInfo".into(),
            params: json!([]),
        }
    }

    fn parse(&self, response: &ClientResponse) -> Result<String, RequestError> {
        let info: NodeInfo = execution_result(response)?;
        Ok(info.enode)
    }
}

/// `admin_addPeer`
#[derive(Debug, Clone)]
pub struct AdminAddPeer {
    pub enode: String,
}

impl TypedRequest for AdminAddPeer {
    type Output = bool;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Execution {
            method: "admin_addPeer".into(),
            params: json!([self.enode]),
        }
    }

    fn parse(&self, response: &ClientResponse) -> Result<bool, RequestError> {
        execution_result(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BeaconBlockBody {
    pub graffiti: B256,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BeaconBlock {
    #[serde_as(as = "DisplayFromStr")]
    pub slot: u64,
    pub state_root: B256,
    pub body: BeaconBlockBody,
}

#[derive(Deserialize)]
struct SignedBeaconBlock {
    message: BeaconBlock,
}

/// `GET /eth/v2/beacon/blocks/{block_id}`
#[derive(Debug, Clone)]
pub struct GetBlockV2 {
    pub block_id: String,
}

impl GetBlockV2 {
    pub fn head() -> Self {
        Self {
            block_id: "head".into(),
        }
    }
}

impl TypedRequest for GetBlockV2 {
    type Output = BeaconBlock;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Beacon {
            path: format!("/eth/v2/beacon/blocks/{}", self.block_id),
        }
    }

    fn parse(&self, response: &ClientResponse) -> Result<BeaconBlock, RequestError> {
        let block: SignedBeaconBlock = beacon_data(response)?;
        Ok(block.message)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Genesis {
    #[serde_as(as = "DisplayFromStr")]
    pub genesis_time: u64,
    pub genesis_validators_root: B256,
    pub genesis_fork_version: String,
}

/// `GET /eth/v1/beacon/genesis`
#[derive(Debug, Clone, Copy)]
pub struct GetGenesis;

impl TypedRequest for GetGenesis {
    type Output = Genesis;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Beacon {
            path: "/eth/v1/beacon/genesis".into(),
        }
    }

    fn parse(&self, response: &ClientResponse) -> Result<Genesis, RequestError> {
        beacon_data(response)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Checkpoint {
    #[serde_as(as = "DisplayFromStr")]
    pub epoch: u64,
    pub root: B256,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.epoch, root_suffix(&self.root))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct FinalityCheckpoints {
    pub previous_justified: Checkpoint,
    pub current_justified: Checkpoint,
    pub finalized: Checkpoint,
}

impl fmt::Display for FinalityCheckpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "finalized {}, current justified {}, previous justified {}",
            self.finalized, self.current_justified, self.previous_justified
        )
    }
}

/// `GET /eth/v1/beacon/states/{state_id}/finality_checkpoints`
#[derive(Debug, Clone)]
pub struct GetFinalityCheckpoints {
    pub state_id: String,
}

impl GetFinalityCheckpoints {
    pub fn head() -> Self {
        Self {
            state_id: "head".into(),
        }
    }
}

impl TypedRequest for GetFinalityCheckpoints {
    type Output = FinalityCheckpoints;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Beacon {
            path: format!("/eth/v1/beacon/states/{}/finality_checkpoints", self.state_id),
        }
    }

    fn parse(&self, response: &ClientResponse) -> Result<FinalityCheckpoints, RequestError> {
        beacon_data(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub peer_id: String,
    pub enr: String,
}

/// `GET /eth/v1/node/identity`
#[derive(Debug, Clone, Copy)]
pub struct GetIdentity;

impl TypedRequest for GetIdentity {
    type Output = Identity;

    fn endpoint(&self) -> Endpoint {
        Endpoint::Beacon {
            path: "/eth/v1/node/identity".into(),
        }
    }

    fn parse(&self, response: &ClientResponse) -> Result<Identity, RequestError> {
        beacon_data(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Peer {
    pub peer_id: String,
    pub state: String,
    pub direction: String,
}

/// `GET /eth/v1/node/peers`, optionally filtered by state and direction.
#[derive(Debug, Clone, Default)]
pub struct GetPeers {
    pub state: Option<String>,
    pub direction: Option<String>,
}

impl GetPeers {
    pub fn connected() -> Self {
        Self {
            state: Some("connected".into()),
            direction: None,
        }
    }
}

impl TypedRequest for GetPeers {
    type Output = Vec<Peer>;

    fn endpoint(&self) -> Endpoint {
        let filters: Vec<String> = [("state", &self.state), ("direction", &self.direction)]
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|value| format!("{key}={value}")))
            .collect();
        let mut path = "/eth/v1/node/peers".to_string();
        if !filters.is_empty() {
            path = format!("{path}?{}", filters.join("&"));
        }
        Endpoint::Beacon { path }
    }

    fn parse(&self, response: &ClientResponse) -> Result<Vec<Peer>, RequestError> {
        beacon_data(response)
    }
}

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

//! Node-watch metrics: fan a request out to every client, bucket the answers and report forks.

use std::{
    collections::HashMap,
    fmt::{self, Display, Write as _},
    marker::PhantomData,
};

use async_trait::async_trait;
use chainspec::Slot;
use etb_core::{EtbConfig, InvariantError, config::ClientInstance};
use tracing::{debug, info, warn};

use crate::{
    client_request::{
        BeaconBlock, Checkpoint, FinalityCheckpoints, GetBlockV2, GetFinalityCheckpoints, GetIdentity,
        GetPeers, RETRY_DELAY, RequestError, RetryPolicy, TypedRequest, decode_graffiti,
        join_batch, perform_batched_request, root_suffix,
    },
    monitor::{BoxError, MonitorAction},
};

/// Why an instance did not contribute a value to a metric.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("unreachable: {0}")]
    Unreachable(#[source] RequestError),
    #[error("unparseable response: {0}")]
    Unparseable(#[source] RequestError),
}

/// Slot, state root suffix and graffiti of a head block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeadSummary {
    pub slot: Slot,
    pub state_root: String,
    pub graffiti: String,
}

impl From<BeaconBlock> for HeadSummary {
    fn from(block: BeaconBlock) -> Self {
        Self {
            slot: block.slot,
            state_root: root_suffix(&block.state_root),
            graffiti: decode_graffiti(&block.body.graffiti),
        }
    }
}

impl Display for HeadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.slot, self.state_root, self.graffiti)
    }
}

/// Epoch and root suffix of a finality checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointSummary {
    pub epoch: u64,
    pub root: String,
}

impl From<Checkpoint> for CheckpointSummary {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            epoch: checkpoint.epoch,
            root: root_suffix(&checkpoint.root),
        }
    }
}

impl Display for CheckpointSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.epoch, self.root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointsSummary {
    pub finalized: CheckpointSummary,
    pub current_justified: CheckpointSummary,
    pub previous_justified: CheckpointSummary,
}

impl From<FinalityCheckpoints> for CheckpointsSummary {
    fn from(checkpoints: FinalityCheckpoints) -> Self {
        Self {
            finalized: checkpoints.finalized.into(),
            current_justified: checkpoints.current_justified.into(),
            previous_justified: checkpoints.previous_justified.into(),
        }
    }
}

impl Display for CheckpointsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "finalized {}, current justified {}, previous justified {}",
            self.finalized, self.current_justified, self.previous_justified
        )
    }
}

/// Instances that reported the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<T> {
    pub value: T,
    pub instances: Vec<String>,
}

/// Outcome of one metric run over a set of instances.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult<T> {
    buckets: Vec<Bucket<T>>,
    unreachable: Vec<String>,
    unparseable: Vec<String>,
}

impl<T> Default for MetricResult<T> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            unreachable: Vec::new(),
            unparseable: Vec::new(),
        }
    }
}

impl<T: PartialEq> MetricResult<T> {
    pub fn record(&mut self, instance: &str, observation: Result<T, MetricError>) {
        match observation {
            Ok(value) => match self.buckets.iter_mut().find(|bucket| bucket.value == value) {
                Some(bucket) => bucket.instances.push(instance.to_string()),
                None => self.buckets.push(Bucket {
                    value,
                    instances: vec![instance.to_string()],
                }),
            },
            Err(MetricError::Unreachable(err)) => {
                debug!(instance, "unreachable: {err}");
                self.unreachable.push(instance.to_string());
            }
            Err(MetricError::Unparseable(err)) => {
                debug!(instance, "unparseable: {err}");
                self.unparseable.push(instance.to_string());
            }
        }
    }

    pub fn buckets(&self) -> &[Bucket<T>] {
        &self.buckets
    }

    pub fn unreachable(&self) -> &[String] {
        &self.unreachable
    }

    pub fn unparseable(&self) -> &[String] {
        &self.unparseable
    }

    pub fn num_forks(&self) -> usize {
        self.buckets.len().saturating_sub(1)
    }

    /// Exactly one bucket and every instance accounted for in it.
    pub fn has_consensus(&self) -> bool {
        self.buckets.len() == 1 && self.unreachable.is_empty() && self.unparseable.is_empty()
    }
}

impl<T: PartialEq + Display> MetricResult<T> {
    pub fn report(&self, name: &str, show_forks: bool) -> String {
        let mut report = format!("{name}:");
        // writing to a String cannot fail
        if show_forks {
            let _ = write!(report, " num_forks={}", self.num_forks());
        }
        for bucket in &self.buckets {
            let _ = write!(report, "\n  {}: {}", bucket.value, bucket.instances.join(", "));
        }
        if !self.unreachable.is_empty() {
            let _ = write!(report, "\n  unreachable: {}", self.unreachable.join(", "));
        }
        if !self.unparseable.is_empty() {
            let _ = write!(report, "\n  unparseable: {}", self.unparseable.join(", "));
        }
        report
    }
}

/// A typed request whose parsed answers are compared across instances.
pub struct Metric<R, T> {
    pub name: String,
    request: R,
    policy: RetryPolicy,
    max_retries_for_consensus: u32,
    _value: PhantomData<fn() -> T>,
}

impl<R, T> Metric<R, T>
where
    R: TypedRequest + Send + Sync,
    T: From<R::Output> + PartialEq + Send,
{
    pub fn new(
        name: impl Into<String>,
        request: R,
        policy: RetryPolicy,
        max_retries_for_consensus: u32,
    ) -> Self {
        Self {
            name: name.into(),
            request,
            policy,
            max_retries_for_consensus,
            _value: PhantomData,
        }
    }

    /// One round over `instances`.
    pub async fn collect(
        &self,
        http: &reqwest::Client,
        instances: &[ClientInstance],
    ) -> MetricResult<T> {
        let request = self.request.request(self.policy);
        let mut result = MetricResult::default();
        for (instance, response) in join_batch(perform_batched_request(http, &request, instances)).await {
            let observation = match response {
                Err(err) => Err(MetricError::Unreachable(err)),
                Ok(response) => self
                    .request
                    .parse(&response)
                    .map(T::from)
                    .map_err(MetricError::Unparseable),
            };
            result.record(&instance.name, observation);
        }
        result
    }

    /// Repeats [Self::collect] until all instances agree or the consensus retries run out.
    pub async fn collect_consensus(
        &self,
        http: &reqwest::Client,
        instances: &[ClientInstance],
    ) -> MetricResult<T> {
        let rounds = self.max_retries_for_consensus.max(1);
        let mut round = 1;
        loop {
            let result = self.collect(http, instances).await;
            if result.has_consensus() || round >= rounds {
                return result;
            }
            debug!(
                metric = %self.name,
                round,
                forks = result.num_forks(),
                "no consensus yet"
            );
            drop(result);
            tokio::time::sleep(RETRY_DELAY).await;
            round += 1;
        }
    }
}

pub type HeadsMetric = Metric<GetBlockV2, HeadSummary>;
pub type CheckpointsMetric = Metric<GetFinalityCheckpoints, CheckpointsSummary>;

pub fn heads_metric(policy: RetryPolicy, max_retries_for_consensus: u32) -> HeadsMetric {
    Metric::new("heads", GetBlockV2::head(), policy, max_retries_for_consensus)
}

pub fn checkpoints_metric(policy: RetryPolicy, max_retries_for_consensus: u32) -> CheckpointsMetric {
    Metric::new(
        "checkpoints",
        GetFinalityCheckpoints::head(),
        policy,
        max_retries_for_consensus,
    )
}

/// Runs a [Metric] from the testnet monitor and logs its report.
pub struct MetricAction<R, T> {
    metric: Metric<R, T>,
    http: reqwest::Client,
    instances: Vec<ClientInstance>,
    show_forks: bool,
}

impl<R, T> MetricAction<R, T> {
    pub fn new(
        metric: Metric<R, T>,
        http: reqwest::Client,
        instances: Vec<ClientInstance>,
        show_forks: bool,
    ) -> Self {
        Self {
            metric,
            http,
            instances,
            show_forks,
        }
    }
}

#[async_trait]
impl<R, T> MonitorAction for MetricAction<R, T>
where
    R: TypedRequest + Send + Sync,
    T: From<R::Output> + PartialEq + Display + Send,
{
    async fn run(&mut self, slot: Slot) -> Result<(), BoxError> {
        let result = self
            .metric
            .collect_consensus(&self.http, &self.instances)
            .await;
        info!("slot {slot} {}", result.report(&self.metric.name, self.show_forks));
        if result.num_forks() > 0 {
            warn!(
                metric = %self.metric.name,
                slot,
                num_forks = result.num_forks(),
                "clients disagree after consensus retries"
            );
        }
        Ok(())
    }
}

/// Connected peers of one instance, named by instance where known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub instance: String,
    pub inbound: Vec<String>,
    pub outbound: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeersReport {
    pub peers: Vec<PeerSummary>,
    pub unreachable: Vec<String>,
}

impl Display for PeersReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peers:")?;
        for summary in &self.peers {
            write!(
                f,
                "\n  {}: inbound [{}] outbound [{}]",
                summary.instance,
                summary.inbound.join(", "),
                summary.outbound.join(", ")
            )?;
        }
        if !self.unreachable.is_empty() {
            write!(f, "\n  unreachable: {}", self.unreachable.join(", "))?;
        }
        Ok(())
    }
}

/// Summarizes the beacon node peering of every instance.
pub struct PeersAction {
    http: reqwest::Client,
    instances: Vec<ClientInstance>,
    policy: RetryPolicy,
}

impl PeersAction {
    pub fn new(http: reqwest::Client, instances: Vec<ClientInstance>, policy: RetryPolicy) -> Self {
        Self {
            http,
            instances,
            policy,
        }
    }

    pub async fn collect(&self) -> PeersReport {
        let identity = GetIdentity.request(self.policy);
        let mut names = HashMap::new();
        for (instance, result) in join_batch(perform_batched_request(&self.http, &identity, &self.instances)).await {
            match result.and_then(|response| GetIdentity.parse(&response)) {
                Ok(identity) => {
                    names.insert(identity.peer_id, instance.name);
                }
                Err(err) => debug!(instance = %instance, "no identity: {err}"),
            }
        }

        let connected = GetPeers::connected();
        let request = connected.request(self.policy);
        let mut report = PeersReport::default();
        for (instance, result) in join_batch(perform_batched_request(&self.http, &request, &self.instances)).await {
            let peers = match result.and_then(|response| connected.parse(&response)) {
                Ok(peers) => peers,
                Err(err) => {
                    debug!(instance = %instance, "no peers: {err}");
                    report.unreachable.push(instance.name);
                    continue;
                }
            };
            let mut summary = PeerSummary {
                instance: instance.name,
                inbound: Vec::new(),
                outbound: Vec::new(),
            };
            for peer in peers {
                let name = names.get(&peer.peer_id).cloned().unwrap_or(peer.peer_id);
                match peer.direction.as_str() {
                    "inbound" => summary.inbound.push(name),
                    _ => summary.outbound.push(name),
                }
            }
            summary.inbound.sort();
            summary.outbound.sort();
            report.peers.push(summary);
        }
        report
    }
}

#[async_trait]
impl MonitorAction for PeersAction {
    async fn run(&mut self, slot: Slot) -> Result<(), BoxError> {
        let report = self.collect().await;
        info!("slot {slot} {report}");
        Ok(())
    }
}

/// Genesis, fork schedule and client layout of a running testnet.
pub fn testnet_info(config: &EtbConfig) -> Result<String, InvariantError> {
    let consensus = &config.testnet_config.consensus_layer;
    let mut info = format!(
        "genesis time: {}\ngenesis fork: {} (in effect: {})",
        config.genesis_time()?,
        consensus.genesis_fork()?.name,
        consensus.genesis_state_fork()?.name,
    );
    for fork in consensus.scheduled_forks() {
        let _ = write!(
            info,
            "\n{} at epoch {} (slot {}, time {})",
            fork.name,
            fork.epoch,
            config.epoch_to_slot(fork.epoch),
            config.epoch_to_time(fork.epoch)?
        );
    }
    for instance in config.client_instances() {
        let _ = write!(
            info,
            "\n{instance}: {} + {}",
            instance.execution_config().client,
            instance.consensus_config().client
        );
    }
    Ok(info)
}

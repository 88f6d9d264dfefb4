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

//! Slot clock and a scheduler running actions on slot and epoch boundaries.

use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use chainspec::{Epoch, Slot};
use etb_core::{EtbConfig, InvariantError};
use tracing::{debug, info, warn};

/// Longest single sleep while waiting for a slot.
pub const MAX_SLEEP: Duration = Duration::from_secs(60);

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Maps wall clock time to slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    genesis_time: u64,
    seconds_per_slot: u64,
    slots_per_epoch: u64,
}

impl SlotClock {
    pub fn new(genesis_time: u64, seconds_per_slot: u64, slots_per_epoch: u64) -> Self {
        Self {
            genesis_time,
            seconds_per_slot: seconds_per_slot.max(1),
            slots_per_epoch: slots_per_epoch.max(1),
        }
    }

    pub fn from_config(config: &EtbConfig) -> Result<Self, InvariantError> {
        let preset = config.preset();
        Ok(Self::new(
            config.genesis_time()?,
            preset.seconds_per_slot,
            preset.slots_per_epoch,
        ))
    }

    pub fn slots_per_epoch(&self) -> u64 {
        self.slots_per_epoch
    }

    /// The slot at `unix_time`; slot 0 until genesis.
    pub fn slot_at(&self, unix_time: u64) -> Slot {
        unix_time.saturating_sub(self.genesis_time) / self.seconds_per_slot
    }

    pub fn slot_start(&self, slot: Slot) -> u64 {
        self.genesis_time + slot * self.seconds_per_slot
    }

    pub fn get_slot(&self) -> Slot {
        self.slot_at(unix_now())
    }

    pub fn get_epoch(&self) -> Epoch {
        self.get_slot() / self.slots_per_epoch
    }

    pub async fn wait_for_slot(&self, slot: Slot) {
        loop {
            let now = unix_now();
            if self.slot_at(now) >= slot {
                return;
            }
            let remaining = self.slot_start(slot).saturating_sub(now).max(1);
            tokio::time::sleep(Duration::from_secs(remaining).min(MAX_SLEEP)).await;
        }
    }

    pub async fn wait_for_epoch(&self, epoch: Epoch) {
        self.wait_for_slot(epoch * self.slots_per_epoch).await
    }
}

/// When a monitor action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    EverySlot,
    EveryEpoch,
    Once,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Interval::EverySlot => "slot",
            Interval::EveryEpoch => "epoch",
            Interval::Once => "once",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown interval `{0}`, expected one of slot, epoch, once")]
pub struct UnknownInterval(pub String);

impl FromStr for Interval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slot" => Ok(Interval::EverySlot),
            "epoch" => Ok(Interval::EveryEpoch),
            "once" => Ok(Interval::Once),
            _ => Err(UnknownInterval(s.to_string())),
        }
    }
}

/// Work performed by the [TestnetMonitor] at its scheduled slots.
#[async_trait]
pub trait MonitorAction: Send {
    async fn run(&mut self, slot: Slot) -> Result<(), BoxError>;
}

struct ScheduledAction {
    name: String,
    interval: Interval,
    action: Box<dyn MonitorAction>,
}

/// Runs actions against the slot clock of a testnet.
pub struct TestnetMonitor {
    clock: SlotClock,
    actions: Vec<ScheduledAction>,
}

impl TestnetMonitor {
    pub fn new(clock: SlotClock) -> Self {
        Self {
            clock,
            actions: Vec::new(),
        }
    }

    pub fn clock(&self) -> &SlotClock {
        &self.clock
    }

    /// Schedules `action`; actions due in the same slot run in insertion order.
    pub fn add_action(
        &mut self,
        name: impl Into<String>,
        interval: Interval,
        action: impl MonitorAction + 'static,
    ) {
        self.actions.push(ScheduledAction {
            name: name.into(),
            interval,
            action: Box::new(action),
        });
    }

    async fn run_due(&mut self, slot: Slot, due: impl Fn(Interval) -> bool) {
        for scheduled in self.actions.iter_mut().filter(|scheduled| due(scheduled.interval)) {
            debug!(action = %scheduled.name, slot, "running action");
            if let Err(err) = scheduled.action.run(slot).await {
                warn!(action = %scheduled.name, slot, "action failed: {err}");
            }
        }
    }

    /// Runs forever.
    pub async fn run(&mut self) {
        self.run_until(None).await
    }

    /// Runs the once-actions, then slot and epoch actions up to and including `last_slot`.
    #[tracing::instrument(skip(self))]
    pub async fn run_until(&mut self, last_slot: Option<Slot>) {
        let slots_per_epoch = self.clock.slots_per_epoch;
        let current = self.clock.get_slot();
        info!(slot = current, actions = self.actions.len(), "starting testnet monitor");
        self.run_due(current, |interval| interval == Interval::Once)
            .await;

        loop {
            let slot = self.clock.get_slot() + 1;
            if last_slot.is_some_and(|last| slot > last) {
                break;
            }
            self.clock.wait_for_slot(slot).await;
            let epoch_boundary = slot % slots_per_epoch == 0;
            self.run_due(slot, |interval| {
                interval == Interval::EverySlot || (epoch_boundary && interval == Interval::EveryEpoch)
            })
            .await;
        }
    }
}

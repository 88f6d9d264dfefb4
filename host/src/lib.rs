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

//! Runtime side of the ethereum testnet bootstrapper.
//!
//! Talks to the execution and consensus clients of a running testnet, drives the external
//! key and genesis tools and implements the `bootstrap` state machine as well as node-watch.

pub mod bootstrapper;
pub mod checkpoint;
mod client_request;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod test_utils;
pub mod tools;

pub use bootstrapper::{BootstrapError, BootstrapState, Bootstrapper, clean};
pub use client_request::*;
pub use monitor::{Interval, SlotClock, TestnetMonitor};

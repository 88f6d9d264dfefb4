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

use std::{fs::File, path::Path, sync::Mutex};

use tracing_subscriber::EnvFilter;

use crate::monitor::BoxError;

/// `--log-level` of the etb binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }

    /// `RUST_LOG` when set, this level otherwise.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }
}

/// Installs the global subscriber writing to stderr.
pub fn init(level: LogLevel) -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(level.env_filter())
        .with_writer(std::io::stderr)
        .try_init()
}

/// Installs the global subscriber writing bare messages to `path`.
pub fn init_to_file(level: LogLevel, path: &Path) -> Result<(), BoxError> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(level.env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_level(false)
        .without_time()
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_maps_to_warn() {
        assert_eq!(LogLevel::Warning.directive(), "warn");
        assert_eq!(LogLevel::default(), LogLevel::Debug);
    }
}

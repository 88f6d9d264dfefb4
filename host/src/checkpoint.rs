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

//! Checkpoint files: zero-byte files whose existence signals progress to other containers.

use std::{
    fs::{self, OpenOptions},
    io,
    path::Path,
    time::Duration,
};

use etb_core::{ConfigError, EtbConfig, config::FilesConfig};
use tracing::{debug, info};

/// How often a waiting consumer looks for a checkpoint.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Creates the checkpoint at `path`, leaving an existing file untouched.
pub fn touch(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    info!(checkpoint = %path.display(), "checkpoint reached");
    Ok(())
}

/// Resolves once the checkpoint at `path` exists.
pub async fn wait_for(path: &Path) {
    let mut logged = false;
    while !path.exists() {
        if !logged {
            debug!(checkpoint = %path.display(), "waiting for checkpoint");
            logged = true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Waits for the bootstrapper to publish the etb-config, then loads it.
pub async fn wait_for_etb_config(files: &FilesConfig) -> Result<EtbConfig, ConfigError> {
    wait_for(&files.etb_config_checkpoint_file).await;
    EtbConfig::load(&files.etb_config_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = dir.path().join("nested/execution-checkpoint.txt");
        touch(&checkpoint).unwrap();
        touch(&checkpoint).unwrap();
        assert_eq!(fs::metadata(&checkpoint).unwrap().len(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn waits_until_checkpoint_exists() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = dir.path().join("consensus-checkpoint.txt");

        let waiter = {
            let checkpoint = checkpoint.clone();
            tokio::spawn(async move { wait_for(&checkpoint).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        touch(&checkpoint).unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}

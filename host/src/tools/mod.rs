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

//! Adapters around the command line tools the bootstrapper drives.
//!
//! Each adapter turns a typed request into an argv list and runs the tool as a subprocess.
//! Output on stderr is treated as failure unless the adapter checks for a produced artifact.

mod eth2_testnet_genesis;
mod eth2_val_tools;
mod ethdo;
mod ethereal;

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use tracing::{debug, warn};

pub use eth2_testnet_genesis::*;
pub use eth2_val_tools::*;
pub use ethdo::*;
pub use ethereal::*;

/// Failure of an external tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} reported an error: {stderr}")]
    Stderr { program: String, stderr: String },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} did not produce {}: {stderr}", path.display())]
    MissingArtifact {
        program: String,
        path: PathBuf,
        stderr: String,
    },
    #[error("could not access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not encode tool input: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A command line tool found on `PATH` or at an explicit location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    program: PathBuf,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn name(&self) -> String {
        self.program.display().to_string()
    }

    fn output<I, S>(&self, args: I) -> Result<(ExitStatus, String, String), ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.name(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Ok((output.status, stdout, stderr))
    }

    /// Runs the tool and returns its stdout. Any output on stderr is an error.
    #[tracing::instrument(skip_all, fields(program = %self.program.display()))]
    pub fn run<I, S>(&self, args: I) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (status, stdout, stderr) = self.output(args)?;
        if !stderr.is_empty() {
            return Err(ToolError::Stderr {
                program: self.name(),
                stderr,
            });
        }
        if !status.success() {
            return Err(ToolError::Failed {
                program: self.name(),
                status,
                stderr,
            });
        }
        debug!("tool finished");
        Ok(stdout)
    }

    /// Runs a tool that may log to stderr on success; success is judged by `artifact` existing.
    #[tracing::instrument(skip_all, fields(program = %self.program.display()))]
    pub fn run_for_artifact<I, S>(&self, args: I, artifact: &Path) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (status, stdout, stderr) = self.output(args)?;
        if !status.success() {
            return Err(ToolError::Failed {
                program: self.name(),
                status,
                stderr,
            });
        }
        if !artifact.exists() {
            return Err(ToolError::MissingArtifact {
                program: self.name(),
                path: artifact.to_path_buf(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            warn!(artifact = %artifact.display(), "tool wrote to stderr: {stderr}");
        }
        Ok(stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::write_fake_tool;

    #[test]
    fn stderr_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Tool::new(write_fake_tool(dir.path(), "noisy", "echo out; echo oops >&2"));
        match tool.run(["a"]) {
            Err(ToolError::Stderr { stderr, .. }) => assert_eq!(stderr, "oops"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Tool::new(write_fake_tool(dir.path(), "echo", "echo \"$@\""));
        assert_eq!(tool.run(["a", "b"]).unwrap(), "a b\n");
    }

    #[test]
    fn missing_program() {
        let tool = Tool::new("/nonexistent/eth2-val-tools");
        assert!(matches!(tool.run(["keystores"]), Err(ToolError::Spawn { .. })));
    }

    #[test]
    fn artifact_decides_success() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("out.bin");
        let tool = Tool::new(write_fake_tool(
            dir.path(),
            "writer",
            "echo progress >&2; [ \"$1\" = write ] && echo data > \"$2\"; exit 0",
        ));
        let missing = dir.path().join("never.bin");
        assert!(matches!(
            tool.run_for_artifact(["skip", missing.to_str().unwrap()], &missing),
            Err(ToolError::MissingArtifact { .. })
        ));
        tool.run_for_artifact(["write", artifact.to_str().unwrap()], &artifact)
            .unwrap();
        assert!(artifact.exists());
    }
}

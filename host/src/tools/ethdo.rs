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

use std::ffi::OsStr;

use super::{Tool, ToolError};

/// Validator lifecycle operations: exits and withdrawal credential changes.
///
/// Arguments are handed to the tool unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ethdo {
    tool: Tool,
}

impl Default for Ethdo {
    fn default() -> Self {
        Self::new(Tool::new("ethdo"))
    }
}

impl Ethdo {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    pub fn run<I, S>(&self, args: I) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.tool.run(args)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::write_fake_tool;

    #[test]
    fn passes_arguments_through() {
        let dir = tempfile::tempdir().unwrap();
        let ethdo = Ethdo::new(Tool::new(write_fake_tool(dir.path(), "ethdo", "echo \"$@\"")));
        let out = ethdo
            .run(["validator", "exit", "--validator=3", "--connection=http://127.0.0.1:5052"])
            .unwrap();
        assert_eq!(out.trim(), "validator exit --validator=3 --connection=http://127.0.0.1:5052");
    }
}

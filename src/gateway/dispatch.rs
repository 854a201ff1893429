//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Filterctl.
//
// Filterctl is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Filterctl is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Filterctl. If not, see <http://www.gnu.org/licenses/>.

//! Running the synthesized command in a fresh child process.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use log::{debug, error, info};

use super::command::CommandInvocation;
use crate::support::error::Error;

/// Variables passed through from our own environment. Everything else the
/// child sees comes from the configuration snapshot.
pub const INHERITED_ENV: &[&str] = &["HOME", "PATH", "TERM"];

/// What became of a dispatched command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Set if the command was never run, as opposed to failing.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && 0 == self.exit_code
    }

    fn not_run(why: String) -> Self {
        ExecutionResult {
            exit_code: -1,
            error: Some(why),
            ..ExecutionResult::default()
        }
    }
}

impl From<Output> for ExecutionResult {
    fn from(output: Output) -> Self {
        ExecutionResult {
            // None means killed by a signal
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
            error: None,
        }
    }
}

pub struct Dispatcher {
    program: PathBuf,
}

impl Dispatcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Dispatcher {
            program: program.into(),
        }
    }

    /// A dispatcher that re-executes the running binary.
    pub fn current_exe() -> Result<Self, Error> {
        let program = env::current_exe().map_err(|source| Error::Dispatch {
            program: "filterctl".to_owned(),
            source,
        })?;
        Ok(Dispatcher::new(program))
    }

    /// Run `invocation` with an environment of `INHERITED_ENV` plus
    /// `config_env`, capturing its output.
    ///
    /// This never fails: a command that cannot be started is reported
    /// through `ExecutionResult::error`.
    pub fn dispatch(
        &self,
        invocation: &CommandInvocation,
        config_env: &[(String, String)],
    ) -> ExecutionResult {
        let argv = invocation.argv();

        // The child parses its arguments with the same option parser, so a
        // leading '-' would be taken as one of its own options.
        if argv[0].starts_with('-') {
            error!("Refusing to run command {:?}", argv[0]);
            return ExecutionResult::not_run(format!(
                "invalid command name '{}'",
                argv[0]
            ));
        }

        let mut command = Command::new(&self.program);
        command
            .args(argv)
            .env_clear()
            .envs(
                INHERITED_ENV
                    .iter()
                    .filter_map(|&name| env::var_os(name).map(|v| (name, v))),
            )
            .envs(config_env.iter().map(|&(ref k, ref v)| (k, v)));

        info!("Running {} {:?}", self.program.display(), argv);
        match run_captured(&mut command, None) {
            Ok(output) => {
                let result = ExecutionResult::from(output);
                debug!(
                    "{} exited with {}; stderr: {}",
                    argv[0],
                    result.exit_code,
                    String::from_utf8_lossy(&result.stderr).trim()
                );
                result
            },
            Err(e) => {
                error!("Failed to run {}: {}", self.program.display(), e);
                ExecutionResult::not_run(e.to_string())
            },
        }
    }
}

/// Run `command` to completion with all three standard streams piped.
///
/// `stdin` is written in full and closed before the output is collected.
pub fn run_captured(
    command: &mut Command,
    stdin: Option<&[u8]>,
) -> io::Result<Output> {
    let mut child = command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let written = pipe.write_all(data);
        drop(pipe);
        if let Err(e) = written {
            // Reap the child before reporting
            let _ = child.wait();
            return Err(e);
        }
    }

    child.wait_with_output()
}

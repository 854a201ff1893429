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

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::forwarded::forwarded_sender;
use super::identity::VerifiedIdentity;
use crate::mime::message::{Body, ParsedMessage};
use crate::support::error::Error;

/// Commands whose last argument is a file holding the JSON message body.
pub const PAYLOAD_COMMANDS: &[&str] = &["restore", "accounts", "rescan"];

/// The command to run on behalf of a verified sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    argv: Vec<String>,
    payload_file: Option<PathBuf>,
}

impl CommandInvocation {
    /// `argv` must not be empty. A leading `help` becomes `usage`.
    pub fn new(mut argv: Vec<String>) -> Result<Self, Error> {
        match argv.first_mut() {
            None => Err(Error::MalformedMessage("empty command".to_owned())),
            Some(command) => {
                if "help" == command {
                    *command = "usage".to_owned();
                }
                Ok(CommandInvocation {
                    argv,
                    payload_file: None,
                })
            },
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn command(&self) -> &str {
        &self.argv[0]
    }

    pub fn payload_file(&self) -> Option<&Path> {
        self.payload_file.as_deref()
    }

    fn attach_payload(&mut self, path: PathBuf) {
        self.argv.push(path.to_string_lossy().into_owned());
        self.payload_file = Some(path);
    }
}

/// Derive the command for `message`, writing any payload file under
/// `temp_dir`.
///
/// A plus-suffix recipient means "add the sender of the forwarded message
/// to this address book". Otherwise the command line is the `Subject`.
pub fn synthesize(
    identity: &VerifiedIdentity,
    message: &ParsedMessage,
    temp_dir: &Path,
) -> Result<CommandInvocation, Error> {
    if !identity.plus_suffix().is_empty() {
        let sender = forwarded_sender(message)?;
        return CommandInvocation::new(vec![
            "mkaddr".to_owned(),
            identity.plus_suffix().to_owned(),
            sender.address(),
        ]);
    }

    let subject = message.subject().unwrap_or_default();
    let subject = match subject.trim() {
        "" => "help",
        s => s,
    };
    let mut invocation = CommandInvocation::new(
        subject.split(' ').map(str::to_owned).collect(),
    )?;

    if PAYLOAD_COMMANDS.contains(&invocation.command()) {
        let path = write_payload(message, invocation.command(), temp_dir)?;
        invocation.attach_payload(path);
    }

    info!("Command: {:?}", invocation.argv());
    Ok(invocation)
}

/// Validate the first textual body part as JSON and write it out
/// pretty-printed. The file is left in place for the command to consume.
fn write_payload(
    message: &ParsedMessage,
    command: &str,
    temp_dir: &Path,
) -> Result<PathBuf, Error> {
    let text = message
        .parts()
        .filter(|p| p.content_type.is_type("text"))
        .filter(|p| matches!(p.body, Body::Leaf(_)))
        .find_map(|p| p.text())
        .ok_or_else(|| {
            Error::Payload(format!("{} requires a JSON message body", command))
        })?;

    let payload: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|e| {
            Error::Payload(format!("{} body is not valid JSON: {}", command, e))
        })?;

    let file = tempfile::Builder::new()
        .prefix("filterctl-")
        .suffix(".json")
        .tempfile_in(temp_dir)?;
    {
        let mut writer = BufWriter::new(file.as_file());
        serde_json::to_writer_pretty(&mut writer, &payload)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    let (_, path) = file.keep().map_err(|e| e.error)?;
    let path = fs::canonicalize(path)?;

    debug!("Wrote {} payload to {}", command, path.display());
    Ok(path)
}

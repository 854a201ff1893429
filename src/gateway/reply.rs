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

//! Composing and delivering the reply to a verified sender.

use std::io::{self, Write};
use std::process::Command;

use chrono::{DateTime, FixedOffset};
use log::{error, info};
use serde::Serialize;

use super::command::CommandInvocation;
use super::dispatch::{run_captured, ExecutionResult};
use super::identity::VerifiedIdentity;
use crate::mime::quoted_printable::qp_encode;
use crate::support::error::Error;
use crate::support::system_config::SystemConfig;

pub const HELP_HINT: &str = "Send 'help' in Subject line for valid commands";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct FailureEnvelope<'a> {
    success: bool,
    request: &'a str,
    message: String,
    help: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<FailureDetail<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct FailureDetail<'a> {
    command: &'a [String],
    exit_code: i32,
    stdout: String,
    stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// The reply body for `result`.
///
/// The output of a successful command is passed through untouched. Anything
/// else is replaced by a failure envelope, which only describes what went
/// wrong if `verbose` is set.
pub fn response_payload(
    invocation: &CommandInvocation,
    result: &ExecutionResult,
    identity: &VerifiedIdentity,
    verbose: bool,
) -> Result<Vec<u8>, Error> {
    if result.succeeded() {
        return Ok(result.stdout.clone());
    }

    let detail = if verbose {
        Some(FailureDetail {
            command: invocation.argv(),
            exit_code: result.exit_code,
            stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            error: result.error.as_deref(),
        })
    } else {
        None
    };

    let envelope = FailureEnvelope {
        success: false,
        request: identity.request_id(),
        message: format!("{} internal failure", identity.sender_address()),
        help: HELP_HINT,
        detail,
    };

    let mut payload = serde_json::to_vec_pretty(&envelope)?;
    payload.push(b'\n');
    Ok(payload)
}

/// Convert bare LF line endings to CRLF and terminate the final line.
fn normalise_line_endings(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 16 + 2);
    let mut prev = 0u8;
    for &b in body {
        if b'\n' == b && b'\r' != prev {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Render the complete reply message.
pub fn compose(
    identity: &VerifiedIdentity,
    primary_domain: &str,
    body: &[u8],
    date: DateTime<FixedOffset>,
) -> Vec<u8> {
    let request_id = identity.request_id();
    let mut message = format!(
        "From: filterctl@{domain}\r\n\
         To: {to}\r\n\
         Subject: filterctl response {id}\r\n\
         Date: {date}\r\n\
         X-Filterctl-Request-ID: <{id}>\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=\"us-ascii\"\r\n\
         Content-Transfer-Encoding: quoted-printable\r\n\
         \r\n",
        domain = primary_domain,
        to = identity.sender_address(),
        id = request_id,
        date = date.to_rfc2822(),
    );
    message.push_str(&qp_encode(&normalise_line_endings(body)));
    message.into_bytes()
}

/// Send `message` to `recipient`, or print it if `disable_response` is set.
pub fn deliver(
    message: &[u8],
    recipient: &str,
    config: &SystemConfig,
) -> Result<(), Error> {
    if config.disable_response {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        stdout.write_all(message)?;
        stdout.flush()?;
        return Ok(());
    }

    if recipient.starts_with('-') {
        return Err(Error::Delivery(format!(
            "refusing to pass '{}' to {}",
            recipient, config.sendmail
        )));
    }

    info!("Sending reply to {} with {}", recipient, config.sendmail);
    let output = run_captured(
        Command::new(&config.sendmail).arg(recipient),
        Some(message),
    )
    .map_err(|source| Error::Dispatch {
        program: config.sendmail.clone(),
        source,
    })?;

    // The command has already run; failing here would have the MTA bounce
    // or redeliver the request.
    if !output.status.success() {
        error!(
            "{} failed ({}): stdout: {} stderr: {}",
            config.sendmail,
            output.status,
            String::from_utf8_lossy(&output.stdout).trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

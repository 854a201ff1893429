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

//! Runs the built binary on control messages, with replies printed instead
//! of mailed.

use std::io::Write;
use std::process::{Command, Output, Stdio};

static HELP: &[u8] = include_bytes!("../src/test_data/help.eml");
static CLASSIFY: &[u8] = include_bytes!("../src/test_data/classify.eml");

fn filterctl(args: &[&str], input: &[u8]) -> Output {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = tmp.path().join("filterctl.toml");
    std::fs::write(
        &config,
        "hostname = \"mail.example.com\"\n\
         domains = [\"example.com\"]\n\
         log_file = \"stderr\"\n",
    )
    .unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_filterctl"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .env("FILTERCTL_DISABLE_RESPONSE", "true")
        .env("FILTERCTL_INSECURE_DISABLE_USERNAME_CHECK", "true")
        .env("FILTERCTL_SERVER_URL", "http://127.0.0.1:9")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // The process may exit without reading everything
    let _ = child.stdin.take().unwrap().write_all(input);
    child.wait_with_output().unwrap()
}

fn replace(message: &[u8], from: &str, to: &str) -> Vec<u8> {
    let text = String::from_utf8(message.to_vec()).unwrap();
    assert!(text.contains(from), "{:?} not in message", from);
    text.replacen(from, to, 1).into_bytes()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn help_message_gets_usage_reply() {
    let output = filterctl(&[], HELP);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let reply = stdout(&output);
    assert!(reply.starts_with("From: filterctl@example.com\r\n"));
    assert!(reply.contains("\r\nTo: jdoe@example.com\r\n"));
    assert!(reply.contains(
        "\r\nSubject: filterctl response 5f1c2d3e-0001@example.com\r\n"
    ));
    assert!(reply.contains(
        "\r\nX-Filterctl-Request-ID: <5f1c2d3e-0001@example.com>\r\n"
    ));
    assert!(
        reply.contains("\r\nContent-Transfer-Encoding: quoted-printable\r\n")
    );
    assert!(reply.contains("\"User\": \"jdoe@example.com\""));
    assert!(reply.contains("\"Message\": \"jdoe@example.com usage\""));
}

#[test]
fn failed_command_gets_failure_envelope() {
    // Nothing listens on the discard port
    let output = filterctl(&[], CLASSIFY);
    assert!(output.status.success());

    let reply = stdout(&output);
    assert!(reply.contains("\"Success\": false"));
    assert!(reply
        .contains("\"Message\": \"jdoe@example.com internal failure\""));
    assert!(!reply.contains("\"Detail\""));
}

#[test]
fn rejected_messages_get_no_reply() {
    let forged_user = replace(HELP, "user=jdoe", "user=mallory");
    let output = filterctl(&[], &forged_user);
    assert_eq!(Some(77), output.status.code());
    assert!(output.stdout.is_empty());

    let foreign_dkim = replace(HELP, "d=example.com", "d=example.org");
    let output = filterctl(&[], &foreign_dkim);
    assert_eq!(Some(77), output.status.code());
    assert!(output.stdout.is_empty());

    let other_relay = replace(HELP, "by mail.example.com", "by mx.example.org");
    let output = filterctl(&[], &other_relay);
    assert_eq!(Some(77), output.status.code());
    assert!(output.stdout.is_empty());

    let output = filterctl(&[], b"");
    assert_eq!(Some(65), output.status.code());
    assert!(output.stdout.is_empty());
}

#[test]
fn disable_exec_runs_nothing() {
    let output = filterctl(&["-d"], HELP);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn bad_options_are_usage_errors() {
    let output = filterctl(&["--no-such-option"], HELP);
    assert_eq!(Some(64), output.status.code());
}

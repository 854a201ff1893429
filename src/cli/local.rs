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

//! Commands answered without any service.

use serde::Serialize;

use crate::support::error::Error;
use crate::support::system_config::SystemConfig;

const RULE: &str =
    "------------------------------------------------------------------------------";

const HELP: &str = "\
### Mail Filter Control ###

# Filter Control Address #
The address 'filterctl@[account_domain]' accepts messages only from local
users submitting over an authenticated connection. The command and its
arguments go in the Subject line; the body is ignored except by the commands
that read a JSON payload from it (restore, accounts, rescan). The reply comes
from the same address with the subject 'filterctl response'.

# X-Spam-Class Header #
Incoming mail carries an 'X-Spam-Score' header, usually between -20.0 and
+20.0. Each class names the highest score it covers, and the name of the
first class covering a message's score is added as an 'X-Spam-Class' header.
A default set of classes applies until you set your own.

# Address Book Filter #
Address books kept for filtering list senders whose mail should be tagged
with an 'X-Address-Book' header naming the book, without looking at the
content. They are separate from the address books of your mail client.

# Address Book Filter Forwarding #
Forward a message to 'filterctl+[book_name]@[account_domain]' to add its
sender to the book named by the suffix. The book is created if it does not
exist yet.";

/// Name, arguments, and description of every Subject line command.
const COMMANDS: &[(&str, &str, &str)] = &[
    ("classes", "", "List your spam classes and their thresholds."),
    (
        "set",
        "CLASS=THRESHOLD",
        "Add or update one class. CLASS is an identifier and THRESHOLD a \
         number.",
    ),
    (
        "delete",
        "[CLASS ...]",
        "Delete the named classes, or every class if none is named.",
    ),
    (
        "reset",
        "[CLASS=THRESHOLD ...]",
        "Replace all classes with the ones given, or with the defaults.",
    ),
    ("classify", "SCORE", "Show the class a spam score falls into."),
    ("books", "", "List your address books."),
    ("addrs", "BOOK_NAME", "List the addresses in an address book."),
    (
        "mkbook",
        "BOOK_NAME [DESCRIPTION]",
        "Create an address book.",
    ),
    (
        "rmbook",
        "BOOK_NAME",
        "Delete an address book, including every address in it.",
    ),
    (
        "mkaddr",
        "BOOK_NAME EMAIL_ADDRESS",
        "Add an address to an address book.",
    ),
    (
        "rmaddr",
        "BOOK_NAME EMAIL_ADDRESS",
        "Remove an address from an address book.",
    ),
    (
        "scan",
        "EMAIL_ADDRESS",
        "List the address books containing an address.",
    ),
    ("passwd", "", "Show your address book password."),
    ("dump", "", "Show your classes, address books, and addresses."),
    (
        "restore",
        "",
        "Restore your address books from the dump in the message body.",
    ),
    (
        "accounts",
        "",
        "Show address book credentials for the JSON list of addresses in \
         the message body.",
    ),
    (
        "rescan",
        "",
        "Rescan the messages selected by the JSON object in the message \
         body.",
    ),
    ("rescanstatus", "[ID]", "Show the status of rescan jobs."),
    ("version", "", "Show the program version."),
    ("usage", "", "Show this message."),
];

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Usage {
    user: String,
    request: String,
    success: bool,
    message: String,
    help: Vec<String>,
    commands: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Version {
    user: String,
    request: String,
    success: bool,
    message: String,
    name: &'static str,
    version: &'static str,
    #[serde(rename = "UID")]
    uid: u32,
    #[serde(rename = "GID")]
    gid: u32,
}

pub(super) fn usage(config: &SystemConfig) {
    finish(build_usage(config));
}

pub(super) fn version(config: &SystemConfig) {
    finish(build_version(config));
}

fn build_usage(config: &SystemConfig) -> Result<Usage, Error> {
    let mut commands = vec!["# filterctl subject line commands #".to_owned()];
    commands.push(RULE.to_owned());
    for &(name, args, detail) in COMMANDS {
        if args.is_empty() {
            commands.push(name.to_owned());
        } else {
            commands.push(format!("{} {}", name, args));
        }
        commands.push(detail.to_owned());
        commands.push(RULE.to_owned());
    }

    Ok(Usage {
        user: config.sender.clone(),
        request: config.request_id()?,
        success: true,
        message: format!("{} usage", config.sender),
        help: HELP.lines().map(str::to_owned).collect(),
        commands,
    })
}

fn build_version(config: &SystemConfig) -> Result<Version, Error> {
    Ok(Version {
        user: config.sender.clone(),
        request: config.request_id()?,
        success: true,
        message: format!("{} version", config.sender),
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uid: nix::unistd::getuid().as_raw(),
        gid: nix::unistd::getgid().as_raw(),
    })
}

/// Print `response` as the command output, or exit with its error.
pub(super) fn finish<T: Serialize>(response: Result<T, Error>) {
    match response.and_then(|r| Ok(serde_json::to_string_pretty(&r)?)) {
        Ok(text) => println!("{}", text),
        Err(e) => die!(e.sysexit(), "{}", e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::support::system_config::encode_request_id;

    fn config() -> SystemConfig {
        let mut config = SystemConfig::default();
        config.sender = "jdoe@example.com".to_owned();
        config.message_id = encode_request_id("5f1c2d3e-0001@example.com");
        config
    }

    #[test]
    fn usage_lists_every_command() {
        let usage = build_usage(&config()).unwrap();
        assert_eq!("jdoe@example.com", usage.user);
        assert_eq!("5f1c2d3e-0001@example.com", usage.request);
        assert_eq!("jdoe@example.com usage", usage.message);
        for &(name, _, _) in COMMANDS {
            assert!(
                usage
                    .commands
                    .iter()
                    .any(|line| line == name
                        || line.starts_with(&format!("{} ", name))),
                "{} missing",
                name
            );
        }

        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(true, json["Success"]);
        assert!(json["Help"].is_array());
    }

    #[test]
    fn version_reports_identity() {
        let version = build_version(&config()).unwrap();
        let json = serde_json::to_value(&version).unwrap();
        assert_eq!("filterctl", json["Name"]);
        assert_eq!(env!("CARGO_PKG_VERSION"), json["Version"]);
        assert_eq!(nix::unistd::getuid().as_raw(), json["UID"]);
    }

    #[test]
    fn bad_message_id_is_config_error() {
        let mut config = config();
        config.message_id = "!!!".to_owned();
        assert_matches!(Err(Error::Config(..)), build_usage(&config));
    }
}

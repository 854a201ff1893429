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

//! Recovering the original sender of a message forwarded to a `+book`
//! address.
//!
//! Mail clients forward in different ways: as an attached message, quoted
//! inline as text, or quoted inline as an HTML table of headers. Each part of
//! the message is offered to each strategy in turn and the first mailbox
//! found wins.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::mime::header::parse_single_mailbox;
use crate::mime::message::{parse, Body, Part, ParsedMessage};
use crate::mime::model::Mailbox;
use crate::support::error::Error;

lazy_static! {
    static ref FORWARD_MARKER: Regex =
        Regex::new(r"(?i)-{5,}\s*Forwarded Message\s*-{5,}").unwrap();
    static ref TABLE_ROW: Regex =
        Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").unwrap();
    static ref TABLE_HEADING: Regex =
        Regex::new(r"(?is)<th\b[^>]*>(.*?)</th\s*>").unwrap();
    static ref MAILTO: Regex =
        Regex::new(r#"(?i)href\s*=\s*["']mailto:([^"'?]+)"#).unwrap();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
}

/// CSS class of the header table Thunderbird puts in HTML forwards.
const HEADER_TABLE_CLASS: &str = "moz-email-headers-table";

type Strategy = fn(&Part) -> Option<Mailbox>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("embedded headers", embedded_headers as Strategy),
    ("plain text quote", plain_text_quote as Strategy),
    ("HTML header table", html_header_table as Strategy),
];

/// Find the `From` mailbox of the forwarded message.
pub fn forwarded_sender(message: &ParsedMessage) -> Result<Mailbox, Error> {
    for part in message.parts() {
        for &(name, strategy) in STRATEGIES {
            if let Some(mailbox) = strategy(part) {
                debug!(
                    "Forwarded sender {} found in {} part by {}",
                    mailbox, part.content_type, name
                );
                return Ok(mailbox);
            }
        }
    }

    Err(Error::ForwardedSenderNotFound)
}

fn only<T>(mut items: Vec<T>) -> Option<T> {
    if 1 == items.len() {
        items.pop()
    } else {
        None
    }
}

/// A part that is itself a message, or that carries a `From` header of its
/// own.
fn embedded_headers(part: &Part) -> Option<Mailbox> {
    let headers = match part.body {
        Body::Message(ref message) => &message.headers,
        _ => &part.headers,
    };
    only(headers.mailboxes("From")?)
}

/// A `text/plain` part with a forwarding marker line followed by a block of
/// headers.
fn plain_text_quote(part: &Part) -> Option<Mailbox> {
    if !part.content_type.is("text", "plain") {
        return None;
    }

    let text = part.text()?;
    let lines = text
        .lines()
        .skip_while(|line| !FORWARD_MARKER.is_match(line))
        .skip(1)
        .skip_while(|line| line.trim().is_empty());

    let mut block = String::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        block.push_str(line);
        block.push_str("\r\n");
    }
    if block.is_empty() {
        return None;
    }
    block.push_str("\r\n");

    let quoted = parse(block.as_bytes())
        .map_err(|e| debug!("Quoted headers unreadable: {}", e))
        .ok()?;
    only(quoted.headers.mailboxes("From")?)
}

/// A `text/html` part with a forwarding marker followed by a header table
/// whose `From:` row links to the sender.
fn html_header_table(part: &Part) -> Option<Mailbox> {
    if !part.content_type.is("text", "html") {
        return None;
    }

    let html = part.text()?;
    let after_marker = &html[FORWARD_MARKER.find(&html)?.end()..];
    let table = &after_marker[after_marker.find(HEADER_TABLE_CLASS)?..];
    let table = match table.find("</table") {
        Some(end) => &table[..end],
        None => table,
    };

    TABLE_ROW
        .captures_iter(table)
        .filter_map(|row| {
            let row = row.get(1)?.as_str();
            let heading = TABLE_HEADING.captures(row)?.get(1)?.as_str();
            let label = TAG.replace_all(heading, "");
            if !label.trim().eq_ignore_ascii_case("From:") {
                return None;
            }

            let address = MAILTO.captures(row)?.get(1)?.as_str();
            parse_single_mailbox(address.trim().as_bytes())
        })
        .next()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::*;

    fn sender_of(data: &[u8]) -> Result<String, Error> {
        forwarded_sender(&parse(data).unwrap()).map(|m| m.address())
    }

    #[test]
    fn attached_message() {
        assert_eq!("alice@example.org", sender_of(FORWARD_NESTED).unwrap());
    }

    #[test]
    fn plain_text_quote_block() {
        assert_eq!("alice@example.org", sender_of(FORWARD_PLAIN).unwrap());
    }

    #[test]
    fn html_header_table_row() {
        assert_eq!("alice@example.org", sender_of(FORWARD_HTML).unwrap());
    }

    #[test]
    fn ordinary_message_has_no_forwarded_sender() {
        assert_matches!(
            Err(Error::ForwardedSenderNotFound),
            sender_of(CLASSIFY)
        );
    }

    #[test]
    fn marker_without_usable_headers() {
        let data = variant(
            FORWARD_PLAIN,
            &[("From: \tAlice Example <alice@example.org>\r\n", "")],
        );
        assert_matches!(Err(Error::ForwardedSenderNotFound), sender_of(&data));

        let data =
            variant(FORWARD_PLAIN, &[("Subject: \tMeeting", "not a header")]);
        assert_matches!(Err(Error::ForwardedSenderNotFound), sender_of(&data));

        let data = variant(
            FORWARD_PLAIN,
            &[("-------- Forwarded Message --------", "-- Forwarded --")],
        );
        assert_matches!(Err(Error::ForwardedSenderNotFound), sender_of(&data));
    }

    #[test]
    fn html_without_table_or_link() {
        let data = variant(
            FORWARD_HTML,
            &[("moz-email-headers-table", "plain-table")],
        );
        assert_matches!(Err(Error::ForwardedSenderNotFound), sender_of(&data));

        let data = variant(
            FORWARD_HTML,
            &[("href=3D\"mailto:alice@example.org\"", "href=3D\"#\"")],
        );
        assert_matches!(Err(Error::ForwardedSenderNotFound), sender_of(&data));
    }

    #[test]
    fn table_before_marker_is_ignored() {
        let data = variant(
            FORWARD_HTML,
            &[("-------- Forwarded Message --------", "(forwarded)")],
        );
        assert_matches!(Err(Error::ForwardedSenderNotFound), sender_of(&data));
    }

    #[test]
    fn earlier_part_wins() {
        // A quoted block in the first text part is found before the
        // attached message that follows it.
        let data = variant(
            FORWARD_NESTED,
            &[(
                "FYI\r\n",
                "FYI\r\n\r\n----- Forwarded Message -----\r\n\
                 From: Bob <bob@example.net>\r\n\r\n",
            )],
        );
        assert_eq!("bob@example.net", sender_of(&data).unwrap());
    }
}

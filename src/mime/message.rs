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

//! Reading an RFC 5322 message into a header multimap and MIME part tree.

use std::fmt;

use encoding_rs::Encoding;
use log::debug;
use memchr::memchr;
use thiserror::Error;

use super::encoded_word::decode_unstructured;
use super::header::{
    parse_content_type, parse_mailboxes, parse_transfer_encoding,
};
use super::model::{ContentType, Mailbox};
use super::quoted_printable::qp_decode;
use crate::support::error::Error;

/// Deepest permitted nesting of multiparts and embedded messages.
pub const MAX_DEPTH: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("duplicate {0} header")]
pub struct DuplicateHeader(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    /// The unfolded value with surrounding whitespace removed.
    pub value: String,
}

/// Headers in the order they appeared. Lookups ignore the case of the name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    pub fn get_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + 'n
    where
        'a: 'n,
    {
        self.0
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Look up a header that must not be repeated.
    pub fn single(&self, name: &str) -> Result<Option<&str>, DuplicateHeader> {
        let mut values = self.get_all(name);
        let first = values.next();
        if values.next().is_some() {
            Err(DuplicateHeader(name.to_owned()))
        } else {
            Ok(first)
        }
    }

    /// Parse the first `name` header as an address list.
    ///
    /// Returns `None` if the header is absent or not syntactically valid.
    pub fn mailboxes(&self, name: &str) -> Option<Vec<Mailbox>> {
        parse_mailboxes(self.get(name)?.as_bytes())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn content_headers(&self) -> Self {
        Headers(
            self.0
                .iter()
                .filter(|h| {
                    h.name.len() > 8
                        && h.name[..8].eq_ignore_ascii_case("content-")
                })
                .cloned()
                .collect(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedMessage {
    pub headers: Headers,
    /// The top-level body. Its own headers are only the `Content-*` subset
    /// of the message headers.
    pub body: Part,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub headers: Headers,
    pub content_type: ContentType,
    pub body: Body,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// Transfer-decoded content.
    Leaf(Vec<u8>),
    Multipart(Vec<Part>),
    Message(Box<ParsedMessage>),
}

impl ParsedMessage {
    /// Iterate every part depth-first, starting with the top-level body.
    ///
    /// Parts of embedded messages are included.
    pub fn parts(&self) -> Parts<'_> {
        Parts {
            stack: vec![&self.body],
        }
    }

    /// The `Subject`, with encoded words decoded.
    pub fn subject(&self) -> Option<String> {
        self.headers.get("Subject").map(decode_unstructured)
    }
}

impl Part {
    /// Charset-decode a leaf part.
    ///
    /// Returns `None` for multiparts and embedded messages.
    pub fn text(&self) -> Option<String> {
        let data = match self.body {
            Body::Leaf(ref data) => data,
            _ => return None,
        };

        let encoding = self
            .content_type
            .parm("charset")
            .and_then(|cs| Encoding::for_label(cs.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);
        Some(encoding.decode_with_bom_removal(data).0.into_owned())
    }
}

pub struct Parts<'a> {
    stack: Vec<&'a Part>,
}

impl<'a> Iterator for Parts<'a> {
    type Item = &'a Part;

    fn next(&mut self) -> Option<&'a Part> {
        let part = self.stack.pop()?;
        match part.body {
            Body::Leaf(_) => (),
            Body::Multipart(ref children) => {
                self.stack.extend(children.iter().rev())
            },
            Body::Message(ref message) => self.stack.push(&message.body),
        }
        Some(part)
    }
}

enum ReadError {
    Malformed(String),
    TooDeep,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ReadError::Malformed(ref why) => write!(f, "{}", why),
            ReadError::TooDeep => write!(
                f,
                "MIME structure nested more than {} levels",
                MAX_DEPTH
            ),
        }
    }
}

impl From<ReadError> for Error {
    fn from(e: ReadError) -> Self {
        Error::MalformedMessage(e.to_string())
    }
}

/// Read a complete message.
pub fn parse(data: &[u8]) -> Result<ParsedMessage, Error> {
    Ok(parse_message(data, 0)?)
}

fn parse_message(
    data: &[u8],
    depth: usize,
) -> Result<ParsedMessage, ReadError> {
    let data = skip_mbox_from_line(data);
    let (header_block, body) = split_header_block(data);
    let headers = parse_headers(header_block)?;
    if headers.is_empty() {
        return Err(ReadError::Malformed("message has no headers".to_owned()));
    }

    let body = parse_part(headers.content_headers(), body, depth)?;
    Ok(ParsedMessage { headers, body })
}

fn skip_mbox_from_line(data: &[u8]) -> &[u8] {
    if data.starts_with(b"From ") {
        match memchr(b'\n', data) {
            Some(eol) => &data[eol + 1..],
            None => &[],
        }
    } else {
        data
    }
}

/// Iterate lines without their line endings (`\n` or `\r\n`).
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let data = data.strip_suffix(b"\n").unwrap_or(data);
    data.split(|&b| b'\n' == b)
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(move |_| !data.is_empty())
}

/// Split at the first empty line. The body is empty if there is none.
fn split_header_block(data: &[u8]) -> (&[u8], &[u8]) {
    let mut start = 0;
    while start < data.len() {
        let end = memchr(b'\n', &data[start..])
            .map(|ix| start + ix + 1)
            .unwrap_or_else(|| data.len());
        let line = &data[start..end];
        if b"\n" == line || b"\r\n" == line {
            return (&data[..start], &data[end..]);
        }
        start = end;
    }
    (data, &[])
}

fn is_field_name_char(b: u8) -> bool {
    b > b' ' && b < 0x7F && b':' != b
}

fn parse_headers(block: &[u8]) -> Result<Headers, ReadError> {
    let mut headers: Vec<Header> = Vec::new();

    for line in lines(block) {
        if line.starts_with(b" ") || line.starts_with(b"\t") {
            match headers.last_mut() {
                Some(last) => {
                    last.value.push_str(&String::from_utf8_lossy(line))
                },
                None => {
                    return Err(ReadError::Malformed(
                        "continuation line before first header".to_owned(),
                    ))
                },
            }
            continue;
        }

        let colon = memchr(b':', line).ok_or_else(|| {
            ReadError::Malformed(format!(
                "header line without colon: {:?}",
                String::from_utf8_lossy(line)
            ))
        })?;

        // Obsolete syntax permits whitespace before the colon
        let name = &line[..colon];
        let name_len = name
            .iter()
            .rposition(|&b| b' ' != b && b'\t' != b)
            .map_or(0, |ix| ix + 1);
        let name = &name[..name_len];
        if name.is_empty() || !name.iter().copied().all(is_field_name_char) {
            return Err(ReadError::Malformed(format!(
                "invalid header name: {:?}",
                String::from_utf8_lossy(name)
            )));
        }

        headers.push(Header {
            name: String::from_utf8_lossy(name).into_owned(),
            value: String::from_utf8_lossy(&line[colon + 1..]).into_owned(),
        });
    }

    for header in &mut headers {
        header.value = header.value.trim().to_owned();
    }
    Ok(Headers(headers))
}

fn parse_part(
    headers: Headers,
    body: &[u8],
    depth: usize,
) -> Result<Part, ReadError> {
    let content_type = headers
        .get("Content-Type")
        .and_then(|ct| parse_content_type(ct.as_bytes()))
        .unwrap_or_default();

    let body = if content_type.is_type("multipart") {
        match content_type.parm("boundary") {
            Some(boundary) => {
                parse_multipart(body, boundary.as_bytes(), depth + 1)?
            },
            None => {
                debug!("multipart without boundary, treating as opaque");
                Body::Leaf(body.to_vec())
            },
        }
    } else if content_type.is("message", "rfc822")
        || content_type.is("message", "global")
    {
        if depth + 1 > MAX_DEPTH {
            return Err(ReadError::TooDeep);
        }

        let decoded = transfer_decode(&headers, body);
        match parse_message(&decoded, depth + 1) {
            Ok(message) => Body::Message(Box::new(message)),
            Err(ReadError::TooDeep) => return Err(ReadError::TooDeep),
            Err(ReadError::Malformed(why)) => {
                debug!("unreadable embedded message, kept opaque: {}", why);
                Body::Leaf(decoded)
            },
        }
    } else {
        Body::Leaf(transfer_decode(&headers, body))
    };

    Ok(Part {
        headers,
        content_type,
        body,
    })
}

fn parse_multipart(
    body: &[u8],
    boundary: &[u8],
    depth: usize,
) -> Result<Body, ReadError> {
    if depth > MAX_DEPTH {
        return Err(ReadError::TooDeep);
    }

    let mut delimiter = b"--".to_vec();
    delimiter.extend_from_slice(boundary);

    let mut chunks: Vec<Vec<&[u8]>> = Vec::new();
    let mut current: Option<Vec<&[u8]>> = None;
    for line in lines(body) {
        if line.starts_with(&delimiter) {
            let tail = &line[delimiter.len()..];
            if tail.starts_with(b"--") {
                chunks.extend(current.take());
                break;
            }
            if tail.iter().all(|&b| b' ' == b || b'\t' == b) {
                chunks.extend(current.take());
                current = Some(Vec::new());
                continue;
            }
        }

        // Lines before the first delimiter are the preamble
        if let Some(ref mut current) = current {
            current.push(line);
        }
    }
    // An unterminated final part is kept
    chunks.extend(current.take());

    let mut parts = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let data = chunk.join(&b"\r\n"[..]);
        let (header_block, content) =
            if chunk.first().map_or(true, |l| l.is_empty()) {
                // No part headers
                (&[][..], skip_line(&data))
            } else {
                split_header_block(&data)
            };
        let headers = parse_headers(header_block)?;
        parts.push(parse_part(headers, content, depth)?);
    }

    Ok(Body::Multipart(parts))
}

fn skip_line(data: &[u8]) -> &[u8] {
    match memchr(b'\n', data) {
        Some(eol) => &data[eol + 1..],
        None => &[],
    }
}

fn transfer_decode(headers: &Headers, body: &[u8]) -> Vec<u8> {
    let encoding = headers
        .get("Content-Transfer-Encoding")
        .and_then(|cte| parse_transfer_encoding(cte.as_bytes()));

    match encoding.as_deref() {
        Some("base64") => {
            let compact: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            base64::decode(&compact).unwrap_or_else(|e| {
                debug!("bad base64 content, kept verbatim: {}", e);
                body.to_vec()
            })
        },
        Some("quoted-printable") => qp_decode(body),
        _ => body.to_vec(),
    }
}

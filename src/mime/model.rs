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

use std::borrow::Cow;
use std::fmt;

use super::encoded_word::decode_unstructured;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrSpec<'a> {
    pub local: Vec<Cow<'a, [u8]>>,
    pub domain: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSpec<'a> {
    pub addr: AddrSpec<'a>,
    pub name: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSpec<'a> {
    pub name: Vec<Cow<'a, [u8]>>,
    pub boxes: Vec<MailboxSpec<'a>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address<'a> {
    Mailbox(MailboxSpec<'a>),
    Group(GroupSpec<'a>),
}

/// A mailbox with its syntax resolved into plain strings.
///
/// The domain is always lower case. The local part keeps its case, since
/// only the receiving system knows whether it is significant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub display_name: Option<String>,
    pub local: String,
    pub domain: String,
}

impl Mailbox {
    /// The bare `local@domain` address.
    pub fn address(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display_name {
            Some(ref name) => write!(f, "{} <{}>", name, self.address()),
            None => write!(f, "{}", self.address()),
        }
    }
}

impl<'a> From<&MailboxSpec<'a>> for Mailbox {
    fn from(spec: &MailboxSpec<'a>) -> Self {
        let local = join_lossy(&spec.addr.local, ".");
        let domain = join_lossy(&spec.addr.domain, ".").to_ascii_lowercase();

        let mut name = String::new();
        for word in &spec.name {
            if b"." == &word[..] {
                name.push('.');
            } else {
                if !name.is_empty() {
                    name.push(' ');
                }
                name.push_str(&String::from_utf8_lossy(word));
            }
        }
        let name = decode_unstructured(&name).trim().to_owned();

        Mailbox {
            display_name: Some(name).filter(|n| !n.is_empty()),
            local,
            domain,
        }
    }
}

fn join_lossy(parts: &[Cow<'_, [u8]>], sep: &str) -> String {
    parts
        .iter()
        .map(|p| String::from_utf8_lossy(p))
        .collect::<Vec<_>>()
        .join(sep)
}

/// A parsed `Content-Type` header.
///
/// Type, subtype, and parameter names are lower case. Parameter values are
/// kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub parms: Vec<(String, String)>,
}

impl Default for ContentType {
    /// RFC 2045 default for parts without a `Content-Type`.
    fn default() -> Self {
        ContentType {
            typ: "text".to_owned(),
            subtype: "plain".to_owned(),
            parms: vec![("charset".to_owned(), "us-ascii".to_owned())],
        }
    }
}

impl ContentType {
    pub fn is(&self, typ: &str, subtype: &str) -> bool {
        self.typ == typ && self.subtype == subtype
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ == typ
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        self.parms
            .iter()
            .find(|&&(ref n, _)| n == name)
            .map(|&(_, ref v)| v.as_str())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.typ, self.subtype)
    }
}

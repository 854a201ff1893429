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

//! Deciding whether a message was submitted by an authenticated local user
//! through the trusted relay.

use std::io;

use lazy_static::lazy_static;
use log::{debug, warn};
use nix::unistd::User;
use regex::Regex;
use thiserror::Error;

use super::identity::{IdentityContext, VerifiedIdentity};
use crate::mime::message::{DuplicateHeader, Headers, ParsedMessage};
use crate::mime::model::Mailbox;
use crate::support::error::Error;

lazy_static! {
    /// The single hop of a message submitted by an authenticated user:
    ///
    /// `from <anything> by <host> (<mta>) with ESMTPSA <anything>
    /// auth=yes user=<user> for <local[+suffix]@domain>`
    static ref RELAY_PATH: Regex = Regex::new(
        concat!(
            r"^from\s+.+?\s+by\s+(\S+)\s+\(([^)]*)\)\s+with\s+ESMTPSA\s+",
            r".*?\bauth=yes\s+user=(\S+)\s+",
            r"for\s+<([^<>@+\s]+)(?:\+([A-Za-z0-9_.-]+))?@([^<>@\s]+)>",
        )
    ).unwrap();
}

/// Why a message was refused.
///
/// These are only ever logged. The sender of a refused message gets no
/// reply at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("{0}")]
    DuplicateHeader(#[from] DuplicateHeader),
    #[error("no DKIM signature for an accepted domain")]
    DkimDomain,
    #[error("From is not a valid address list: {0:?}")]
    SenderUnparsable(String),
    #[error("From must name exactly one mailbox, found {0}")]
    SenderCount(usize),
    #[error("sender {0} is not a local account")]
    UnknownUser(String),
    #[error("sender domain {0} is not accepted")]
    SenderDomain(String),
    #[error("Received header does not describe an authenticated submission")]
    ReceivedUnparsable,
    #[error("relayed by {actual}, expected {expected}")]
    HostnameMismatch { expected: String, actual: String },
    #[error("relay authenticated {actual}, but From names {expected}")]
    UserMismatch { expected: String, actual: String },
    #[error("recipient domain {0} is not accepted")]
    RecipientDomain(String),
}

/// Lookup of local accounts by name.
pub trait AccountDirectory {
    fn has_account(&self, name: &str) -> Result<bool, Error>;
}

impl<A: AccountDirectory + ?Sized> AccountDirectory for &A {
    fn has_account(&self, name: &str) -> Result<bool, Error> {
        (**self).has_account(name)
    }
}

/// The system password database.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAccounts;

impl AccountDirectory for SystemAccounts {
    fn has_account(&self, name: &str) -> Result<bool, Error> {
        User::from_name(name)
            .map(|user| user.is_some())
            .map_err(|e| {
                Error::Io(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Failed to look up user {}: {}", name, e),
                ))
            })
    }
}

pub struct Verifier<'a, A> {
    identity: &'a IdentityContext,
    accounts: A,
    check_username: bool,
}

impl<'a, A: AccountDirectory> Verifier<'a, A> {
    /// `insecure_disable_username_check` skips only the local account
    /// lookup of the sender. Every other check still applies.
    pub fn new(
        identity: &'a IdentityContext,
        accounts: A,
        insecure_disable_username_check: bool,
    ) -> Self {
        Verifier {
            identity,
            accounts,
            check_username: !insecure_disable_username_check,
        }
    }

    /// Run the DKIM, sender, and relay checks in that order, stopping at
    /// the first failure.
    pub fn verify(
        &self,
        message: &ParsedMessage,
    ) -> Result<VerifiedIdentity, Error> {
        let headers = &message.headers;

        self.check_dkim(headers)?;
        let sender = self.check_sender(headers)?;
        let (recipient_address, plus_suffix) =
            self.check_received(headers, &sender.local)?;
        headers.single("To").map_err(Rejection::from)?;
        let request_id = request_id(headers)?;

        debug!(
            "Verified sender={} recipient={} suffix={:?} request={}",
            sender.address(),
            recipient_address,
            plus_suffix,
            request_id
        );
        Ok(VerifiedIdentity::new(
            sender.address(),
            sender.local,
            recipient_address,
            plus_suffix,
            request_id,
        ))
    }

    fn check_dkim(&self, headers: &Headers) -> Result<(), Rejection> {
        let signature = headers
            .single("DKIM-Signature")?
            .ok_or(Rejection::MissingHeader("DKIM-Signature"))?;

        let signed_for_us = signature
            .split(';')
            .filter_map(|tag| {
                let tag = tag.trim();
                if tag.starts_with("d=") {
                    Some(tag[2..].trim())
                } else {
                    None
                }
            })
            .any(|domain| self.identity.accepts_domain(domain));

        if signed_for_us {
            Ok(())
        } else {
            Err(Rejection::DkimDomain)
        }
    }

    fn check_sender(&self, headers: &Headers) -> Result<Mailbox, Error> {
        let from = headers
            .single("From")
            .map_err(Rejection::from)?
            .ok_or(Rejection::MissingHeader("From"))?;

        let mut boxes = crate::mime::header::parse_mailboxes(from.as_bytes())
            .ok_or_else(|| Rejection::SenderUnparsable(from.to_owned()))?;
        if 1 != boxes.len() {
            return Err(Rejection::SenderCount(boxes.len()).into());
        }
        let sender = boxes.remove(0);

        if self.check_username {
            if !self.accounts.has_account(&sender.local)? {
                return Err(Rejection::UnknownUser(sender.local).into());
            }
        } else {
            warn!(
                "insecure_disable_username_check is set; \
                 not checking that '{}' is a local account",
                sender.local
            );
        }

        if !self.identity.accepts_domain(&sender.domain) {
            return Err(Rejection::SenderDomain(sender.domain).into());
        }

        Ok(sender)
    }

    fn check_received(
        &self,
        headers: &Headers,
        sender_user: &str,
    ) -> Result<(String, String), Rejection> {
        let received = headers
            .single("Received")?
            .ok_or(Rejection::MissingHeader("Received"))?;
        let captures = RELAY_PATH
            .captures(received)
            .ok_or(Rejection::ReceivedUnparsable)?;
        let group = |ix: usize| captures.get(ix).map_or("", |m| m.as_str());

        let hostname = group(1);
        debug!("Relay {} ({})", hostname, group(2));
        if !hostname.eq_ignore_ascii_case(&self.identity.hostname) {
            return Err(Rejection::HostnameMismatch {
                expected: self.identity.hostname.clone(),
                actual: hostname.to_owned(),
            });
        }

        let user = group(3);
        if user != sender_user {
            return Err(Rejection::UserMismatch {
                expected: sender_user.to_owned(),
                actual: user.to_owned(),
            });
        }

        let domain = group(6).to_ascii_lowercase();
        if !self.identity.accepts_domain(&domain) {
            return Err(Rejection::RecipientDomain(domain));
        }

        Ok((format!("{}@{}", group(4), domain), group(5).to_owned()))
    }
}

/// The correlation token for the reply: `X-Filterctl-Request-Id` if
/// present, otherwise `Message-ID`, without angle brackets.
pub fn request_id(headers: &Headers) -> Result<String, Error> {
    fn unbracketed<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
        headers
            .get(name)
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
            .filter(|id| !id.is_empty())
    }

    unbracketed(headers, "X-Filterctl-Request-Id")
        .or_else(|| unbracketed(headers, "Message-ID"))
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::MalformedMessage("message has no Message-ID".to_owned())
        })
}

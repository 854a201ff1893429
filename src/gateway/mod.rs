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

//! The mail-to-command gateway.
//!
//! A message read from standard input is parsed, checked for provenance,
//! turned into a command line, and run in a child process. The child's
//! output becomes the body of a reply to the verified sender.

pub mod command;
pub mod dispatch;
pub mod forwarded;
pub mod identity;
pub mod provenance;
pub mod reply;

use std::env;
use std::path::PathBuf;

use chrono::Local;
use log::{debug, info, warn};

use self::command::{synthesize, CommandInvocation};
use self::dispatch::Dispatcher;
use self::identity::{IdentityContext, VerifiedIdentity};
use self::provenance::{AccountDirectory, SystemAccounts, Verifier};
use crate::mime::message::parse;
use crate::support::error::Error;
use crate::support::system_config::{encode_request_id, SystemConfig};

/// What the pipeline produced for one message.
#[derive(Debug)]
pub enum Outcome {
    /// `disable_exec` is set; the command was synthesized but not run.
    Disabled(CommandInvocation),
    /// A reply ready for delivery to `to`.
    Reply { to: String, message: Vec<u8> },
}

pub struct Pipeline<'a, A = SystemAccounts> {
    config: &'a SystemConfig,
    identity: IdentityContext,
    accounts: A,
    dispatcher: Dispatcher,
    temp_dir: PathBuf,
}

impl<'a> Pipeline<'a, SystemAccounts> {
    pub fn new(
        config: &'a SystemConfig,
        identity: IdentityContext,
        dispatcher: Dispatcher,
    ) -> Self {
        Pipeline {
            config,
            identity,
            accounts: SystemAccounts,
            dispatcher,
            temp_dir: env::temp_dir(),
        }
    }
}

impl<'a, A: AccountDirectory> Pipeline<'a, A> {
    pub fn with_accounts<B: AccountDirectory>(
        self,
        accounts: B,
    ) -> Pipeline<'a, B> {
        Pipeline {
            config: self.config,
            identity: self.identity,
            accounts,
            dispatcher: self.dispatcher,
            temp_dir: self.temp_dir,
        }
    }

    /// Write payload files under `temp_dir` instead of the system default.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Process one raw message.
    ///
    /// Any error means no reply may be sent. A command which runs but fails
    /// is not an error; it yields a reply carrying a failure envelope.
    pub fn run(&self, raw: &[u8]) -> Result<Outcome, Error> {
        let message = parse(raw)?;
        if self.config.verbose {
            for header in message.headers.iter() {
                debug!("Header {}: {}", header.name, header.value);
            }
        }

        let verifier = Verifier::new(
            &self.identity,
            &self.accounts,
            self.config.insecure_disable_username_check,
        );
        let verified = verifier.verify(&message).map_err(|e| {
            if let Error::Provenance(ref rejection) = e {
                warn!("Rejected message: {}", rejection);
            }
            e
        })?;
        info!(
            "Accepted request {} from {} (user {}) to {}",
            verified.request_id(),
            verified.sender_address(),
            verified.sender_user(),
            verified.recipient_address()
        );

        let invocation = synthesize(&verified, &message, &self.temp_dir)?;
        if let Some(payload) = invocation.payload_file() {
            debug!(
                "Payload for {} in {}",
                invocation.command(),
                payload.display()
            );
        }
        if self.config.disable_exec {
            info!("disable_exec is set; not running {:?}", invocation.argv());
            return Ok(Outcome::Disabled(invocation));
        }

        let result = self
            .dispatcher
            .dispatch(&invocation, &self.child_env(&verified)?);
        let body = reply::response_payload(
            &invocation,
            &result,
            &verified,
            self.config.verbose,
        )?;
        let message = reply::compose(
            &verified,
            self.identity.primary_domain(),
            &body,
            Local::now().into(),
        );

        Ok(Outcome::Reply {
            to: verified.sender_address().to_owned(),
            message,
        })
    }

    /// The configuration snapshot handed to the child, carrying the
    /// verified sender and request.
    fn child_env(
        &self,
        verified: &VerifiedIdentity,
    ) -> Result<Vec<(String, String)>, Error> {
        let mut snapshot = self.config.clone();
        snapshot.sender = verified.sender_address().to_owned();
        snapshot.message_id = encode_request_id(verified.request_id());
        snapshot.to_env()
    }
}

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

use log::debug;
use nix::unistd::{getuid, User};

use crate::support::error::Error;
use crate::support::system_config::SystemConfig;

/// Who this process is and which mail it serves.
///
/// Built once per run from the configuration and never modified after.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityContext {
    /// Canonical name of the relay, compared against the `Received` header.
    pub hostname: String,
    /// Accepted domains, lower case. Never empty; the first is primary.
    pub domains: Vec<String>,
    /// Owner of this process.
    pub os_user: String,
}

impl IdentityContext {
    pub fn new(
        hostname: impl Into<String>,
        domains: Vec<String>,
        os_user: impl Into<String>,
    ) -> Result<Self, Error> {
        let hostname = hostname.into();
        let mut domains: Vec<String> = domains
            .into_iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        if hostname.is_empty() {
            return Err(Error::Config("hostname is empty".to_owned()));
        }

        if domains.is_empty() {
            // mail.example.com serves example.com
            let derived = match hostname.find('.') {
                Some(dot) if hostname[dot + 1..].contains('.') => {
                    &hostname[dot + 1..]
                },
                _ => &hostname[..],
            };
            domains.push(derived.to_ascii_lowercase());
        }

        Ok(IdentityContext {
            hostname,
            domains,
            os_user: os_user.into(),
        })
    }

    /// Build the context from the configuration, filling in the host name
    /// and process owner from the system.
    pub fn from_config(config: &SystemConfig) -> Result<Self, Error> {
        let hostname = if config.hostname.is_empty() {
            system_hostname()?
        } else {
            config.hostname.clone()
        };

        // Fall back to the numeric uid if it has no passwd entry
        let uid = getuid();
        let os_user = match User::from_uid(uid) {
            Ok(Some(user)) => user.name,
            _ => uid.to_string(),
        };

        let identity = IdentityContext::new(
            hostname,
            config.domains.clone(),
            os_user,
        )?;
        debug!(
            "Identity: hostname={} domains={:?} user={}",
            identity.hostname, identity.domains, identity.os_user
        );
        Ok(identity)
    }

    pub fn accepts_domain(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }

    pub fn primary_domain(&self) -> &str {
        &self.domains[0]
    }
}

fn system_hostname() -> Result<String, Error> {
    let mut buf = [0u8; 256];
    let name = nix::unistd::gethostname(&mut buf).map_err(|e| {
        Error::Config(format!("Failed to determine host name: {}", e))
    })?;
    name.to_str().map(str::to_owned).map_err(|_| {
        Error::Config("System host name is not valid UTF-8".to_owned())
    })
}

/// The outcome of a successful provenance check.
///
/// Only the verifier can construct one, so holding a `VerifiedIdentity` is
/// proof that the message came from an authenticated local user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity {
    sender_address: String,
    sender_user: String,
    recipient_address: String,
    plus_suffix: String,
    request_id: String,
}

impl VerifiedIdentity {
    pub(super) fn new(
        sender_address: String,
        sender_user: String,
        recipient_address: String,
        plus_suffix: String,
        request_id: String,
    ) -> Self {
        VerifiedIdentity {
            sender_address,
            sender_user,
            recipient_address,
            plus_suffix,
            request_id,
        }
    }

    pub fn sender_address(&self) -> &str {
        &self.sender_address
    }

    pub fn sender_user(&self) -> &str {
        &self.sender_user
    }

    pub fn recipient_address(&self) -> &str {
        &self.recipient_address
    }

    /// The `+suffix` of the recipient, or "" if there was none.
    pub fn plus_suffix(&self) -> &str {
        &self.plus_suffix
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

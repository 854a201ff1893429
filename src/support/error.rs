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

use std::io;

use thiserror::Error;

use super::sysexits::*;
use crate::gateway::provenance::Rejection;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Message rejected: {0}")]
    Provenance(#[from] Rejection),
    #[error("Plus-suffix message has no recoverable forwarded sender")]
    ForwardedSenderNotFound,
    #[error("Failed to launch '{program}': {source}")]
    Dispatch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid payload: {0}")]
    Payload(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("API request failed: {0}")]
    Api(String),
    #[error("Reply delivery failed: {0}")]
    Delivery(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// The exit status to report to the MTA for this error.
    pub fn sysexit(&self) -> Sysexit {
        match *self {
            Error::MalformedMessage(..)
            | Error::ForwardedSenderNotFound
            | Error::Payload(..) => EX_DATAERR,
            Error::Provenance(..) => EX_NOPERM,
            Error::Dispatch { .. } => EX_OSERR,
            Error::Config(..) => EX_CONFIG,
            Error::Api(..) | Error::Http(..) | Error::Delivery(..) => {
                EX_UNAVAILABLE
            },
            Error::Io(ref e) if io::ErrorKind::NotFound == e.kind() => {
                EX_NOINPUT
            },
            Error::Io(..) => EX_IOERR,
            Error::Json(..) => EX_SOFTWARE,
        }
    }
}

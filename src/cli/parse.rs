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

use std::io::{self, Read};

use crate::gateway::dispatch::Dispatcher;
use crate::gateway::identity::IdentityContext;
use crate::gateway::{reply, Outcome, Pipeline};
use crate::support::error::Error;
use crate::support::system_config::SystemConfig;

/// Handle the control message on standard input.
///
/// The exit status tells the delivering MTA what happened; no reply is sent
/// for anything that fails before the command runs.
pub(super) fn main(config: &SystemConfig) {
    if let Err(e) = parse(config) {
        die!(e.sysexit(), "{}", e);
    }
}

fn parse(config: &SystemConfig) -> Result<(), Error> {
    let mut raw = Vec::new();
    io::stdin().lock().read_to_end(&mut raw)?;

    let identity = IdentityContext::from_config(config)?;
    let dispatcher = Dispatcher::current_exe()?;
    match Pipeline::new(config, identity, dispatcher).run(&raw)? {
        Outcome::Disabled(_) => Ok(()),
        Outcome::Reply { to, message } => reply::deliver(&message, &to, config),
    }
}

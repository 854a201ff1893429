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

//! Constants from `sysexits.h`
//!
//! Filterctl runs as a `.forward` pipe, so its exit status is interpreted by
//! the MTA according to the sendmail conventions.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_UNAVAILABLE: Sysexit = Sysexit(69);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_OSERR: Sysexit = Sysexit(71);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_NOPERM: Sysexit = Sysexit(77);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }

    fn name(self) -> &'static str {
        match self.0 {
            64 => "EX_USAGE",
            65 => "EX_DATAERR",
            66 => "EX_NOINPUT",
            69 => "EX_UNAVAILABLE",
            70 => "EX_SOFTWARE",
            71 => "EX_OSERR",
            74 => "EX_IOERR",
            77 => "EX_NOPERM",
            78 => "EX_CONFIG",
            _ => "EX_?",
        }
    }
}

impl fmt::Display for Sysexit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_names_the_constant() {
        assert_eq!("EX_NOPERM(77)", EX_NOPERM.to_string());
        assert_eq!("EX_?(3)", Sysexit(3).to_string());
    }
}

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

pub mod api_client;
pub mod error;
pub mod safe_name;
pub mod sysexits;
pub mod system_config;

/// The `log4rs` pattern used by every appender.
///
/// The process id is baked in so that the lines written by the parent and by
/// the re-executed child can be told apart in a shared log file.
pub fn log_pattern() -> String {
    format!(
        "{{d(%Y/%m/%d %H:%M:%S)}} [{}] {{l}} {{m}}{{n}}",
        nix::unistd::getpid()
    )
}

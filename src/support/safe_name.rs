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

/// Determine whether the given name is safe to use as a single path segment
/// of a configuration service URL.
///
/// Command arguments come from the `Subject` line of a message, so they must
/// not be able to reach a different resource than the one the command names.
/// This excludes empty names and patterns that cause path traversal or that
/// start a query or fragment, as well as anything that would need escaping.
pub fn is_safe_segment(name: &str) -> bool {
    !name.is_empty() &&
        // Block traversal through . and ..
        name != "." &&
        name != ".." &&
        name.find('/').is_none() &&
        // Not a separator for the service, but some HTTP stacks treat it as one
        name.find('\\').is_none() &&
        // Would start a query string or fragment, or introduce an escape
        name.find(|c| c == '?' || c == '#' || c == '%').is_none() &&
        // No whitespace or ASCII control characters
        name.find(|c: char| c.is_whitespace() || c.is_control()).is_none()
}

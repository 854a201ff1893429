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

//! Messages as submitted by user `jdoe` through relay `mail.example.com` for
//! domain `example.com`.

/// Empty `Subject`.
pub static HELP: &[u8] = include_bytes!("help.eml");

/// `Subject: classify 5.0`
pub static CLASSIFY: &[u8] = include_bytes!("classify.eml");

/// Sent to `filterctl+friends`, forwarding a message from
/// `alice@example.org` as an attached `message/rfc822` part.
pub static FORWARD_NESTED: &[u8] = include_bytes!("forward_nested.eml");

/// The same forward, quoted inline as plain text.
pub static FORWARD_PLAIN: &[u8] = include_bytes!("forward_plain.eml");

/// The same forward, quoted inline as an HTML header table.
pub static FORWARD_HTML: &[u8] = include_bytes!("forward_html.eml");

/// `Subject: restore` with a base64-encoded JSON dump as the body.
pub static RESTORE_BASE64: &[u8] = include_bytes!("restore_base64.eml");

/// Apply textual replacements to a fixture, for building variants that
/// differ in one header.
pub fn variant(base: &[u8], replacements: &[(&str, &str)]) -> Vec<u8> {
    let mut text = String::from_utf8(base.to_vec()).unwrap();
    for &(from, to) in replacements {
        assert!(text.contains(from), "fixture does not contain {:?}", from);
        text = text.replacen(from, to, 1);
    }
    text.into_bytes()
}

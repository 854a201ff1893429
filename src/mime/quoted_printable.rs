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

//! RFC 2045 quoted-printable transfer encoding.

/// Longest encoded line, not counting the line ending.
const MAX_LINE: usize = 76;

/// Decode quoted-printable content.
///
/// Soft line breaks are removed with either line ending style. This never
/// fails: invalid or truncated escapes pass through untransformed, as do
/// 8-bit bytes.
pub fn qp_decode(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if b'=' != s[i] {
            out.push(s[i]);
            i += 1;
            continue;
        }

        let rest = &s[i + 1..];
        if rest.starts_with(b"\n") {
            i += 2;
        } else if rest.starts_with(b"\r\n") {
            i += 3;
        } else if let Some(b) = rest
            .get(..2)
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(b);
            i += 3;
        } else {
            out.push(b'=');
            i += 1;
        }
    }
    out
}

/// Encode `data` as quoted-printable.
///
/// Hard line breaks (`\r\n` or `\n`) are kept as given. Long lines are
/// split with `=\r\n` soft breaks. Besides non-printable bytes and `=`,
/// whitespace at the end of a line and a `.` at the start of one are
/// escaped so that no transport can mangle them.
pub fn qp_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / 8);
    let mut lines = data.split(|&b| b'\n' == b).peekable();

    while let Some(line) = lines.next() {
        let hard_break = lines.peek().is_some();
        let (line, ending) = if hard_break && line.ends_with(b"\r") {
            (&line[..line.len() - 1], "\r\n")
        } else if hard_break {
            (line, "\n")
        } else {
            (line, "")
        };

        let mut column = 0;
        for (ix, &b) in line.iter().enumerate() {
            let last = ix + 1 == line.len();
            let literal = match b {
                b'=' => false,
                b' ' | b'\t' => !last,
                b'!'..=b'~' => true,
                _ => false,
            };
            let width = if literal { 1 } else { 3 };

            // Leave room for the '=' of a soft break unless this is the
            // final byte of the line.
            let limit = if last { MAX_LINE } else { MAX_LINE - 1 };
            if column + width > limit {
                out.push_str("=\r\n");
                column = 0;
            }

            if literal && !(0 == column && b'.' == b) {
                out.push(b as char);
                column += 1;
            } else {
                out.push_str(&format!("={:02X}", b));
                column += 3;
            }
        }

        out.push_str(ending);
    }

    out
}

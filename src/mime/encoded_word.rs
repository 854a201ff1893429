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

//! RFC 2047 encoded words in unstructured headers and display names.

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

use super::quoted_printable::qp_decode;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"^=\?([!->@-~]*)\?([!->@-~]*)\?([!->@-~]*)\?=$").unwrap();
}

/// Decode `word` if it is, in its entirety, an RFC 2047 encoded word.
///
/// Returns `None` if it is not an encoded word or cannot be decoded. Over-long
/// encoded words are accepted since common agents produce them.
pub fn ew_decode(word: &str) -> Option<String> {
    let captures = ENCODED_WORD.captures(word)?;
    let charset = captures.get(1)?.as_str();
    let transfer_encoding = captures.get(2)?.as_str();
    let content = captures.get(3)?.as_str();

    let bytes = match transfer_encoding {
        "q" | "Q" => qp_decode(content.replace('_', " ").as_bytes()),
        "b" | "B" => base64::decode(content).ok()?,
        _ => return None,
    };

    // RFC 2231 allows a language suffix on the charset ("utf-8*en")
    let charset = charset.split('*').next().unwrap_or(charset);
    let (text, _) = Encoding::for_label_no_replacement(charset.as_bytes())?
        .decode_with_bom_removal(&bytes);
    Some(text.into_owned())
}

/// Decode every encoded word in an unstructured header value.
///
/// Whitespace between two adjacent encoded words is removed; all other text
/// is kept as is.
pub fn decode_unstructured(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = "";
    let mut after_encoded_word = false;
    let mut rest = value;

    while !rest.is_empty() {
        let ws_len = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or_else(|| rest.len());
        let (ws, tail) = rest.split_at(ws_len);
        if !ws.is_empty() {
            pending_space = ws;
            rest = tail;
            continue;
        }

        let word_len =
            rest.find(char::is_whitespace).unwrap_or_else(|| rest.len());
        let (word, tail) = rest.split_at(word_len);
        rest = tail;

        match ew_decode(word) {
            Some(decoded) => {
                if !after_encoded_word {
                    out.push_str(pending_space);
                }
                out.push_str(&decoded);
                after_encoded_word = true;
            },
            None => {
                out.push_str(pending_space);
                out.push_str(word);
                after_encoded_word = false;
            },
        }
        pending_space = "";
    }

    out.push_str(pending_space);
    out
}

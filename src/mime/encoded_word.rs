//-
// Copyright (c) 2024, Mailsort contributors
//
// This file is part of Mailsort.
//
// Mailsort is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mailsort is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailsort. If not, see <http://www.gnu.org/licenses/>.

//! RFC 2047 "encoded word" decoding.

use std::borrow::Cow;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    // Encoded words are not required to be surrounded by whitespace here.
    // Plenty of agents glue them onto adjacent text, and mail clients decode
    // them anyway.
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]+)\?([^?\s]+)\?([^?\s]*)\?=").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodedWordError {
    #[error("unknown charset {0:?}")]
    UnknownCharset(String),
    #[error("unknown transfer encoding {0:?}")]
    UnknownEncoding(String),
    #[error("bad base64 in encoded word: {0}")]
    Base64(String),
}

/// Decode all encoded words within an unstructured header value.
///
/// Whitespace between two adjacent encoded words is dropped, as RFC 2047
/// requires; all other text passes through unchanged.
///
/// If any encoded word in `s` cannot be decoded, the whole value is
/// rejected. The caller is expected to fall back to the raw text.
pub fn ew_decode_unstructured(s: &str) -> Result<Cow<str>, EncodedWordError> {
    let mut out = String::new();
    let mut last = 0;
    let mut any = false;

    for captures in ENCODED_WORD.captures_iter(s) {
        let whole = match captures.get(0) {
            Some(whole) => whole,
            None => continue,
        };
        let gap = &s[last..whole.start()];
        if !(any && gap.chars().all(char::is_whitespace)) {
            out.push_str(gap);
        }

        out.push_str(&decode_word(
            &captures[1],
            &captures[2],
            &captures[3],
        )?);
        last = whole.end();
        any = true;
    }

    if !any {
        return Ok(Cow::Borrowed(s));
    }

    out.push_str(&s[last..]);
    Ok(Cow::Owned(out))
}

fn decode_word(
    charset: &str,
    transfer_encoding: &str,
    content: &str,
) -> Result<String, EncodedWordError> {
    // RFC 2231 allows a language suffix on the charset
    let charset = charset.split('*').next().unwrap_or(charset);
    let encoding = Encoding::for_label_no_replacement(charset.as_bytes())
        .ok_or_else(|| EncodedWordError::UnknownCharset(charset.to_owned()))?;

    let bytes = match transfer_encoding {
        "q" | "Q" => q_decode(content.as_bytes()),
        "b" | "B" => base64::decode(content)
            .map_err(|e| EncodedWordError::Base64(e.to_string()))?,
        _ => {
            return Err(EncodedWordError::UnknownEncoding(
                transfer_encoding.to_owned(),
            ))
        }
    };

    Ok(encoding.decode_with_bom_removal(&bytes).0.into_owned())
}

/// Decode the "Q" encoding, which is quoted-printable with `_` standing for
/// a space.
///
/// Malformed escapes are passed through verbatim.
fn q_decode(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut ix = 0;
    while ix < content.len() {
        match content[ix] {
            b'_' => out.push(b' '),
            b'=' => match hex_byte(&content[ix + 1..]) {
                Some(b) => {
                    out.push(b);
                    ix += 2;
                }
                None => out.push(b'='),
            },
            b => out.push(b),
        }
        ix += 1;
    }

    out
}

fn hex_byte(s: &[u8]) -> Option<u8> {
    if s.len() < 2 {
        return None;
    }

    let hi = (s[0] as char).to_digit(16)?;
    let lo = (s[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

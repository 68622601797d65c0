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

//! Extraction of the RFC 5322 header block of a message.
//!
//! This is deliberately permissive. Nothing here can fail on malformed
//! content; at worst, lines that don't look like headers are skipped.

use std::borrow::Cow;
use std::io::{self, BufRead};
use std::str;

/// Stop reading headers after this many bytes.
#[cfg(not(test))]
const MAX_HEADER_BLOCK: u64 = 1024 * 1024;
#[cfg(test)]
const MAX_HEADER_BLOCK: u64 = 4096;

/// A single unfolded header, with its name lower-cased and its value still
/// in raw (not RFC 2047 decoded) form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHeader {
    pub name: String,
    pub value: String,
}

/// Read everything up to (but excluding) the blank line that ends the header
/// block.
///
/// EOF is treated as the end of the header block as well, so a message with
/// no body still has its headers read.
pub fn read_header_block(r: impl BufRead) -> io::Result<Vec<u8>> {
    let mut block = Vec::new();
    let mut r = r.take(MAX_HEADER_BLOCK);
    loop {
        let start = block.len();
        if 0 == r.read_until(b'\n', &mut block)? {
            break;
        }

        let line = &block[start..];
        if b"\n" == line || b"\r\n" == line {
            block.truncate(start);
            break;
        }
    }

    Ok(block)
}

/// Split a header block into individual headers, unfolding continuation
/// lines.
pub fn split_headers(block: &[u8]) -> Vec<RawHeader> {
    let mut headers = Vec::new();
    let mut current: Option<Vec<u8>> = None;

    let mut start = 0;
    let ends = memchr::memchr_iter(b'\n', block)
        .map(|ix| ix + 1)
        .chain(std::iter::once(block.len()));
    for end in ends {
        if start >= end {
            continue;
        }

        let line = trim_line_ending(&block[start..end]);
        start = end;

        if line.is_empty() {
            break;
        }

        if b' ' == line[0] || b'\t' == line[0] {
            // Unfolding is just removing the line break before the
            // whitespace.
            if let Some(ref mut current) = current {
                current.extend_from_slice(line);
            }
            continue;
        }

        if let Some(complete) = current.replace(line.to_vec()) {
            headers.extend(parse_header(&complete));
        }
    }

    if let Some(complete) = current {
        headers.extend(parse_header(&complete));
    }

    headers
}

fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    if let Some(b'\n') = line.last() {
        line = &line[..line.len() - 1];
    }
    if let Some(b'\r') = line.last() {
        line = &line[..line.len() - 1];
    }
    line
}

fn parse_header(unfolded: &[u8]) -> Option<RawHeader> {
    let colon = memchr::memchr(b':', unfolded)?;
    let name = decode_text(&unfolded[..colon]);
    let name = name.trim_end();
    // This also rejects things like the mbox "From " line
    if name.is_empty()
        || name.contains(|c: char| c.is_whitespace() || c.is_control())
    {
        return None;
    }

    Some(RawHeader {
        name: name.to_lowercase(),
        value: decode_text(&unfolded[colon + 1..]).trim().to_owned(),
    })
}

/// Convert raw header bytes to text.
///
/// UTF-8 (RFC 6532) is used if the bytes are valid UTF-8. Otherwise each byte
/// is taken as an ISO-8859-1 character, which can represent every byte value,
/// so this never fails.
pub fn decode_text(raw: &[u8]) -> Cow<str> {
    match str::from_utf8(raw) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn header(name: &str, value: &str) -> RawHeader {
        RawHeader {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }

    #[test]
    fn read_header_block_stops_at_blank_line() {
        let block = read_header_block(
            &b"From: a@b\r\nSubject: hi\r\n\r\nBody: not a header\r\n"[..],
        )
        .unwrap();
        assert_eq!(&b"From: a@b\r\nSubject: hi\r\n"[..], &block[..]);

        let block =
            read_header_block(&b"From: a@b\nSubject: hi\n\nbody\n"[..])
                .unwrap();
        assert_eq!(&b"From: a@b\nSubject: hi\n"[..], &block[..]);
    }

    #[test]
    fn read_header_block_without_body() {
        let block = read_header_block(&b"From: a@b\nSubject: hi"[..]).unwrap();
        assert_eq!(&b"From: a@b\nSubject: hi"[..], &block[..]);
    }

    #[test]
    fn read_header_block_is_bounded() {
        let mut huge = b"X-Junk: ".to_vec();
        huge.extend(std::iter::repeat(b'x').take(10 * MAX_HEADER_BLOCK as usize));
        let block = read_header_block(&huge[..]).unwrap();
        assert_eq!(MAX_HEADER_BLOCK as usize, block.len());
    }

    #[test]
    fn split_simple() {
        assert_eq!(
            vec![
                header("from", "Alice <alice@example.com>"),
                header("to", "bob@example.com"),
                header("subject", "Hello"),
            ],
            split_headers(
                b"From: Alice <alice@example.com>\r\n\
                  To:bob@example.com\r\n\
                  SUBJECT:   Hello  \r\n"
            )
        );
    }

    #[test]
    fn split_unfolds_continuations() {
        assert_eq!(
            vec![
                header("subject", "A long subject\tline"),
                header("to", "a@b,  c@d"),
            ],
            split_headers(b"Subject: A long\r\n subject\n\tline\nTo: a@b,\n  c@d")
        );
    }

    #[test]
    fn split_skips_junk() {
        assert_eq!(
            vec![header("x-ok", "yes"), header("x-empty", "")],
            split_headers(
                b"From someone@example.com Mon Jan  1 00:00:00 2020\n\
                  \x20orphan continuation\n\
                  no colon here\n\
                  : no name\n\
                  X-OK: yes\n\
                  X-Empty:\n"
            )
        );
    }

    #[test]
    fn split_handles_8bit() {
        assert_eq!(
            vec![
                header("subject", "Grüße"),
                header("x-latin1", "Gr\u{fc}\u{df}e"),
            ],
            split_headers(
                b"Subject: Gr\xc3\xbc\xc3\x9fe\nX-Latin1: Gr\xfc\xdfe\n"
            )
        );
    }

    proptest! {
        #[test]
        fn split_never_panics(
            block in prop::collection::vec(prop::num::u8::ANY, 0..200)
        ) {
            split_headers(&block);
        }

        #[test]
        fn read_never_panics(
            block in prop::collection::vec(prop::num::u8::ANY, 0..200)
        ) {
            read_header_block(&block[..]).unwrap();
        }
    }
}

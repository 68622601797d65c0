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

//! The in-memory view of a single message file.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::error;
use regex::{Regex, RegexBuilder};

use crate::maildir::{self, Subdir, FLAG_SEPARATOR};
use crate::mime::encoded_word::ew_decode_unstructured;
use crate::mime::header::{read_header_block, split_headers};
use crate::support::error::Error;
use crate::support::logging::escape;

pub mod actions;
pub mod subprocess;

/// Headers that identify the mailing list a message came through.
const LIST_HEADERS: &[&str] =
    &["delivered-to", "mailing-list", "x-beenthere", "x-mailing-list"];

/// Joins multiple occurrences of the same header.
const OCCURRENCE_SEPARATOR: &str = "\n";

/// A message in a maildir.
///
/// The headers are read when the `Mail` is created, and re-read whenever an
/// action replaces the file's content.
#[derive(Debug)]
pub struct Mail {
    maildir: String,
    path: PathBuf,
    headers: HashMap<String, String>,
}

impl Mail {
    /// Load the message at `path`, which belongs to `maildir`.
    ///
    /// This never fails. If the file cannot be read (typically because
    /// another process moved or deleted it since the directory was listed),
    /// that is logged and the message simply has no headers.
    pub fn new(maildir: String, path: PathBuf) -> Self {
        let mut this = Mail {
            maildir,
            path,
            headers: HashMap::new(),
        };
        this.reload_headers();
        this
    }

    /// Re-read the headers from the file.
    pub fn reload_headers(&mut self) {
        self.headers = match self.read_headers() {
            Ok(headers) => headers,
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                error!("{}: vanished before it could be read", self);
                HashMap::new()
            }
            Err(e) => {
                error!("{}: unable to read headers: {}", self, e);
                HashMap::new()
            }
        };
    }

    fn read_headers(&self) -> io::Result<HashMap<String, String>> {
        let file = fs::File::open(&self.path)?;
        let block = read_header_block(io::BufReader::new(file))?;

        let mut headers = HashMap::<String, String>::new();
        for raw in split_headers(&block) {
            let value = match ew_decode_unstructured(&raw.value) {
                Ok(decoded) => decoded.into_owned(),
                Err(e) => {
                    error!(
                        "{}: undecodable {} header {:?}: {}",
                        self,
                        raw.name,
                        escape(&raw.value),
                        e
                    );
                    raw.value
                }
            };

            headers
                .entry(raw.name)
                .and_modify(|existing| {
                    existing.push_str(OCCURRENCE_SEPARATOR);
                    existing.push_str(&value);
                })
                .or_insert_with(|| value.clone());
        }

        Ok(headers)
    }

    /// The maildir, relative to the base directory, this message is in.
    pub fn maildir(&self) -> &str {
        &self.maildir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()?.to_str()
    }

    pub fn subdir(&self) -> Option<Subdir> {
        Subdir::of(&self.path)
    }

    pub fn is_new(&self) -> bool {
        Some(Subdir::New) == self.subdir()
    }

    /// The maildir flag characters (the part after `:2,`), if any.
    pub fn flags(&self) -> Option<&str> {
        self.file_name()
            .and_then(maildir::flag_part)
            .map(|f| &f[FLAG_SEPARATOR.len()..])
    }

    /// Called after the message file has been renamed to `path` in `maildir`.
    pub(crate) fn relocate(&mut self, maildir: String, path: PathBuf) {
        self.maildir = maildir;
        self.path = path;
    }

    /// Look a header up by case-insensitive name.
    ///
    /// A header that isn't present produces an empty view rather than an
    /// error; every test on it is false.
    pub fn header(&self, name: &str) -> HeaderView<'_> {
        HeaderView(self.headers.get(&name.to_lowercase()).map(String::as_str))
    }

    /// The combination of the `To` and `Cc` headers.
    pub fn target(&self) -> Target<'_> {
        Target {
            to: self.header("to"),
            cc: self.header("cc"),
        }
    }

    /// Whether any of the list-identifying headers mentions `name`.
    pub fn from_mailing_list(&self, name: &str) -> bool {
        LIST_HEADERS.iter().any(|h| self.header(h).contains(name))
    }
}

impl fmt::Display for Mail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let subdir = self.subdir().map_or("?", Subdir::as_str);
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if self.maildir.is_empty() {
            write!(f, "{}/{}", subdir, escape(&name))
        } else {
            write!(f, "{}/{}/{}", escape(&self.maildir), subdir, escape(&name))
        }
    }
}

/// A case-insensitive, multi-line regular expression for matching against
/// header values.
#[derive(Clone, Debug)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, Error> {
        Ok(Pattern(
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .multi_line(true)
                .build()?,
        ))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.0.is_match(s)
    }
}

/// The decoded value of one header, possibly absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderView<'a>(Option<&'a str>);

impl<'a> HeaderView<'a> {
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.0
    }

    /// Case-insensitive substring test.
    pub fn contains(&self, needle: &str) -> bool {
        self.0.map_or(false, |value| {
            value.to_lowercase().contains(&needle.to_lowercase())
        })
    }

    /// Test whether `pattern` matches anywhere in the value.
    pub fn matches(&self, pattern: &Pattern) -> bool {
        self.0.map_or(false, |value| pattern.is_match(value))
    }

    /// Like `matches()`, but compiles `pattern` first.
    pub fn matches_str(&self, pattern: &str) -> Result<bool, Error> {
        Ok(self.matches(&Pattern::new(pattern)?))
    }
}

/// The recipients of a message, i.e., `To` and `Cc` taken together.
#[derive(Clone, Copy, Debug)]
pub struct Target<'a> {
    to: HeaderView<'a>,
    cc: HeaderView<'a>,
}

impl Target<'_> {
    pub fn contains(&self, needle: &str) -> bool {
        self.to.contains(needle) || self.cc.contains(needle)
    }

    pub fn matches(&self, pattern: &Pattern) -> bool {
        self.to.matches(pattern) || self.cc.matches(pattern)
    }

    pub fn matches_str(&self, pattern: &str) -> Result<bool, Error> {
        Ok(self.matches(&Pattern::new(pattern)?))
    }
}

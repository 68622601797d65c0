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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No maildirs configured")]
    NoMaildirs,
    #[error("Unsafe maildir name: {0:?}")]
    UnsafeMaildirName(String),
    #[error("Message file vanished (moved or deleted concurrently)")]
    Vanished,
    #[error("{} is not inside a cur/ or new/ directory", .0.display())]
    NotInMaildir(PathBuf),
    #[error("Filter exited with status {0}")]
    FilterFailed(i32),
    #[error("Filter was killed by a signal")]
    FilterKilled,
    #[error("Mail transfer command exited with status {0}")]
    TransportFailed(i32),
    #[error("Mail transfer command was killed by a signal")]
    TransportKilled,
    #[error("No addresses to forward to")]
    NoAddresses,
    #[error("Empty command")]
    EmptyCommand,
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is the result of another process (usually the
    /// delivery agent or a mail client) moving or removing a file out from
    /// under us.
    pub fn is_race(&self) -> bool {
        match *self {
            Error::Vanished => true,
            Error::Io(ref e) => io::ErrorKind::NotFound == e.kind(),
            _ => false,
        }
    }
}

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

//! Miscellaneous functions for working with files inside a maildir.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::support::error::Error;

/// Exclusively create a file named exactly `name` inside `tmp`.
///
/// The file is removed again when the returned handle is dropped without
/// being persisted, so an aborted action never leaves anything behind in
/// `tmp/`. An existing file of the same name is an `AlreadyExists` error.
pub fn stage(tmp: impl AsRef<Path>, name: &str) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(name)
        .suffix("")
        .rand_bytes(0)
        .tempfile_in(tmp)
}

/// Write `data` into a new file named `name` within `tmp`, then atomically
/// link it into place at `path`.
///
/// Fails without touching `path` if something is already there.
pub fn spit(
    tmp: impl AsRef<Path>,
    name: &str,
    path: impl AsRef<Path>,
    data: &[u8],
) -> Result<(), Error> {
    let mut tf = stage(tmp, name)?;
    tf.as_file_mut().write_all(data)?;
    tf.as_file_mut().sync_all()?;
    tf.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn chmod(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }
}

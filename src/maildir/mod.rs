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

//! Layout of a maildir on disk.
//!
//! Every maildir has `tmp/`, `new/` and `cur/` subdirectories. Files are only
//! ever created in `tmp/` and become visible in `new/` or `cur/` through a
//! single rename, so that readers never see a partial message.

use std::path::{Path, PathBuf};

pub mod scanner;
pub mod unique_name;

/// Marks the start of the "info" part of a file name in `cur/`.
pub const FLAG_SEPARATOR: &str = ":2,";

/// The two subdirectories in which messages are visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subdir {
    Cur,
    New,
}

/// The order subdirectories are scanned in.
pub const SUBDIRS: [Subdir; 2] = [Subdir::Cur, Subdir::New];

impl Subdir {
    pub fn as_str(self) -> &'static str {
        match self {
            Subdir::Cur => "cur",
            Subdir::New => "new",
        }
    }

    /// Determine which subdirectory the message file at `path` lives in.
    pub fn of(path: &Path) -> Option<Self> {
        match path.parent()?.file_name()?.to_str()? {
            "cur" => Some(Subdir::Cur),
            "new" => Some(Subdir::New),
            _ => None,
        }
    }
}

/// Resolve a maildir name against the base directory.
///
/// The empty name refers to the base directory itself.
pub fn maildir_path(base: &Path, name: &str) -> PathBuf {
    if name.is_empty() {
        base.to_owned()
    } else {
        base.join(name)
    }
}

/// The maildir root containing the message file at `path`.
pub fn root_of(path: &Path) -> Option<&Path> {
    path.parent()?.parent()
}

/// Return the flag suffix (`:2,` and everything after it) of a message file
/// name, if it has one.
pub fn flag_part(file_name: &str) -> Option<&str> {
    file_name.find(FLAG_SEPARATOR).map(|ix| &file_name[ix..])
}

/// The name a message staged as `unique` should get once visible, given the
/// file name it had before.
pub fn visible_name(unique: &str, previous_name: &str) -> String {
    match flag_part(previous_name) {
        Some(flags) => format!("{}{}", unique, flags),
        None => unique.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subdir_classification() {
        assert_eq!(Some(Subdir::Cur), Subdir::of(Path::new("/m/cur/1:2,S")));
        assert_eq!(Some(Subdir::New), Subdir::of(Path::new("/m/new/1")));
        assert_eq!(Some(Subdir::New), Subdir::of(Path::new("new/1")));
        assert_eq!(None, Subdir::of(Path::new("/m/tmp/1")));
        assert_eq!(None, Subdir::of(Path::new("1")));
    }

    #[test]
    fn flag_parts() {
        assert_eq!(Some(":2,S"), flag_part("1:2,S"));
        assert_eq!(Some(":2,"), flag_part("1.M2P3.host:2,"));
        assert_eq!(Some(":2,FRS"), flag_part("1.M2P3.ho\\072st:2,FRS"));
        assert_eq!(None, flag_part("1.M2P3.host"));
        assert_eq!(None, flag_part("1:1,S"));

        assert_eq!("u:2,S", visible_name("u", "1:2,S"));
        assert_eq!("u", visible_name("u", "1"));
    }

    #[test]
    fn maildir_paths() {
        let base = Path::new("/home/me/Maildir");
        assert_eq!(base, maildir_path(base, ""));
        assert_eq!(base.join(".Lists"), maildir_path(base, ".Lists"));
        assert_eq!(
            Some(Path::new("/home/me/Maildir/.Lists")),
            root_of(Path::new("/home/me/Maildir/.Lists/cur/1:2,S"))
        );
    }
}

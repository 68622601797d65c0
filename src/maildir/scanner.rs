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

//! Change detection over the configured maildirs.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use std::vec;

use chrono::prelude::*;
use log::{debug, error, info};

use super::{maildir_path, Subdir, SUBDIRS};
use crate::mail::Mail;
use crate::support::error::Error;

/// The last committed modification time of every scanned directory.
///
/// Directory modification times only have a resolution of one second. If a
/// directory is listed during the same second it was modified, a delivery
/// later in that second would not change the mtime again, so committing it
/// would lose that delivery. An mtime is therefore only committed once it is
/// strictly in the past.
#[derive(Debug, Default)]
pub struct ScanState {
    committed: HashMap<PathBuf, i64>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `dir`, currently with modification time `mtime`, needs to be
    /// listed.
    pub fn is_changed(&self, dir: &Path, mtime: i64) -> bool {
        self.committed.get(dir) != Some(&mtime)
    }

    /// Record that `dir` was listed while it had modification time `mtime`,
    /// `now` being the current time in whole seconds.
    ///
    /// Returns whether the mtime was committed.
    pub fn commit(&mut self, dir: &Path, mtime: i64, now: i64) -> bool {
        if mtime < now {
            self.committed.insert(dir.to_owned(), mtime);
            true
        } else {
            false
        }
    }

    pub fn committed(&self, dir: &Path) -> Option<i64> {
        self.committed.get(dir).copied()
    }
}

/// Watches the configuration file for modifications.
#[derive(Debug)]
pub struct RcWatch {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
    reload_pending: bool,
}

impl RcWatch {
    pub fn new(path: PathBuf) -> Self {
        let last_mtime = modified(&path).ok();
        RcWatch {
            path,
            last_mtime,
            reload_pending: false,
        }
    }

    /// Check whether the file has changed since this watch was created.
    ///
    /// Once a change has been seen, this keeps returning true.
    pub fn check(&mut self) -> bool {
        if self.reload_pending {
            return true;
        }

        match modified(&self.path) {
            Ok(mtime) if Some(mtime) != self.last_mtime => {
                info!("{} changed, reloading", self.path.display());
                self.last_mtime = Some(mtime);
                self.reload_pending = true;
            }
            Ok(_) => (),
            // Editors commonly replace the file by renaming a new one over
            // it, so it may briefly not exist.
            Err(e) => debug!("Unable to stat {}: {}", self.path.display(), e),
        }

        self.reload_pending
    }

    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path).and_then(|md| md.modified())
}

/// Walks the `cur` and `new` directories of every configured maildir,
/// producing a `Mail` for every entry of each directory that changed since it
/// was last looked at.
#[derive(Debug)]
pub struct Scanner {
    base: PathBuf,
    maildirs: Vec<String>,
    state: ScanState,
    rc: Option<RcWatch>,
}

impl Scanner {
    pub fn new(base: PathBuf, maildirs: Vec<String>) -> Result<Self, Error> {
        if maildirs.is_empty() {
            return Err(Error::NoMaildirs);
        }

        Ok(Scanner {
            base,
            maildirs,
            state: ScanState::new(),
            rc: None,
        })
    }

    /// Stop scanning whenever `path` is modified.
    pub fn watch_rc(&mut self, path: PathBuf) {
        self.rc = Some(RcWatch::new(path));
    }

    pub fn reload_pending(&self) -> bool {
        self.rc.as_ref().map_or(false, RcWatch::reload_pending)
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Begin one pass over all maildirs.
    ///
    /// Maildirs are visited in configured order, `cur` before `new`, and
    /// entries in directory order. Directories are only listed when reached,
    /// so actions taken on earlier messages are seen by later listings.
    ///
    /// If the configuration file is being watched and changes, the pass ends
    /// early, before the next maildir, and `reload_pending()` becomes true.
    pub fn cycle(&mut self) -> Cycle<'_> {
        Cycle {
            scanner: self,
            position: 0,
            maildir: String::new(),
            pending: Vec::new().into_iter(),
            done: false,
        }
    }

    fn rc_changed(&mut self) -> bool {
        self.rc.as_mut().map_or(false, RcWatch::check)
    }

    fn list_changed(&mut self, maildir_ix: usize, subdir: Subdir) -> Vec<PathBuf> {
        let dir = maildir_path(&self.base, &self.maildirs[maildir_ix])
            .join(subdir.as_str());

        let mtime = match fs::metadata(&dir) {
            Ok(md) => md.mtime(),
            Err(e) => {
                error!("Unable to stat {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        if !self.state.is_changed(&dir, mtime) {
            return Vec::new();
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Unable to list {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    // Dot files are never messages
                    if !entry.file_name().to_string_lossy().starts_with('.') {
                        paths.push(entry.path());
                    }
                }
                Err(e) => error!("Error listing {}: {}", dir.display(), e),
            }
        }

        if !self.state.commit(&dir, mtime, Utc::now().timestamp()) {
            debug!(
                "{} was modified within the current second; \
                 it will be listed again",
                dir.display()
            );
        }

        paths
    }
}

/// One pass of a `Scanner`.
pub struct Cycle<'a> {
    scanner: &'a mut Scanner,
    /// Index into maildirs × `SUBDIRS` of the next directory to list.
    position: usize,
    maildir: String,
    pending: vec::IntoIter<PathBuf>,
    done: bool,
}

impl Iterator for Cycle<'_> {
    type Item = Mail;

    fn next(&mut self) -> Option<Mail> {
        loop {
            if let Some(path) = self.pending.next() {
                return Some(Mail::new(self.maildir.clone(), path));
            }

            if self.done {
                return None;
            }

            let maildir_ix = self.position / SUBDIRS.len();
            let subdir_ix = self.position % SUBDIRS.len();
            if maildir_ix >= self.scanner.maildirs.len()
                || (0 == subdir_ix && self.scanner.rc_changed())
            {
                self.done = true;
                return None;
            }

            self.position += 1;
            self.maildir = self.scanner.maildirs[maildir_ix].clone();
            self.pending = self
                .scanner
                .list_changed(maildir_ix, SUBDIRS[subdir_ix])
                .into_iter();
        }
    }
}

#[cfg(test)]
mod test {
    use nix::sys::stat::utimes;
    use nix::sys::time::{TimeVal, TimeValLike};
    use tempfile::TempDir;

    use super::*;

    fn make_maildir(base: &Path, name: &str) {
        for sub in &["cur", "new", "tmp"] {
            fs::create_dir_all(maildir_path(base, name).join(sub)).unwrap();
        }
    }

    fn set_mtime(path: &Path, secs: i64) {
        utimes(path, &TimeVal::seconds(secs), &TimeVal::seconds(secs))
            .unwrap();
    }

    fn names(mails: Vec<Mail>) -> Vec<(String, String)> {
        mails
            .iter()
            .map(|m| {
                (
                    m.maildir().to_owned(),
                    m.file_name().unwrap_or("").to_owned(),
                )
            })
            .collect()
    }

    fn set_up() -> (TempDir, Scanner) {
        crate::init_test_log();

        let root = TempDir::new().unwrap();
        make_maildir(root.path(), "");
        make_maildir(root.path(), ".B");
        fs::write(root.path().join("cur/1:2,S"), b"Subject: one\n\n").unwrap();
        fs::write(root.path().join("new/2"), b"Subject: two\n\n").unwrap();
        fs::write(root.path().join(".B/new/3"), b"Subject: three\n\n")
            .unwrap();
        fs::write(root.path().join(".B/new/.hidden"), b"").unwrap();

        let scanner = Scanner::new(
            root.path().to_owned(),
            vec![String::new(), ".B".to_owned()],
        )
        .unwrap();
        (root, scanner)
    }

    #[test]
    fn refuses_to_scan_nothing() {
        assert_matches!(
            Err(Error::NoMaildirs),
            Scanner::new("/nonexistent".into(), vec![])
        );
    }

    #[test]
    fn visits_in_configured_order() {
        let (_root, mut scanner) = set_up();
        assert_eq!(
            vec![
                ("".to_owned(), "1:2,S".to_owned()),
                ("".to_owned(), "2".to_owned()),
                (".B".to_owned(), "3".to_owned()),
            ],
            names(scanner.cycle().collect())
        );
    }

    #[test]
    fn mail_is_parsed_on_discovery() {
        let (_root, mut scanner) = set_up();
        let mails: Vec<Mail> = scanner.cycle().collect();
        assert!(mails[0].header("subject").contains("ONE"));
        assert!(mails[2].header("Subject").contains("three"));
    }

    #[test]
    fn unchanged_directories_are_skipped() {
        let (root, mut scanner) = set_up();
        for sub in &["cur", "new", ".B/cur", ".B/new"] {
            set_mtime(&root.path().join(sub), 1_000_000_000);
        }

        assert_eq!(3, scanner.cycle().count());
        assert_eq!(0, scanner.cycle().count());
        assert_eq!(
            Some(1_000_000_000),
            scanner.state().committed(&root.path().join(".B/new"))
        );

        set_mtime(&root.path().join(".B/new"), 1_000_000_001);
        assert_eq!(
            vec![(".B".to_owned(), "3".to_owned())],
            names(scanner.cycle().collect())
        );
        assert_eq!(0, scanner.cycle().count());
    }

    #[test]
    fn current_second_is_not_committed() {
        let (root, mut scanner) = set_up();
        let future = Utc::now().timestamp() + 3600;
        for sub in &["cur", "new", ".B/cur", ".B/new"] {
            set_mtime(&root.path().join(sub), future);
        }

        assert_eq!(3, scanner.cycle().count());
        assert_eq!(3, scanner.cycle().count());
        assert_eq!(None, scanner.state().committed(&root.path().join("new")));
    }

    #[test]
    fn same_second_guard() {
        let dir = Path::new("/m/new");
        let mut state = ScanState::new();

        assert!(state.is_changed(dir, 100));
        assert!(!state.commit(dir, 100, 100));
        assert!(state.is_changed(dir, 100));
        assert!(!state.commit(dir, 100, 100));
        assert_eq!(None, state.committed(dir));

        assert!(state.commit(dir, 100, 101));
        assert!(!state.is_changed(dir, 100));
        assert_eq!(Some(100), state.committed(dir));

        assert!(state.is_changed(dir, 101));
        assert!(!state.commit(dir, 101, 101));
        assert_eq!(Some(100), state.committed(dir));
    }

    #[test]
    fn missing_maildir_is_not_fatal() {
        let (root, _) = set_up();
        let mut scanner = Scanner::new(
            root.path().to_owned(),
            vec![".Missing".to_owned(), ".B".to_owned()],
        )
        .unwrap();
        assert_eq!(
            vec![(".B".to_owned(), "3".to_owned())],
            names(scanner.cycle().collect())
        );
    }

    #[test]
    fn rc_change_ends_cycle() {
        let (root, mut scanner) = set_up();
        let rc = root.path().join("rc.toml");
        fs::write(&rc, b"").unwrap();
        set_mtime(&rc, 1_000_000_000);
        scanner.watch_rc(rc.clone());

        let mut cycle = scanner.cycle();
        let first = cycle.next().unwrap();
        assert_eq!("1:2,S", first.file_name().unwrap());

        set_mtime(&rc, 1_000_000_100);
        let rest: Vec<Mail> = cycle.collect();
        // new/2 was still in the same maildir; .B is never reached
        assert_eq!(
            vec![("".to_owned(), "2".to_owned())],
            names(rest)
        );
        assert!(scanner.reload_pending());
        assert_eq!(0, scanner.cycle().count());
    }

    #[test]
    fn rc_unchanged_does_not_interrupt() {
        let (root, mut scanner) = set_up();
        let rc = root.path().join("rc.toml");
        fs::write(&rc, b"").unwrap();
        scanner.watch_rc(rc);

        assert_eq!(3, scanner.cycle().count());
        assert!(!scanner.reload_pending());
    }
}

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

//! The actions that can be taken on a message.
//!
//! Anything that makes a new file visible in a maildir is first written to
//! that maildir's `tmp/` under a fresh unique name, and then renamed into
//! `cur/` or `new/` in one step. Each action logs what it is about to do
//! before touching anything; in `Mode::Simulate` that log line is all that
//! happens.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::{error, info};

use super::subprocess::{Addresses, Filter, Transport};
use super::Mail;
use crate::maildir::unique_name::{NameSource, UniqueNames};
use crate::maildir::{self, Subdir};
use crate::support::error::Error;
use crate::support::file_ops::{self, ErrorTransforms};
use crate::support::safe_name::is_safe_maildir_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Perform,
    /// Log every action but never modify anything.
    Simulate,
}

/// The successful outcomes of `Executor::xfilter`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filtered {
    /// The filter's output replaced the message.
    Replaced,
    /// The filter took care of the message; it was left as it was and
    /// should not be acted on further.
    Consumed,
    /// Nothing was run.
    Simulated,
}

pub struct Executor {
    base: PathBuf,
    mode: Mode,
    names: Box<dyn NameSource>,
    transport: Transport,
}

impl Executor {
    pub fn new(base: PathBuf, mode: Mode, transport: Transport) -> Self {
        Executor {
            base,
            mode,
            names: Box::new(UniqueNames::new()),
            transport,
        }
    }

    /// Use `names` instead of the usual unique name generator.
    pub fn with_names(mut self, names: Box<dyn NameSource>) -> Self {
        self.names = names;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Log the intent to do `what` to `mail`, and return whether it should
    /// actually be done.
    fn announce(&self, mail: &Mail, what: fmt::Arguments<'_>) -> bool {
        match self.mode {
            Mode::Perform => {
                info!("{}: {}", mail, what);
                true
            }
            Mode::Simulate => {
                info!("{}: {} (dry run)", mail, what);
                false
            }
        }
    }

    /// Put a copy of `mail` into the maildir `target`, in the same
    /// subdirectory and with the same flags.
    pub fn copy(&mut self, mail: &Mail, target: &str) -> Result<(), Error> {
        if !self.announce(mail, format_args!("copy to {:?}", target)) {
            return Ok(());
        }

        let result = self.copy_impl(mail, target);
        report(mail, "copy", result)
    }

    fn copy_impl(&mut self, mail: &Mail, target: &str) -> Result<(), Error> {
        check_target(target)?;
        let (subdir, name) = source_parts(mail)?;

        let data = fs::read(mail.path()).on_not_found(Error::Vanished)?;
        let root = maildir::maildir_path(&self.base, target);
        let unique = self.names.next_name();
        let dest = root
            .join(subdir.as_str())
            .join(maildir::visible_name(&unique, name));
        file_ops::spit(root.join("tmp"), &unique, &dest, &data)?;

        info!("{}: copied to {}", mail, dest.display());
        Ok(())
    }

    /// Move `mail` into the maildir `target`, in the same subdirectory and
    /// with the same flags.
    ///
    /// On success, `mail` refers to the new location.
    pub fn move_to(
        &mut self,
        mail: &mut Mail,
        target: &str,
    ) -> Result<(), Error> {
        if !self.announce(mail, format_args!("move to {:?}", target)) {
            return Ok(());
        }

        let result = self.move_impl(mail, target);
        report(mail, "move", result)
    }

    fn move_impl(&mut self, mail: &mut Mail, target: &str) -> Result<(), Error> {
        check_target(target)?;
        let (subdir, name) = source_parts(mail)?;

        let dest_dir =
            maildir::maildir_path(&self.base, target).join(subdir.as_str());
        // A missing target must not look like the source vanishing
        fs::metadata(&dest_dir)?;

        let dest =
            dest_dir.join(maildir::visible_name(&self.names.next_name(), name));
        if fs::symlink_metadata(&dest).is_ok() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", dest.display()),
            )));
        }

        fs::rename(mail.path(), &dest).on_not_found(Error::Vanished)?;
        mail.relocate(target.to_owned(), dest);
        Ok(())
    }

    /// Delete `mail`.
    ///
    /// A message that is already gone is not an error.
    pub fn delete(&mut self, mail: &Mail) -> Result<(), Error> {
        if !self.announce(mail, format_args!("delete")) {
            return Ok(());
        }

        report(mail, "delete", remove(mail))
    }

    /// Send `mail` to `addresses` and then delete it.
    ///
    /// The message is only deleted if the mail transfer command succeeded.
    pub fn forward(
        &mut self,
        mail: &Mail,
        addresses: impl Into<Addresses>,
        sender: Option<&str>,
    ) -> Result<(), Error> {
        let addresses = addresses.into();
        if !self.announce(mail, format_args!("forward to {}", addresses)) {
            return Ok(());
        }

        let result = self
            .transport
            .send(mail.path(), &addresses, sender)
            .and_then(|()| remove(mail));
        report(mail, "forward", result)
    }

    /// Send a copy of `mail` to `addresses`, leaving the message in place.
    pub fn forward_copy(
        &mut self,
        mail: &Mail,
        addresses: impl Into<Addresses>,
        sender: Option<&str>,
    ) -> Result<(), Error> {
        let addresses = addresses.into();
        if !self
            .announce(mail, format_args!("forward copy to {}", addresses))
        {
            return Ok(());
        }

        let result = self.transport.send(mail.path(), &addresses, sender);
        report(mail, "forward copy", result)
    }

    /// Run `mail` through `filter`.
    ///
    /// The output is collected in the maildir's `tmp/`. If the filter exits
    /// successfully, the output replaces the message (unless the filter
    /// consumes it) and the headers are read again. Otherwise the output is
    /// discarded and the message is left alone.
    pub fn xfilter(
        &mut self,
        mail: &mut Mail,
        filter: &Filter,
    ) -> Result<Filtered, Error> {
        if !self.announce(mail, format_args!("filter through {}", filter)) {
            return Ok(Filtered::Simulated);
        }

        let result = self.xfilter_impl(mail, filter);
        report(mail, "filter", result)
    }

    fn xfilter_impl(
        &mut self,
        mail: &mut Mail,
        filter: &Filter,
    ) -> Result<Filtered, Error> {
        source_parts(mail)?;
        let tmp = maildir::root_of(mail.path())
            .ok_or_else(|| Error::NotInMaildir(mail.path().to_owned()))?
            .join("tmp");

        let input = fs::File::open(mail.path()).on_not_found(Error::Vanished)?;
        let staged = file_ops::stage(&tmp, &self.names.next_name())?;
        let status = filter.run(input, staged.as_file().try_clone()?)?;

        let code = status.code();
        match code {
            Some(code) => info!("{}: filter exited with status {}", mail, code),
            None => info!("{}: filter was killed by a signal", mail),
        }

        match code {
            Some(0) if filter.consumes() => Ok(Filtered::Consumed),
            Some(0) => {
                staged.as_file().sync_all()?;
                // Renaming over a path that vanished in the meantime would
                // bring the message back
                fs::metadata(mail.path()).on_not_found(Error::Vanished)?;
                staged.persist(mail.path()).map_err(|e| e.error)?;
                mail.reload_headers();
                Ok(Filtered::Replaced)
            }
            Some(code) => Err(Error::FilterFailed(code)),
            None => Err(Error::FilterKilled),
        }
    }
}

fn check_target(target: &str) -> Result<(), Error> {
    if is_safe_maildir_name(target) {
        Ok(())
    } else {
        Err(Error::UnsafeMaildirName(target.to_owned()))
    }
}

fn source_parts(mail: &Mail) -> Result<(Subdir, &str), Error> {
    match (mail.subdir(), mail.file_name()) {
        (Some(subdir), Some(name)) => Ok((subdir, name)),
        _ => Err(Error::NotInMaildir(mail.path().to_owned())),
    }
}

fn remove(mail: &Mail) -> Result<(), Error> {
    match fs::remove_file(mail.path()) {
        Ok(()) => Ok(()),
        Err(e) if io::ErrorKind::NotFound == e.kind() => {
            error!("{}: already gone", mail);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn report<T>(
    mail: &Mail,
    action: &str,
    result: Result<T, Error>,
) -> Result<T, Error> {
    if let Err(ref e) = result {
        error!("{}: {} failed: {}", mail, action, e);
    }
    result
}

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

//! The boundary between the engine and whatever decides what to do with each
//! message.

use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::mail::actions::{Executor, Filtered};
use crate::mail::subprocess::{Addresses, Filter};
use crate::mail::{HeaderView, Mail, Target};
use crate::maildir::scanner::Scanner;
use crate::support::error::Error;

pub mod rules;

/// The longest the engine sleeps without checking for interruption.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Decides the fate of each message.
pub trait Sorter {
    fn sort(&mut self, message: &mut Message<'_>);
}

impl<F: FnMut(&mut Message<'_>)> Sorter for F {
    fn sort(&mut self, message: &mut Message<'_>) {
        self(message)
    }
}

/// A message handed to a `Sorter`, on which actions can be invoked.
pub struct Message<'a> {
    mail: &'a mut Mail,
    executor: &'a mut Executor,
}

impl<'a> Message<'a> {
    pub fn new(mail: &'a mut Mail, executor: &'a mut Executor) -> Self {
        Message { mail, executor }
    }

    pub fn mail(&self) -> &Mail {
        &*self.mail
    }

    pub fn header(&self, name: &str) -> HeaderView<'_> {
        self.mail.header(name)
    }

    pub fn target(&self) -> Target<'_> {
        self.mail.target()
    }

    pub fn from_mailing_list(&self, name: &str) -> bool {
        self.mail.from_mailing_list(name)
    }

    pub fn copy(&mut self, target: &str) -> Result<(), Error> {
        self.executor.copy(self.mail, target)
    }

    pub fn move_to(&mut self, target: &str) -> Result<(), Error> {
        self.executor.move_to(self.mail, target)
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        self.executor.delete(self.mail)
    }

    pub fn forward(
        &mut self,
        addresses: impl Into<Addresses>,
        sender: Option<&str>,
    ) -> Result<(), Error> {
        self.executor.forward(self.mail, addresses, sender)
    }

    pub fn forward_copy(
        &mut self,
        addresses: impl Into<Addresses>,
        sender: Option<&str>,
    ) -> Result<(), Error> {
        self.executor.forward_copy(self.mail, addresses, sender)
    }

    pub fn xfilter(&mut self, filter: &Filter) -> Result<Filtered, Error> {
        self.executor.xfilter(self.mail, filter)
    }
}

/// Why `Engine::run` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A single pass was requested and has completed.
    Finished,
    /// The configuration file changed.
    Reload,
    /// The interrupt flag was raised.
    Interrupted,
}

/// Repeatedly scans the maildirs and feeds every message found to a
/// `Sorter`.
pub struct Engine {
    scanner: Scanner,
    executor: Executor,
    once: bool,
    interval: Duration,
    interrupt: Option<&'static AtomicBool>,
}

impl Engine {
    pub fn new(scanner: Scanner, executor: Executor) -> Self {
        Engine {
            scanner,
            executor,
            once: false,
            interval: Duration::from_secs(1),
            interrupt: None,
        }
    }

    /// Stop after one pass instead of polling forever.
    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Time to sleep between passes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Return `Outcome::Interrupted` as soon as possible after `flag`
    /// becomes true. A message being sorted is always finished first.
    pub fn interrupt_on(mut self, flag: &'static AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn run(&mut self, sorter: &mut dyn Sorter) -> Outcome {
        let interrupt = self.interrupt;

        loop {
            let mut seen = 0usize;
            for mut mail in self.scanner.cycle() {
                if raised(interrupt) {
                    return Outcome::Interrupted;
                }

                seen += 1;
                sorter.sort(&mut Message::new(&mut mail, &mut self.executor));
            }
            debug!("Scan complete, {} message(s) examined", seen);

            if self.scanner.reload_pending() {
                info!("Configuration changed; stopping for reload");
                return Outcome::Reload;
            }

            if self.once {
                return Outcome::Finished;
            }

            if !self.sleep() {
                return Outcome::Interrupted;
            }
        }
    }

    /// Sleep for the configured interval in short slices. Returns false if
    /// interrupted.
    fn sleep(&self) -> bool {
        let deadline = Instant::now() + self.interval;
        loop {
            if raised(self.interrupt) {
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }

            thread::sleep(cmp::min(deadline - now, SLEEP_SLICE));
        }
    }
}

fn raised(flag: Option<&AtomicBool>) -> bool {
    flag.map_or(false, |flag| flag.load(Ordering::SeqCst))
}

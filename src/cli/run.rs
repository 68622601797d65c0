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

//! The top-level load, sort, reload cycle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::info;
use nix::sys::signal::{
    sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal,
};

use crate::mail::actions::{Executor, Mode};
use crate::mail::subprocess::Transport;
use crate::maildir::scanner::Scanner;
use crate::sort::rules::RuleSet;
use crate::sort::{Engine, Outcome};
use crate::support::config::Config;
use crate::support::error::Error;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: nix::libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Command-line settings which take precedence over the configuration file.
#[derive(Clone, Copy, Debug, Default)]
pub struct Overrides {
    pub once: bool,
    pub dry_run: bool,
    pub no_reload: bool,
}

/// Arrange for SIGINT and SIGTERM to stop the engine at the next message
/// boundary.
pub fn install_signal_handlers() {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for &signal in &[Signal::SIGINT, Signal::SIGTERM] {
        if let Err(e) = unsafe { sigaction(signal, &action) } {
            fatal!(EX_OSERR, "Failed to install {:?} handler: {}", signal, e);
        }
    }
}

/// Load the configuration at `path` and sort mail until done, interrupted,
/// or a fatal error occurs, reloading the configuration whenever it changes.
pub fn run(path: PathBuf, overrides: Overrides) {
    loop {
        let config = match Config::load(&path) {
            Ok(config) => config,
            Err(e) => fatal!(EX_CONFIG, "{}: {}", path.display(), e),
        };
        let (mut engine, mut rules) = match prepare(&path, config, overrides)
        {
            Ok(prepared) => prepared,
            Err(e) => fatal!(EX_CONFIG, "{}: {}", path.display(), e),
        };

        info!("Loaded {} rule(s) from {}", rules.len(), path.display());
        match engine.run(&mut rules) {
            Outcome::Finished => return,
            Outcome::Interrupted => {
                info!("Interrupted, exiting");
                return;
            }
            Outcome::Reload => info!("Reloading {}", path.display()),
        }
    }
}

/// Build the engine and rules described by `config`, which was loaded from
/// `path`.
pub fn prepare(
    path: &Path,
    config: Config,
    overrides: Overrides,
) -> Result<(Engine, RuleSet), Error> {
    let rules = RuleSet::compile(config.rules)?;

    let mut scanner = Scanner::new(config.base.clone(), config.maildirs)?;
    if config.auto_reload && !overrides.no_reload {
        scanner.watch_rc(path.to_owned());
    }

    let mode = if config.dry_run || overrides.dry_run {
        info!("Dry run; nothing will be changed");
        Mode::Simulate
    } else {
        Mode::Perform
    };
    let executor = Executor::new(
        config.base,
        mode,
        Transport::new(config.sendmail, config.sendmail_flags),
    );

    let engine = Engine::new(scanner, executor)
        .once(overrides.once)
        .interval(Duration::from_secs(config.poll_interval))
        .interrupt_on(&INTERRUPTED);
    Ok((engine, rules))
}

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

use std::path::PathBuf;

use log::LevelFilter;
use structopt::StructOpt;

use super::run::{self, Overrides};
use crate::support::logging;
use crate::support::sysexits::*;

/// Sort mail that has already been delivered to maildirs.
///
/// The maildirs named in the configuration file are polled for new and
/// changed messages, and every message found is run through the rules in
/// that file. The configuration is re-read automatically whenever it is
/// modified.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The configuration file [default: ~/.mailsort.toml]
    #[structopt(long, short, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Make a single pass over the maildirs, then exit.
    #[structopt(long)]
    once: bool,

    /// Only log what would be done; don't change anything.
    #[structopt(long, short = "n")]
    dry_run: bool,

    /// Don't reload the configuration file when it changes.
    #[structopt(long)]
    no_reload: bool,

    /// Configure logging from this log4rs configuration file.
    #[structopt(long, parse(from_os_str), conflicts_with = "syslog")]
    log_config: Option<PathBuf>,

    /// Log to syslog (facility "mail") instead of standard error.
    #[structopt(long)]
    syslog: bool,

    /// Also log debugging information.
    #[structopt(long, short)]
    verbose: bool,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options = Options::from_clap(&match Options::clap().get_matches_safe()
    {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let level = if options.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let logging = if let Some(ref path) = options.log_config {
        logging::init_file(path)
    } else if options.syslog {
        logging::init_syslog(level)
    } else {
        logging::init_stderr(level)
    };
    if let Err(e) = logging {
        fatal!(EX_CONFIG, "Failed to initialise logging: {}", e);
    }

    let config_path = options.config.clone().unwrap_or_else(|| {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".mailsort.toml"),
            None => fatal!(
                EX_CONFIG,
                "$HOME is not set; use --config to name the configuration file"
            ),
        }
    });

    run::install_signal_handlers();
    run::run(
        config_path,
        Overrides {
            once: options.once,
            dry_run: options.dry_run,
            no_reload: options.no_reload,
        },
    );
}

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

//! Logger setup and helpers for putting untrusted text into log records.

use std::fmt::Write as _;
use std::path::Path;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Longest piece of message-derived text put into a single log record.
const MAX_ESCAPED: usize = 256;

/// Initialise logging to standard error with a simple line format.
pub fn init_stderr(level: LevelFilter) -> Result<(), String> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l} {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| e.to_string())?;

    log4rs::init_config(config)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Initialise logging from a log4rs configuration file.
///
/// This is how logging to files (optionally rotated) is configured.
pub fn init_file(path: &Path) -> Result<(), String> {
    log4rs::init_file(path, log4rs::config::Deserializers::new())
        .map_err(|e| e.to_string())
}

/// Initialise logging to the local syslog daemon under the mail facility.
pub fn init_syslog(level: LevelFilter) -> Result<(), String> {
    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_MAIL,
        hostname: None,
        process: env!("CARGO_PKG_NAME").to_owned(),
        pid: nix::unistd::getpid().as_raw() as u32,
    };

    let logger = syslog::unix(formatter).map_err(|e| e.to_string())?;
    log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
        .map(|_| log::set_max_level(level))
        .map_err(|e| e.to_string())
}

/// Make `s` safe to embed in a single log record.
///
/// Control characters (line breaks in particular, which would otherwise let
/// a crafted header forge extra log lines) are rendered as escapes, and
/// overly long text is truncated.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_ESCAPED + 3));
    for (ix, ch) in s.chars().enumerate() {
        if ix >= MAX_ESCAPED {
            out.push_str("...");
            break;
        }

        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            ch if ch.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", ch as u32);
            }
            ch => out.push(ch),
        }
    }

    out
}

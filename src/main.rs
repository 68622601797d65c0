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


#![allow(dead_code)]

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

/// Log an error, repeat it on standard error, and exit with the given
/// `sysexits` code.
macro_rules! fatal {
    ($ex:ident, $($stuff:tt)*) => {{
        let message = format!($($stuff)*);
        log::error!("{}", message);
        eprintln!("{}: {}", env!("CARGO_PKG_NAME"), message);
        crate::support::sysexits::$ex.exit()
    }}
}

mod cli;
mod mail;
mod maildir;
mod mime;
mod sort;
mod support;

#[cfg(test)]
mod test_data;

fn main() {
    cli::main::main()
}

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        support::logging::init_stderr(log::LevelFilter::Debug).unwrap();
    })
}

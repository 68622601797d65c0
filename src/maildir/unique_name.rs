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

//! Generation of unique maildir file names.

use chrono::prelude::*;
use rand::{rngs::OsRng, Rng};

/// Something that produces names for new files in a maildir's `tmp/`.
pub trait NameSource {
    fn next_name(&mut self) -> String;
}

/// Generates names of the form
/// `<seconds>.<fraction>.M<microseconds>P<pid>Q<counter>R<random>.<host>`.
///
/// The delivery counter starts at 0 and is owned by this value rather than
/// the process, so independent generators can coexist; the random component
/// keeps them from colliding.
#[derive(Debug)]
pub struct UniqueNames {
    pid: u32,
    host: String,
    counter: u64,
}

impl UniqueNames {
    pub fn new() -> Self {
        let mut buf = [0u8; 256];
        let host = nix::unistd::gethostname(&mut buf)
            .ok()
            .and_then(|h| h.to_str().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or("localhost")
            .to_owned();
        Self::with_host(&host)
    }

    pub fn with_host(host: &str) -> Self {
        UniqueNames {
            pid: std::process::id(),
            host: sanitise_host(host),
            counter: 0,
        }
    }

    pub fn generate(&mut self) -> String {
        let now = Utc::now();
        let micros = now.timestamp_subsec_micros();
        let name = format!(
            "{}.{:06}.M{}P{}Q{}R{:08x}.{}",
            now.timestamp(),
            micros,
            micros,
            self.pid,
            self.counter,
            OsRng.gen::<u32>(),
            self.host,
        );
        self.counter += 1;
        name
    }
}

impl Default for UniqueNames {
    fn default() -> Self {
        Self::new()
    }
}

impl NameSource for UniqueNames {
    fn next_name(&mut self) -> String {
        self.generate()
    }
}

/// Escape the characters that may not appear in the host part of a maildir
/// file name.
///
/// `/` would be a path separator and `:` would start the flag suffix.
fn sanitise_host(host: &str) -> String {
    host.replace('/', "\\057").replace(':', "\\072")
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use lazy_static::lazy_static;
    use proptest::prelude::*;
    use regex::Regex;

    use super::*;

    lazy_static! {
        static ref NAME_FORMAT: Regex = Regex::new(
            r"^[0-9]+\.[0-9]{6}\.M[0-9]{1,6}P[0-9]+Q([0-9]+)R[0-9a-f]{8}\.([^/:]+)$"
        )
        .unwrap();
    }

    #[test]
    fn names_are_well_formed() {
        let mut names = UniqueNames::with_host("mail.example.com");
        let name = names.generate();
        let captures = NAME_FORMAT.captures(&name).unwrap();
        assert_eq!("0", &captures[1]);
        assert_eq!("mail.example.com", &captures[2]);

        let name = names.next_name();
        let captures = NAME_FORMAT.captures(&name).unwrap();
        assert_eq!("1", &captures[1]);
    }

    #[test]
    fn seconds_carry_their_fraction() {
        let name = UniqueNames::with_host("h").generate();
        let mut parts = name.splitn(3, '.');
        let secs = parts.next().unwrap();
        let fraction = parts.next().unwrap();
        assert!(secs.parse::<i64>().is_ok(), "{}", name);
        assert_eq!(6, fraction.len(), "{}", name);
        assert!(fraction.parse::<u32>().unwrap() < 1_000_000);

        let micros = parts.next().unwrap();
        let micros = &micros[1..micros.find('P').unwrap()];
        assert_eq!(fraction.parse::<u32>(), micros.parse::<u32>());
    }

    #[test]
    fn host_is_sanitised() {
        let mut names = UniqueNames::with_host("we/ird:host");
        let name = names.generate();
        assert!(name.ends_with(".we\\057ird\\072host"), "{}", name);
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
    }

    #[test]
    fn system_host_name_is_usable() {
        let name = UniqueNames::new().generate();
        assert!(NAME_FORMAT.is_match(&name), "{}", name);
    }

    #[test]
    fn names_never_repeat() {
        let mut names = UniqueNames::with_host("h");
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(names.generate()));
        }
    }

    #[test]
    fn independent_generators_do_not_collide() {
        let mut a = UniqueNames::with_host("h");
        let mut b = UniqueNames::with_host("h");
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(a.generate()));
            assert!(seen.insert(b.generate()));
        }
    }

    proptest! {
        #[test]
        fn sanitised_host_has_no_separators(host in ".*") {
            let s = sanitise_host(&host);
            prop_assert!(!s.contains('/'));
            prop_assert!(!s.contains(':'));
        }
    }
}

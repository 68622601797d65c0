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

//! External commands that messages are fed through.
//!
//! Every command gets the message file itself as standard input, so nothing
//! is buffered in memory, and runs to completion before the next message is
//! looked at.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::support::error::Error;
use crate::support::file_ops::ErrorTransforms;
use crate::support::logging::escape;

/// A list of addresses to forward to.
///
/// Built from either a single address or a collection of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Addresses(pub Vec<String>);

impl Addresses {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Addresses {
    fn from(address: &str) -> Self {
        Addresses(vec![address.to_owned()])
    }
}

impl From<String> for Addresses {
    fn from(address: String) -> Self {
        Addresses(vec![address])
    }
}

impl From<Vec<String>> for Addresses {
    fn from(addresses: Vec<String>) -> Self {
        Addresses(addresses)
    }
}

impl From<&[&str]> for Addresses {
    fn from(addresses: &[&str]) -> Self {
        Addresses(addresses.iter().map(|&a| a.to_owned()).collect())
    }
}

impl fmt::Display for Addresses {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, address) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", escape(address))?;
        }
        Ok(())
    }
}

/// A sendmail-compatible mail transfer command.
#[derive(Clone, Debug)]
pub struct Transport {
    command: PathBuf,
    flags: Vec<String>,
}

impl Transport {
    pub fn new(command: PathBuf, flags: Vec<String>) -> Self {
        Transport { command, flags }
    }

    /// Send the message at `message` to `addresses`.
    ///
    /// The command is run as
    /// `<command> -i <flags> [-f <sender>] -- <address>...`.
    pub fn send(
        &self,
        message: &Path,
        addresses: &Addresses,
        sender: Option<&str>,
    ) -> Result<(), Error> {
        if addresses.is_empty() {
            return Err(Error::NoAddresses);
        }

        let input = fs::File::open(message).on_not_found(Error::Vanished)?;

        let mut cmd = Command::new(&self.command);
        cmd.arg("-i").args(&self.flags);
        if let Some(sender) = sender {
            cmd.arg("-f").arg(sender);
        }
        cmd.arg("--").args(&addresses.0);

        let status = cmd
            .stdin(Stdio::from(input))
            .stdout(Stdio::null())
            .status()?;
        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(Error::TransportFailed(code)),
            None => Err(Error::TransportKilled),
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Transport::new("/usr/sbin/sendmail".into(), vec![])
    }
}

/// A command a message can be piped through, its output replacing the
/// original message.
#[derive(Clone, Debug)]
pub struct Filter {
    command: Vec<String>,
    shell: bool,
    stderr: Option<PathBuf>,
    consume: bool,
}

impl Filter {
    pub fn new(command: Vec<String>) -> Self {
        Filter {
            command,
            shell: false,
            stderr: None,
            consume: false,
        }
    }

    /// Run the command through `/bin/sh -c`, with all elements of the
    /// command joined by spaces.
    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Append the command's standard error to this file instead of
    /// inheriting it.
    pub fn stderr_to(mut self, path: Option<PathBuf>) -> Self {
        self.stderr = path;
        self
    }

    /// If set, a successful run means the command took care of the message;
    /// its output is discarded and the original is left as it is.
    pub fn consume(mut self, consume: bool) -> Self {
        self.consume = consume;
        self
    }

    pub fn consumes(&self) -> bool {
        self.consume
    }

    /// Run the command with `input` as standard input and `output` as
    /// standard output, waiting for it to exit.
    pub fn run(
        &self,
        input: fs::File,
        output: fs::File,
    ) -> Result<ExitStatus, Error> {
        let (program, args) =
            self.command.split_first().ok_or(Error::EmptyCommand)?;

        let mut cmd = if self.shell {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(self.command.join(" "));
            cmd
        } else {
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        };

        let stderr = match self.stderr {
            Some(ref path) => Stdio::from(
                fs::OpenOptions::new().create(true).append(true).open(path)?,
            ),
            None => Stdio::inherit(),
        };

        Ok(cmd
            .stdin(Stdio::from(input))
            .stdout(Stdio::from(output))
            .stderr(stderr)
            .status()?)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", escape(&self.command.join(" ")))?;
        if self.shell {
            write!(f, " (shell)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use tempfile::TempDir;

    use super::*;

    fn run(filter: &Filter, input: &[u8]) -> (Result<ExitStatus, Error>, Vec<u8>) {
        let dir = TempDir::new().unwrap();
        let input_path = dir.path().join("in");
        fs::write(&input_path, input).unwrap();
        let output_path = dir.path().join("out");

        let status = filter.run(
            fs::File::open(&input_path).unwrap(),
            fs::File::create(&output_path).unwrap(),
        );
        let mut output = Vec::new();
        fs::File::open(&output_path)
            .unwrap()
            .read_to_end(&mut output)
            .unwrap();
        (status, output)
    }

    #[test]
    fn filter_direct() {
        let filter = Filter::new(vec![
            "tr".to_owned(),
            "a-z".to_owned(),
            "A-Z".to_owned(),
        ]);
        let (status, output) = run(&filter, b"hello\n");
        assert!(status.unwrap().success());
        assert_eq!(b"HELLO\n", &output[..]);
    }

    #[test]
    fn filter_shell() {
        let filter = Filter::new(vec![
            "tr a-z A-Z".to_owned(),
            "| sed s/L/_/g".to_owned(),
        ])
        .shell(true);
        let (status, output) = run(&filter, b"hello\n");
        assert!(status.unwrap().success());
        assert_eq!(b"HE__O\n", &output[..]);
    }

    #[test]
    fn filter_exit_code() {
        let (status, _) = run(&Filter::new(vec!["false".to_owned()]), b"x");
        assert_eq!(Some(1), status.unwrap().code());
    }

    #[test]
    fn filter_stderr_redirect() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("stderr.log");
        fs::write(&log, b"earlier\n").unwrap();

        let filter = Filter::new(vec!["echo oops >&2; cat".to_owned()])
            .shell(true)
            .stderr_to(Some(log.clone()));
        let (status, output) = run(&filter, b"body\n");
        assert!(status.unwrap().success());
        assert_eq!(b"body\n", &output[..]);
        assert_eq!("earlier\noops\n", fs::read_to_string(&log).unwrap());
    }

    #[test]
    fn empty_filter_is_an_error() {
        let (status, _) = run(&Filter::new(vec![]), b"x");
        assert_matches!(Err(Error::EmptyCommand), status);
    }

    #[test]
    fn missing_program_is_an_error() {
        let (status, _) = run(
            &Filter::new(vec!["/nonexistent/mailsort-filter".to_owned()]),
            b"x",
        );
        assert_matches!(Err(Error::Io(_)), status);
    }

    #[test]
    fn address_normalisation() {
        assert_eq!(
            Addresses(vec!["a@b.com".to_owned()]),
            Addresses::from("a@b.com")
        );
        assert_eq!(
            Addresses(vec!["a@b.com".to_owned(), "c@d.com".to_owned()]),
            Addresses::from(&["a@b.com", "c@d.com"][..])
        );
        assert_eq!(
            "a@b.com, c@d.com",
            Addresses::from(vec!["a@b.com".to_owned(), "c@d.com".to_owned()])
                .to_string()
        );
    }
}

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

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::Error;
use super::safe_name::is_safe_maildir_name;

/// The sorting configuration, i.e., the "rc file".
///
/// This is a TOML file, by default `~/.mailsort.toml`. Besides telling the
/// scanner where to look, it carries the rules that decide what happens to
/// each message. The file is watched while running so that edits take effect
/// without a restart.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The directory all maildir names are relative to.
    ///
    /// A leading `~/` is replaced with the value of `$HOME`.
    pub base: PathBuf,

    /// The maildirs to scan, in the order they are scanned.
    ///
    /// The empty string refers to `base` itself.
    pub maildirs: Vec<String>,

    /// If true, actions are only logged and nothing on disk is changed.
    #[serde(default)]
    pub dry_run: bool,

    /// If true, the configuration file is re-read when it changes.
    #[serde(default = "default_true")]
    pub auto_reload: bool,

    /// Seconds to sleep between scans.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// The sendmail-compatible command used to forward mail.
    #[serde(default = "default_sendmail")]
    pub sendmail: PathBuf,

    /// Extra flags passed to `sendmail`, after `-i`.
    #[serde(default)]
    pub sendmail_flags: Vec<String>,

    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

/// One `[[rule]]` table.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Shown in the log when the rule fires.
    #[serde(default)]
    pub name: Option<String>,

    /// If non-empty, the rule only applies to mail found in these maildirs.
    #[serde(default)]
    pub maildirs: Vec<String>,

    /// Conditions which must all hold for the rule to fire.
    #[serde(default)]
    pub when: Vec<ConditionConfig>,

    /// Actions to run, in order, when the rule fires.
    pub then: Vec<ActionConfig>,

    /// If true, later rules are still considered after this one fires.
    #[serde(default, rename = "continue")]
    pub continue_: bool,
}

/// A single condition.
///
/// Exactly one of `header`, `target`, `mailing_list`, and `any` selects what
/// is tested. `header` and `target` additionally need exactly one of
/// `contains` and `matches`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub target: bool,
    #[serde(default)]
    pub mailing_list: Option<String>,
    #[serde(default)]
    pub any: bool,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub matches: Option<String>,
    /// Invert the result of the test.
    #[serde(default)]
    pub not: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "do", rename_all = "kebab-case")]
pub enum ActionConfig {
    Copy {
        to: String,
    },
    Move {
        to: String,
    },
    Delete,
    Forward {
        to: AddressList,
        #[serde(default)]
        sender: Option<String>,
    },
    ForwardCopy {
        to: AddressList,
        #[serde(default)]
        sender: Option<String>,
    },
    Filter {
        command: Vec<String>,
        #[serde(default)]
        shell: bool,
        #[serde(default)]
        stderr: Option<PathBuf>,
        #[serde(default)]
        consume: bool,
    },
}

/// Either a single address or a list of them.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AddressList {
    One(String),
    Many(Vec<String>),
}

impl AddressList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            AddressList::One(a) => vec![a],
            AddressList::Many(v) => v,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1
}

fn default_sendmail() -> PathBuf {
    "/usr/sbin/sendmail".into()
}

impl Config {
    /// Read and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut config: Config = toml::from_str(text)?;
        config.base = expand_home(&config.base);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.maildirs.is_empty() {
            return Err(Error::NoMaildirs);
        }

        for maildir in &self.maildirs {
            if !is_safe_maildir_name(maildir) {
                return Err(Error::UnsafeMaildirName(maildir.clone()));
            }
        }

        Ok(())
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_owned(),
    }
}

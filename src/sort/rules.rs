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

//! Sorting driven by the `[[rule]]` tables of the configuration file.

use log::{info, warn};

use super::{Message, Sorter};
use crate::mail::actions::Filtered;
use crate::mail::subprocess::Filter;
use crate::mail::Pattern;
use crate::support::config::{ActionConfig, ConditionConfig, RuleConfig};
use crate::support::error::Error;
use crate::support::safe_name::is_safe_maildir_name;

/// A compiled, validated list of rules.
///
/// Rules are tried in order. The first one whose conditions all hold runs its
/// actions, and unless it is marked `continue`, no further rules are tried.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

#[derive(Debug)]
struct Rule {
    name: String,
    maildirs: Vec<String>,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
    continue_: bool,
}

#[derive(Debug)]
struct Condition {
    subject: Subject,
    negate: bool,
}

#[derive(Debug)]
enum Subject {
    Header(String, Test),
    Target(Test),
    MailingList(String),
    Any,
}

#[derive(Debug)]
enum Test {
    Contains(String),
    Matches(Pattern),
}

#[derive(Debug)]
enum Action {
    Copy(String),
    Move(String),
    Delete,
    Forward {
        to: Vec<String>,
        sender: Option<String>,
        keep: bool,
    },
    Filter(Filter),
}

impl RuleSet {
    pub fn compile(rules: Vec<RuleConfig>) -> Result<Self, Error> {
        Ok(RuleSet {
            rules: rules
                .into_iter()
                .enumerate()
                .map(|(ix, rule)| Rule::compile(ix, rule))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Sorter for RuleSet {
    fn sort(&mut self, message: &mut Message<'_>) {
        for rule in &self.rules {
            if !rule.applies(message) {
                continue;
            }

            info!("{}: matched {}", message.mail(), rule.name);
            let still_here = rule.run(message);
            if !still_here || !rule.continue_ {
                return;
            }
        }
    }
}

impl Rule {
    fn compile(ix: usize, config: RuleConfig) -> Result<Self, Error> {
        let name = config
            .name
            .unwrap_or_else(|| format!("rule #{}", ix + 1));
        let invalid =
            |what: String| Error::InvalidRule(format!("{}: {}", name, what));

        for maildir in &config.maildirs {
            if !is_safe_maildir_name(maildir) {
                return Err(invalid(format!("unsafe maildir {:?}", maildir)));
            }
        }

        let conditions = config
            .when
            .into_iter()
            .map(|c| Condition::compile(c).map_err(&invalid))
            .collect::<Result<Vec<_>, _>>()?;
        let actions = config
            .then
            .into_iter()
            .map(|a| Action::compile(a).map_err(&invalid))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Rule {
            name,
            maildirs: config.maildirs,
            conditions,
            actions,
            continue_: config.continue_,
        })
    }

    fn applies(&self, message: &Message<'_>) -> bool {
        (self.maildirs.is_empty()
            || self.maildirs.iter().any(|m| m == message.mail().maildir()))
            && self.conditions.iter().all(|c| c.holds(message))
    }

    /// Run the actions in order, stopping at the first failure.
    ///
    /// Returns whether the message is still in place to be acted on.
    fn run(&self, message: &mut Message<'_>) -> bool {
        for action in &self.actions {
            let result = match *action {
                Action::Copy(ref to) => message.copy(to).map(|()| true),
                Action::Move(ref to) => message.move_to(to).map(|()| true),
                Action::Delete => message.delete().map(|()| false),
                Action::Forward {
                    ref to,
                    ref sender,
                    keep: false,
                } => message
                    .forward(to.clone(), sender.as_deref())
                    .map(|()| false),
                Action::Forward {
                    ref to,
                    ref sender,
                    keep: true,
                } => message
                    .forward_copy(to.clone(), sender.as_deref())
                    .map(|()| true),
                Action::Filter(ref filter) => message
                    .xfilter(filter)
                    .map(|outcome| Filtered::Consumed != outcome),
            };

            match result {
                Ok(true) => (),
                Ok(false) => return false,
                Err(e) => {
                    // The executor already logged the failure itself
                    warn!(
                        "{}: abandoning {} after error: {}",
                        message.mail(),
                        self.name,
                        e
                    );
                    return !e.is_race();
                }
            }
        }

        true
    }
}

impl Condition {
    fn compile(config: ConditionConfig) -> Result<Self, String> {
        let subjects = config.header.is_some() as u32
            + config.target as u32
            + config.mailing_list.is_some() as u32
            + config.any as u32;
        if 1 != subjects {
            return Err("each condition needs exactly one of header, \
                        target, mailing_list, any"
                .to_owned());
        }

        let test = match (config.contains, config.matches) {
            (Some(needle), None) => Some(Test::Contains(needle)),
            (None, Some(pattern)) => Some(Test::Matches(
                Pattern::new(&pattern)
                    .map_err(|e| format!("bad pattern {:?}: {}", pattern, e))?,
            )),
            (None, None) => None,
            (Some(_), Some(_)) => {
                return Err("contains and matches are mutually exclusive"
                    .to_owned())
            }
        };

        let subject = match (config.header, config.mailing_list, test) {
            (Some(header), None, Some(test)) => Subject::Header(header, test),
            (None, None, Some(test)) if config.target => Subject::Target(test),
            (None, Some(list), None) => Subject::MailingList(list),
            (None, None, None) if config.any => Subject::Any,
            (Some(_), _, None) | (None, None, None) => {
                return Err("header and target conditions need contains or \
                            matches"
                    .to_owned())
            }
            _ => {
                return Err("mailing_list and any conditions take no \
                            contains or matches"
                    .to_owned())
            }
        };

        Ok(Condition {
            subject,
            negate: config.not,
        })
    }

    fn holds(&self, message: &Message<'_>) -> bool {
        let result = match self.subject {
            Subject::Header(ref name, ref test) => {
                let header = message.header(name);
                match *test {
                    Test::Contains(ref needle) => header.contains(needle),
                    Test::Matches(ref pattern) => header.matches(pattern),
                }
            }
            Subject::Target(ref test) => {
                let target = message.target();
                match *test {
                    Test::Contains(ref needle) => target.contains(needle),
                    Test::Matches(ref pattern) => target.matches(pattern),
                }
            }
            Subject::MailingList(ref list) => message.from_mailing_list(list),
            Subject::Any => true,
        };

        result != self.negate
    }
}

impl Action {
    fn compile(config: ActionConfig) -> Result<Self, String> {
        let check_target = |to: String| {
            if is_safe_maildir_name(&to) {
                Ok(to)
            } else {
                Err(format!("unsafe maildir {:?}", to))
            }
        };

        Ok(match config {
            ActionConfig::Copy { to } => Action::Copy(check_target(to)?),
            ActionConfig::Move { to } => Action::Move(check_target(to)?),
            ActionConfig::Delete => Action::Delete,
            ActionConfig::Forward { to, sender } => {
                forward(to.into_vec(), sender, false)?
            }
            ActionConfig::ForwardCopy { to, sender } => {
                forward(to.into_vec(), sender, true)?
            }
            ActionConfig::Filter {
                command,
                shell,
                stderr,
                consume,
            } => {
                if command.is_empty() {
                    return Err("filter has an empty command".to_owned());
                }

                Action::Filter(
                    Filter::new(command)
                        .shell(shell)
                        .stderr_to(stderr)
                        .consume(consume),
                )
            }
        })
    }
}

fn forward(
    to: Vec<String>,
    sender: Option<String>,
    keep: bool,
) -> Result<Action, String> {
    if to.is_empty() {
        return Err("forward needs at least one address".to_owned());
    }

    Ok(Action::Forward { to, sender, keep })
}

#[cfg(test)]
mod test {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::mail::actions::{Executor, Mode};
    use crate::mail::subprocess::Transport;
    use crate::mail::Mail;
    use crate::support::config::Config;
    use crate::test_data::*;

    fn compile(rules: &str) -> Result<RuleSet, Error> {
        let config = Config::parse(&format!(
            "base = \"/nonexistent\"\nmaildirs = [\"\"]\n{}",
            rules
        ))?;
        RuleSet::compile(config.rules)
    }

    struct Setup {
        root: TempDir,
        executor: Executor,
    }

    fn set_up() -> Setup {
        crate::init_test_log();

        let root = TempDir::new().unwrap();
        for maildir in &["", ".A", ".B"] {
            for sub in &["tmp", "cur", "new"] {
                fs::create_dir_all(root.path().join(maildir).join(sub))
                    .unwrap();
            }
        }
        let executor = Executor::new(
            root.path().to_owned(),
            Mode::Perform,
            Transport::default(),
        );
        Setup { root, executor }
    }

    impl Setup {
        /// Deliver `data` into the base maildir and run `rules` on it.
        fn sort(&mut self, rules: &str, data: &[u8]) -> Mail {
            let mut rules = compile(rules).unwrap();
            let path = self.root.path().join("new/1");
            fs::write(&path, data).unwrap();
            let mut mail = Mail::new(String::new(), path);
            rules.sort(&mut Message::new(&mut mail, &mut self.executor));
            mail
        }

        fn count(&self, dir: &str) -> usize {
            fs::read_dir(self.root.path().join(dir)).unwrap().count()
        }
    }

    #[test]
    fn header_contains_moves() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
when = [ { header = "subject", contains = "LUNCH" } ]
then = [ { do = "move", to = ".A" } ]
"#,
            SIMPLE,
        );
        assert_eq!(".A", mail.maildir());
        assert_eq!(0, setup.count("new"));
        assert_eq!(1, setup.count(".A/new"));
    }

    #[test]
    fn first_match_wins() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
when = [ { any = true } ]
then = [ { do = "copy", to = ".A" } ]

[[rule]]
when = [ { any = true } ]
then = [ { do = "copy", to = ".B" } ]
"#,
            SIMPLE,
        );
        assert_eq!("", mail.maildir());
        assert_eq!(1, setup.count(".A/new"));
        assert_eq!(0, setup.count(".B/new"));
    }

    #[test]
    fn continue_tries_later_rules() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
when = [ { target = true, contains = "bob@example.com" } ]
then = [ { do = "copy", to = ".A" } ]
continue = true

[[rule]]
name = "not this one"
when = [ { header = "subject", contains = "dinner" } ]
then = [ { do = "delete" } ]

[[rule]]
then = [ { do = "move", to = ".B" } ]
"#,
            SIMPLE,
        );
        assert_eq!(".B", mail.maildir());
        assert_eq!(1, setup.count(".A/new"));
        assert_eq!(1, setup.count(".B/new"));
        assert_eq!(0, setup.count("new"));
    }

    #[test]
    fn conditions_are_conjunctive_and_negatable() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
when = [
  { mailing_list = "rust-users" },
  { header = "subject", matches = "^\\[rust-users\\]" },
  { header = "from", contains = "alice", not = true },
]
then = [ { do = "move", to = ".A" } ]
"#,
            MAILING_LIST,
        );
        assert_eq!(".A", mail.maildir());

        let mail = setup.sort(
            r#"
[[rule]]
when = [
  { mailing_list = "rust-users" },
  { header = "from", contains = "carol", not = true },
]
then = [ { do = "move", to = ".A" } ]
"#,
            MAILING_LIST,
        );
        assert_eq!("", mail.maildir());
    }

    #[test]
    fn maildir_restriction() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
maildirs = [".A"]
then = [ { do = "delete" } ]
"#,
            SIMPLE,
        );
        assert!(mail.path().is_file());
    }

    #[test]
    fn failed_action_abandons_rule() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
then = [
  { do = "filter", command = ["false"] },
  { do = "move", to = ".A" },
]
continue = true

[[rule]]
then = [ { do = "copy", to = ".B" } ]
"#,
            SIMPLE,
        );
        assert_eq!("", mail.maildir());
        assert_eq!(0, setup.count(".A/new"));
        assert_eq!(1, setup.count(".B/new"));
        assert_eq!(SIMPLE, &fs::read(mail.path()).unwrap()[..]);
    }

    #[test]
    fn consumed_message_stops_processing() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
then = [
  { do = "filter", command = ["cat"], consume = true },
  { do = "move", to = ".A" },
]
continue = true

[[rule]]
then = [ { do = "copy", to = ".B" } ]
"#,
            SIMPLE,
        );
        assert_eq!("", mail.maildir());
        assert_eq!(0, setup.count(".A/new"));
        assert_eq!(0, setup.count(".B/new"));
    }

    #[test]
    fn filter_then_match_on_new_headers() {
        let mut setup = set_up();
        let mail = setup.sort(
            r#"
[[rule]]
then = [ { do = "filter", command = ["echo 'X-Spam: yes'; cat"], shell = true } ]
continue = true

[[rule]]
when = [ { header = "x-spam", contains = "yes" } ]
then = [ { do = "move", to = ".B" } ]
"#,
            SIMPLE,
        );
        assert_eq!(".B", mail.maildir());
        assert_eq!(Some("yes"), mail.header("x-spam").as_str());
    }

    #[test]
    fn deleted_message_stops_processing() {
        let mut setup = set_up();
        setup.sort(
            r#"
[[rule]]
then = [ { do = "delete" } ]
continue = true

[[rule]]
then = [ { do = "copy", to = ".A" } ]
"#,
            SIMPLE,
        );
        assert_eq!(0, setup.count("new"));
        assert_eq!(0, setup.count(".A/new"));
    }

    #[test]
    fn rule_validation() {
        assert_eq!(0, compile("").unwrap().len());

        fn invalid(rules: &str) -> String {
            match compile(rules) {
                Err(Error::InvalidRule(message)) => message,
                r => panic!("unexpected result: {:?}", r),
            }
        }

        assert!(invalid(
            r#"
[[rule]]
when = [ { header = "subject", target = true, contains = "x" } ]
then = []
"#
        )
        .starts_with("rule #1: "));
        invalid(
            r#"
[[rule]]
when = [ { contains = "x" } ]
then = []
"#,
        );
        invalid(
            r#"
[[rule]]
when = [ { header = "subject" } ]
then = []
"#,
        );
        invalid(
            r#"
[[rule]]
when = [ { target = true, contains = "x", matches = "y" } ]
then = []
"#,
        );
        invalid(
            r#"
[[rule]]
when = [ { any = true, contains = "x" } ]
then = []
"#,
        );
        assert!(invalid(
            r#"
[[rule]]
then = []

[[rule]]
name = "broken"
when = [ { header = "subject", matches = "(" } ]
then = []
"#
        )
        .starts_with("broken: bad pattern"));
        invalid(
            r#"
[[rule]]
then = [ { do = "move", to = "../escape" } ]
"#,
        );
        invalid(
            r#"
[[rule]]
maildirs = ["/abs"]
then = []
"#,
        );
        invalid(
            r#"
[[rule]]
then = [ { do = "forward", to = [] } ]
"#,
        );
        invalid(
            r#"
[[rule]]
then = [ { do = "filter", command = [] } ]
"#,
        );
    }

    #[test]
    fn forward_accepts_one_or_many() {
        let rules = compile(
            r#"
[[rule]]
then = [
  { do = "forward-copy", to = "a@b.com" },
  { do = "forward", to = ["a@b.com", "c@d.com"], sender = "me@x.org" },
]
"#,
        )
        .unwrap();
        assert_eq!(1, rules.len());
        match rules.rules[0].actions[..] {
            [Action::Forward {
                to: ref one,
                sender: None,
                keep: true,
            }, Action::Forward {
                to: ref many,
                sender: Some(ref sender),
                keep: false,
            }] => {
                assert_eq!(vec!["a@b.com".to_owned()], *one);
                assert_eq!(2, many.len());
                assert_eq!("me@x.org", sender.as_str());
            }
            ref a => panic!("unexpected actions: {:?}", a),
        }
    }
}

// src/conffile/prompt.rs

//! Asking the operator about a conflicting conffile

use super::decision::{Action, Decision};
use crate::config::ForceOptions;
use crate::error::{Error, Result};
use crate::script::{Invocation, ProcessRunner};
use crate::status::StatusReporter;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::debug;

const DEFAULT_PAGER: &str = "pager";
const DEFAULT_SHELL: &str = "sh";

/// Terminal side of the conffile question
pub trait Prompter {
    /// Show text to the operator
    fn message(&mut self, text: &str);

    /// Read one line of input; `None` at end of input
    fn read_answer(&mut self) -> Result<Option<String>>;

    /// Show the differences between the two versions
    fn show_diff(&mut self, old: &Path, new: &Path) -> Result<()>;

    /// Let the operator look around, returning when they are done
    fn suspend(&mut self) -> Result<()>;
}

/// Prompter on stdin / stderr, helpers run through `R`
pub struct TerminalPrompter<R: ProcessRunner> {
    runner: R,
}

impl<R: ProcessRunner> TerminalPrompter<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Single-quote `s` for `sh -c`
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

impl<R: ProcessRunner> Prompter for TerminalPrompter<R> {
    fn message(&mut self, text: &str) {
        eprint!("{}", text);
    }

    fn read_answer(&mut self) -> Result<Option<String>> {
        io::stderr().flush()?;
        let mut line = String::new();
        let n = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::Prompt(format!("read error on stdin at conffile prompt: {}", e)))?;
        Ok((n > 0).then_some(line))
    }

    fn show_diff(&mut self, old: &Path, new: &Path) -> Result<()> {
        let pager = env_or("PAGER", DEFAULT_PAGER);
        let shell = env_or("SHELL", DEFAULT_SHELL);
        let cmd = format!(
            "diff -Nu {} {} | {}",
            shell_quote(&old.to_string_lossy()),
            shell_quote(&new.to_string_lossy()),
            pager
        );

        debug!("Showing differences with: {}", cmd);
        self.runner.run(&Invocation::new(shell).arg("-c").arg(cmd))?;
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        if env::var_os("DPKG_NO_TSTP").is_some_and(|v| !v.is_empty()) {
            eprintln!("Type 'exit' when you're done.");
            let shell = env_or("SHELL", DEFAULT_SHELL);
            self.runner.run(&Invocation::new(shell).arg("-i"))?;
        } else {
            eprintln!("Don't forget to foreground ('fg') this process when you're done !");
            let pgrp = nix::unistd::getpgrp();
            nix::sys::signal::killpg(pgrp, nix::sys::signal::Signal::SIGTSTP)
                .map_err(|e| Error::Prompt(format!("unable to suspend: {}", e)))?;
        }
        Ok(())
    }
}

/// Everything shown to the operator about one conffile
pub struct PromptContext<'a> {
    /// Path as the package names it
    pub name: &'a str,
    /// Live file actually compared
    pub real_old: &'a Path,
    /// Candidate `.dpkg-new`
    pub real_new: &'a Path,
}

fn describe(ctx: &PromptContext<'_>, decision: &Decision) -> String {
    let mut text = format!("\nConfiguration file '{}'", ctx.name);
    let real_old = ctx.real_old.to_string_lossy();
    if real_old != ctx.name {
        text.push_str(&format!(" (actually '{}')", real_old));
    }

    if decision.is_new {
        text.push_str(
            "\n ==> File on system created by you or by a script.\n \
             ==> File also in package provided by package maintainer.\n",
        );
        return text;
    }

    text.push_str(if !decision.user_edited {
        "\n     Not modified since installation.\n"
    } else if !decision.user_removed {
        "\n ==> Modified (by you or by a script) since installation.\n"
    } else {
        "\n ==> Deleted (by you or by a script) since installation.\n"
    });
    text.push_str(if decision.dist_edited {
        " ==> Package distributor has shipped an updated version.\n"
    } else {
        "     Version in package is the same as at last installation.\n"
    });
    text
}

/// First non-blank character of an answer, lowercased
fn answer_char(line: &str) -> Option<char> {
    line.chars()
        .find(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
}

/// Settle a decision that needs the operator
///
/// Decisions that do not prompt come back unchanged. Otherwise the force
/// options may answer; failing that the operator is asked until they choose
/// to install or keep. The result is a backup-keeping install or keep.
pub fn prompt_action(
    prompter: &mut dyn Prompter,
    status: &mut StatusReporter,
    force: &ForceOptions,
    ctx: &PromptContext<'_>,
    decision: Decision,
) -> Result<Decision> {
    if !decision.prompt {
        return Ok(decision);
    }

    status.conffile_prompt(
        ctx.name,
        &ctx.real_old.to_string_lossy(),
        &ctx.real_new.to_string_lossy(),
        decision.user_edited,
        decision.dist_edited,
    );

    let default = decision.action;
    let install = loop {
        prompter.message(&describe(ctx, &decision));

        if !force.confdef {
            if force.confnew {
                prompter.message(" ==> Using new file as you requested.\n");
                break true;
            }
            if force.confold {
                prompter.message(" ==> Using current old file as you requested.\n");
                break false;
            }
        }

        if force.confdef {
            match default {
                Action::Keep => {
                    prompter.message(" ==> Keeping old config file as default.\n");
                    break false;
                }
                Action::Install | Action::NewConffile => {
                    prompter.message(" ==> Using new config file as default.\n");
                    break true;
                }
            }
        }

        prompter.message(
            "   What would you like to do about it ?  Your options are:\n    \
             Y or I  : install the package maintainer's version\n    \
             N or O  : keep your currently-installed version\n      \
             D     : show the differences between the versions\n      \
             Z     : background this process to examine the situation\n",
        );
        let (default_note, default_tag) = match default {
            Action::Keep => (
                " The default action is to keep your current version.\n",
                "[default=N]",
            ),
            Action::Install | Action::NewConffile => (
                " The default action is to install the new version.\n",
                "[default=Y]",
            ),
        };
        prompter.message(default_note);

        let base = ctx.name.rsplit('/').find(|s| !s.is_empty()).unwrap_or(ctx.name);
        prompter.message(&format!("*** {} (Y/I/N/O/D/Z) {} ? ", base, default_tag));

        let Some(line) = prompter.read_answer()? else {
            return Err(Error::Prompt("EOF on stdin at conffile prompt".to_string()));
        };

        match answer_char(&line) {
            None => break default != Action::Keep,
            Some('y' | 'i') => break true,
            Some('n' | 'o') => break false,
            Some('d') => prompter.show_diff(ctx.real_old, ctx.real_new)?,
            Some('z') => prompter.suspend()?,
            Some(_) => {}
        }
    };

    status.log_conffile(ctx.name, if install { "install" } else { "keep" });

    Ok(Decision {
        action: if install { Action::Install } else { Action::Keep },
        prompt: false,
        backup: true,
        is_new: false,
        ..decision
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Canned answers, records what was shown
    #[derive(Default)]
    pub(crate) struct ScriptedPrompter {
        pub answers: VecDeque<String>,
        pub shown: String,
        pub diffs: usize,
        pub suspends: usize,
    }

    impl ScriptedPrompter {
        pub fn with_answers(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|a| format!("{}\n", a)).collect(),
                ..Self::default()
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn message(&mut self, text: &str) {
            self.shown.push_str(text);
        }

        fn read_answer(&mut self) -> Result<Option<String>> {
            Ok(self.answers.pop_front())
        }

        fn show_diff(&mut self, _old: &Path, _new: &Path) -> Result<()> {
            self.diffs += 1;
            Ok(())
        }

        fn suspend(&mut self) -> Result<()> {
            self.suspends += 1;
            Ok(())
        }
    }

    fn conflict() -> Decision {
        Decision::from_table(true, true)
    }

    fn ctx() -> PromptContext<'static> {
        PromptContext {
            name: "/etc/foo.conf",
            real_old: Path::new("/etc/foo.conf"),
            real_new: Path::new("/etc/foo.conf.dpkg-new"),
        }
    }

    fn ask(prompter: &mut ScriptedPrompter, force: ForceOptions, decision: Decision) -> Result<Decision> {
        let mut status = StatusReporter::new();
        prompt_action(prompter, &mut status, &force, &ctx(), decision)
    }

    #[test]
    fn test_no_prompt_passes_through() {
        let mut p = ScriptedPrompter::default();
        let d = Decision::from_table(false, true);
        assert_eq!(ask(&mut p, ForceOptions::default(), d).unwrap(), d);
        assert!(p.shown.is_empty());
    }

    #[test]
    fn test_answers() {
        let mut p = ScriptedPrompter::with_answers(&["  I"]);
        let d = ask(&mut p, ForceOptions::default(), conflict()).unwrap();
        assert_eq!(d.action, Action::Install);
        assert!(d.backup);
        assert!(p.shown.contains("Modified (by you or by a script) since installation"));
        assert!(p.shown.contains("*** foo.conf (Y/I/N/O/D/Z) [default=N] ? "));

        let mut p = ScriptedPrompter::with_answers(&["o"]);
        let d = ask(&mut p, ForceOptions::default(), conflict()).unwrap();
        assert_eq!(d.action, Action::Keep);
        assert!(d.backup);
    }

    #[test]
    fn test_empty_answer_takes_default() {
        let mut p = ScriptedPrompter::with_answers(&[""]);
        let d = ask(&mut p, ForceOptions::default(), conflict()).unwrap();
        assert_eq!(d.action, Action::Keep);
    }

    #[test]
    fn test_diff_and_suspend_then_answer() {
        let mut p = ScriptedPrompter::with_answers(&["d", "z", "x", "y"]);
        let d = ask(&mut p, ForceOptions::default(), conflict()).unwrap();
        assert_eq!(d.action, Action::Install);
        assert_eq!(p.diffs, 1);
        assert_eq!(p.suspends, 1);
        assert!(p.answers.is_empty());
    }

    #[test]
    fn test_eof_is_error() {
        let mut p = ScriptedPrompter::with_answers(&[]);
        let err = ask(&mut p, ForceOptions::default(), conflict()).unwrap_err();
        assert!(matches!(err, Error::Prompt(_)));
    }

    #[test]
    fn test_force_options() {
        let confnew = ForceOptions { confnew: true, ..ForceOptions::default() };
        let mut p = ScriptedPrompter::default();
        assert_eq!(ask(&mut p, confnew, conflict()).unwrap().action, Action::Install);

        let confold = ForceOptions { confold: true, ..ForceOptions::default() };
        assert_eq!(ask(&mut p, confold, conflict()).unwrap().action, Action::Keep);

        // confdef wins over confnew when there is a default
        let confdef = ForceOptions { confdef: true, confnew: true, ..ForceOptions::default() };
        assert_eq!(ask(&mut p, confdef, conflict()).unwrap().action, Action::Keep);
        assert!(p.answers.is_empty());
    }

    #[test]
    fn test_user_removed_preserved() {
        let mut decision = conflict();
        decision.user_removed = true;
        let mut p = ScriptedPrompter::with_answers(&["y"]);
        let d = ask(&mut p, ForceOptions::default(), decision).unwrap();
        assert!(d.user_removed);
        assert!(p.shown.contains("Deleted (by you or by a script)"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/etc/a b"), "'/etc/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}

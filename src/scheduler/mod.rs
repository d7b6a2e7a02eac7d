// src/scheduler/mod.rs

//! Dependency-ordered configuration queue
//!
//! Packages named for configuration (or trigger processing) are queued and
//! taken in turn. A package whose dependencies are themselves still queued
//! goes to the back of the queue. Each time a whole pass goes by without
//! anything happening the run moves to its next "try":
//!
//! - try 1: configure whatever is ready, defer the rest
//! - try 2: additionally break one dependency cycle per package
//! - try 3: with `--force depends-version`, ignore version restrictions
//! - try 4: with `--force depends`, configure anyway; otherwise give up
//!
//! Triggers activated along the way are incorporated after every package
//! and the interested packages are processed once the queue is empty.

pub mod configure;
pub mod cycle;
pub mod depends;
pub mod trigproc;

use crate::config::Config;
use crate::conffile::prompt::Prompter;
use crate::diversion::DiversionTable;
use crate::error::{Error, Result};
use crate::pkg::{IsToBe, PackageStore, PkgId, Status};
use crate::script::ProcessRunner;
use crate::status::StatusReporter;
use crate::trigger::Triggers;
use depends::DependencyChecker;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

/// Last try; deferring is no longer allowed
pub const FINAL_TRY: u32 = 4;

/// Per-package failures tolerated before the run stops
pub const MAX_ERRORS: usize = 50;

/// What the queue was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Configure,
    TriggersOnly,
}

impl QueueAction {
    /// Command-line spelling, used in error reports
    pub fn option(&self) -> &'static str {
        match self {
            QueueAction::Configure => "--configure",
            QueueAction::TriggersOnly => "--triggers-only",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            QueueAction::Configure => "configure",
            QueueAction::TriggersOnly => "process triggers",
        }
    }

    /// Whether `status` with `has_pending` triggers is worth queueing for `--pending`
    pub fn wants_pending(&self, status: Status, has_pending: bool) -> bool {
        match self {
            QueueAction::Configure => {
                matches!(status, Status::Unpacked | Status::HalfConfigured) || has_pending
            }
            QueueAction::TriggersOnly => has_pending,
        }
    }
}

/// Mutable state of one run through the queue
#[derive(Debug)]
pub struct RunContext {
    pub queue: VecDeque<PkgId>,
    /// Current try, 1 to [`FINAL_TRY`]
    pub dependtry: u32,
    /// Packages taken off the queue since anything last changed
    pub sincenothing: usize,
    /// Dependency edges forced satisfied to break cycles, as (depender, dependee)
    broken: HashSet<(String, String)>,
    /// Pending trigger sets already processed since configuration last progressed
    trigger_history: HashMap<PkgId, Vec<Vec<String>>>,
    /// Packages whose triggers fired during this run
    pub deferred_triggers: VecDeque<PkgId>,
    /// Names of packages that failed, in order
    pub failures: Vec<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            dependtry: 1,
            sincenothing: 0,
            broken: HashSet::new(),
            trigger_history: HashMap::new(),
            deferred_triggers: VecDeque::new(),
            failures: Vec::new(),
        }
    }

    /// Queue a package, marking it as about to be configured
    pub fn enqueue(&mut self, store: &mut PackageStore, id: PkgId) {
        store.get_mut(id).client().istobe = IsToBe::InstallNew;
        if !self.queue.contains(&id) {
            self.queue.push_back(id);
        }
    }

    pub fn is_broken(&self, depender: &str, dependee: &str) -> bool {
        self.broken
            .contains(&(depender.to_string(), dependee.to_string()))
    }

    /// Treat `depender -> dependee` as satisfied from now on
    pub fn break_edge(&mut self, depender: &str, dependee: &str) -> bool {
        self.broken
            .insert((depender.to_string(), dependee.to_string()))
    }

    /// Forget processed trigger sets; configuration has moved on
    pub fn reset_trigger_cycle(&mut self) {
        self.trigger_history.clear();
    }

    /// Remember processing `pending` for `id`; true when it was seen before
    pub fn record_trigger_processing(&mut self, id: PkgId, pending: &[String]) -> bool {
        let mut set = pending.to_vec();
        set.sort();
        let seen = self.trigger_history.entry(id).or_default();
        if seen.contains(&set) {
            return true;
        }
        seen.push(set);
        false
    }

    pub fn has_failed(&self, name: &str) -> bool {
        self.failures.iter().any(|f| f == name)
    }

    /// The closing report, when anything failed
    pub fn summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let mut text = String::from("Errors were encountered while processing:\n");
        for name in &self.failures {
            text.push(' ');
            text.push_str(name);
            text.push('\n');
        }
        Some(text)
    }
}

/// Everything a queue run touches
pub struct Scheduler<'a> {
    pub config: &'a Config,
    pub store: &'a mut PackageStore,
    pub diversions: &'a DiversionTable,
    pub triggers: &'a mut Triggers,
    pub status: &'a mut StatusReporter,
    pub prompter: &'a mut dyn Prompter,
    pub runner: &'a mut dyn ProcessRunner,
    pub checker: &'a dyn DependencyChecker,
}

impl Scheduler<'_> {
    /// Queue every package that `action --pending` should look at
    pub fn enqueue_pending(&mut self, run: &mut RunContext, action: QueueAction) {
        for id in self.store.ids() {
            let pkg = self.store.get(id);
            if action.wants_pending(pkg.status, !pkg.trig_pend.is_empty()) {
                run.enqueue(self.store, id);
            }
        }
    }

    /// Work through the queue, then any triggers it activated
    ///
    /// Per-package failures are reported and recorded in `run`; only fatal
    /// errors are returned.
    pub fn process_queue(&mut self, run: &mut RunContext, action: QueueAction) -> Result<()> {
        self.incorporate(run)?;

        while let Some(id) = run.queue.pop_front() {
            self.store.get_mut(id).client().istobe = IsToBe::Normal;

            let limit = run.queue.len() * 2 + 2;
            let idle = run.sincenothing;
            run.sincenothing += 1;
            if idle >= limit && run.dependtry < FINAL_TRY {
                run.dependtry += 1;
                run.sincenothing = 0;
                info!("Nothing configured for a whole pass, starting try {}", run.dependtry);
            }

            let result = self.process_one(run, id, action);
            if let Err(e) = result {
                self.report_failure(run, id, action, e)?;
                if run.failures.len() >= MAX_ERRORS {
                    eprintln!("settle: too many errors, stopping");
                    break;
                }
            }
        }

        let result = self.run_deferred_triggers(run, action);
        self.store.clear_istobes();
        result
    }

    fn process_one(&mut self, run: &mut RunContext, id: PkgId, action: QueueAction) -> Result<()> {
        let pkg = self.store.get(id);
        debug!(
            "Processing {} ({}) try {} sincenothing {}",
            pkg.name, pkg.status, run.dependtry, run.sincenothing
        );

        if action == QueueAction::TriggersOnly && pkg.trig_pend.is_empty() {
            return Err(Error::NotReady(format!(
                "package {} is not ready for trigger processing\n \
                 (current status '{}' with no pending triggers)",
                pkg.name, pkg.status
            )));
        }

        if pkg.trig_pend.is_empty() {
            self.configure(run, id)
        } else {
            self.process_triggers(run, id)
        }
    }

    fn run_deferred_triggers(&mut self, run: &mut RunContext, action: QueueAction) -> Result<()> {
        while let Some(id) = run.deferred_triggers.pop_front() {
            let pkg = self.store.get(id);
            if pkg.trig_pend.is_empty() || run.has_failed(&pkg.name) {
                continue;
            }
            if let Err(e) = self.process_triggers(run, id) {
                self.report_failure(run, id, action, e)?;
                if run.failures.len() >= MAX_ERRORS {
                    eprintln!("settle: too many errors, stopping");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Report a per-package failure; fatal errors are handed back instead
    fn report_failure(
        &mut self,
        run: &mut RunContext,
        id: PkgId,
        action: QueueAction,
        err: Error,
    ) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }

        let pkg = self.store.get(id);
        let name = pkg.name.clone();
        let unrecorded = pkg.id.is_none() && pkg.status == Status::NotInstalled;
        self.record_failure(run, name, action, &err.to_string());

        // Nothing to write for a name the database never knew
        if unrecorded {
            return Ok(());
        }
        // Whatever state it was left in has to be on disk
        self.store.note(id)
    }

    /// Report a name on the command line that matches no package record
    pub fn reject_unknown(&mut self, run: &mut RunContext, name: &str, action: QueueAction) {
        let err = Error::NotReady(format!(
            "no package named '{}' is installed, cannot {}",
            name,
            action.verb()
        ));
        self.record_failure(run, name.to_string(), action, &err.to_string());
    }

    fn record_failure(&mut self, run: &mut RunContext, name: String, action: QueueAction, message: &str) {
        eprintln!(
            "settle: error processing {} ({}):\n {}",
            name,
            action.option(),
            message
        );
        self.status.package_error(&name, message);
        if !run.has_failed(&name) {
            run.failures.push(name);
        }
    }

    /// Fold newly activated triggers in; remember who got something new
    pub(crate) fn incorporate(&mut self, run: &mut RunContext) -> Result<()> {
        let before: HashMap<PkgId, usize> = self
            .store
            .iter()
            .map(|(id, pkg)| (id, pkg.trig_pend.len()))
            .collect();

        self.triggers.incorporate(self.store)?;

        for (id, pkg) in self.store.iter() {
            let grew = pkg.trig_pend.len() > before.get(&id).copied().unwrap_or(0);
            if grew && !run.queue.contains(&id) && !run.deferred_triggers.contains(&id) {
                debug!("{} has new pending triggers", pkg.name);
                run.deferred_triggers.push_back(id);
            }
        }
        Ok(())
    }
}

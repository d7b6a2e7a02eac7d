// src/scheduler/configure.rs

//! Configuring one package

use super::depends::DepOutcome;
use super::{RunContext, Scheduler, cycle};
use crate::conffile::ConffileResolver;
use crate::error::{Error, Result};
use crate::pkg::{EFlag, IsToBe, PkgId, Status};
use crate::script::{FailurePolicy, MaintainerScripts};
use crate::trigger;
use tracing::{debug, info, warn};

impl Scheduler<'_> {
    /// Take one package from unpacked (or half-configured) to configured
    ///
    /// Returns `Ok` without doing anything when the package has to wait for
    /// others; it is then back on the queue.
    pub fn configure(&mut self, run: &mut RunContext, id: PkgId) -> Result<()> {
        let pkg = self.store.get(id);
        match pkg.status {
            Status::NotInstalled => {
                return Err(Error::NotReady(format!(
                    "no package named '{}' is installed, cannot configure",
                    pkg.name
                )));
            }
            Status::Installed => {
                return Err(Error::NotReady(format!(
                    "package {} is already installed and configured",
                    pkg.name
                )));
            }
            Status::Unpacked | Status::HalfConfigured => {}
            other => {
                return Err(Error::NotReady(format!(
                    "package {} is not ready for configuration\n \
                     cannot configure (current status '{}')",
                    pkg.name, other
                )));
            }
        }

        if run.dependtry > 1 && cycle::break_cycle(self.store, run, id) {
            run.sincenothing = 0;
        }

        let deps = self.checker.dependencies(self.store, run, id);
        for extra in &deps.enqueue {
            let name = &self.store.get(*extra).name;
            if self.store.get(*extra).istobe() != IsToBe::InstallNew {
                eprintln!(
                    "settle: also configuring '{}' (required by '{}')",
                    name,
                    self.store.get(id).name
                );
                run.enqueue(self.store, *extra);
            }
        }
        if deps.outcome == DepOutcome::Defer {
            debug!("{} deferred (try {})", self.store.get(id).name, run.dependtry);
            run.enqueue(self.store, id);
            return Ok(());
        }

        // Past this point the package leaves the queue for good
        run.reset_trigger_cycle();

        let breaks = self.checker.breaks(self.store, id);
        let mut problems = deps.messages;
        problems.push_str(&breaks.messages);
        let name = self.store.get(id).name.clone();

        if deps.outcome == DepOutcome::Blocked || breaks.outcome == DepOutcome::Blocked {
            run.sincenothing = 0;
            eprintln!(
                "settle: dependency problems prevent configuration of {}:\n{}",
                name, problems
            );
            return Err(Error::DependencyProblem {
                package: name,
                details: problems,
            });
        }
        if !problems.is_empty() {
            eprintln!(
                "settle: {}: dependency problems, but configuring anyway as you requested:\n{}",
                name, problems
            );
        }
        run.sincenothing = 0;

        if self.store.get(id).eflag == EFlag::ReinstReq {
            let err = Error::ReinstallRequired(name.clone());
            if !self.config.force.remove_reinstreq {
                return Err(err);
            }
            warn!("{}: {}", name, err);
            eprintln!("settle: warning: overriding problem because --force enabled:\n {}", err);
        }

        let (installed, available) = {
            let pkg = self.store.get(id);
            (pkg.installed.version.clone(), pkg.available.version.clone())
        };
        println!("Setting up {} ...", self.store.get(id).describe());
        self.status
            .log_action("configure", &name, &installed.describe(), &available.describe());
        self.status.processing("configure", &name);

        if self.config.no_act {
            // Pretend, nothing is written in this mode
            let pkg = self.store.get_mut(id);
            pkg.status = Status::Installed;
            pkg.client().istobe = IsToBe::Normal;
            return Ok(());
        }

        if self.store.get(id).status == Status::Unpacked {
            debug!("{}: updating conffiles", name);
            self.store.note(id)?;
            self.configure_conffiles(id)?;
            self.store.get_mut(id).set_status(Status::HalfConfigured)?;
        }
        self.store.note(id)?;
        self.status.log_status(Status::HalfConfigured.as_str(), &name, &installed.describe());

        let old_version = self
            .store
            .get(id)
            .config_version
            .as_ref()
            .filter(|v| v.is_informative())
            .map(|v| v.to_string())
            .unwrap_or_default();
        MaintainerScripts::new(self.config).run(
            &mut *self.runner,
            self.store.get(id),
            "postinst",
            "configure",
            &old_version,
            &[],
            FailurePolicy::Fatal,
        )?;

        self.store.get_mut(id).eflag = EFlag::Ok;
        self.post_postinst(run, id)
    }

    /// Resolve each conffile in declared order, recording the new hashes
    fn configure_conffiles(&mut self, id: PkgId) -> Result<()> {
        let conffiles = self.store.get(id).installed.conffiles.clone();

        for (index, conffile) in conffiles.iter().enumerate() {
            let recorded = {
                let mut resolver = ConffileResolver {
                    config: self.config,
                    diversions: self.diversions,
                    prompter: &mut *self.prompter,
                    status: &mut *self.status,
                    triggers: &mut *self.triggers,
                };
                resolver.resolve(self.store.get(id), conffile)?
            };

            if let Some(hash) = recorded {
                let pkg = self.store.get_mut(id);
                if let Some(entry) = pkg.installed.conffiles.get_mut(index) {
                    entry.hash = hash;
                }
                self.store.note(id)?;
            }
        }
        Ok(())
    }

    /// Settle a package whose postinst has just succeeded
    ///
    /// Its own pending triggers are done with; it is configured unless it
    /// still waits for other packages' triggers.
    pub(crate) fn post_postinst(&mut self, run: &mut RunContext, id: PkgId) -> Result<()> {
        let pkg = self.store.get_mut(id);
        pkg.trig_pend.clear();
        let target = if pkg.trig_aw.is_empty() {
            Status::Installed
        } else {
            Status::TriggersAwaited
        };
        pkg.set_status(target)?;
        pkg.config_version = Some(pkg.installed.version.clone());
        pkg.client().istobe = IsToBe::Normal;

        let name = pkg.name.clone();
        let version = pkg.installed.version.describe();
        info!("{} is now {}", name, target);
        self.status.log_status(target.as_str(), &name, &version);
        self.store.note(id)?;

        trigger::release_awaiters(self.store, id)?;
        self.incorporate(run)
    }
}

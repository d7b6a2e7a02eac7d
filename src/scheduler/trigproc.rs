// src/scheduler/trigproc.rs

//! Running a package's pending triggers

use super::{RunContext, Scheduler};
use crate::error::{Error, Result};
use crate::pkg::{PkgId, Status};
use crate::script::{FailurePolicy, MaintainerScripts};
use tracing::debug;

impl Scheduler<'_> {
    /// Run `postinst triggered "<names>"` for everything pending on `id`
    pub fn process_triggers(&mut self, run: &mut RunContext, id: PkgId) -> Result<()> {
        let pkg = self.store.get(id);
        let pending = pkg.trig_pend.clone();
        if pending.is_empty() {
            debug!("{}: no triggers pending", pkg.name);
            return Ok(());
        }
        let name = pkg.name.clone();
        let version = pkg.installed.version.describe();

        if run.record_trigger_processing(id, &pending) {
            return Err(Error::TriggerCycle(name));
        }

        println!("Processing triggers for {} ...", name);
        self.status.log_action("trigproc", &name, &version, &version);
        self.status.processing("trigproc", &name);

        // Pending triggers are consumed once the script is started
        let pkg = self.store.get_mut(id);
        pkg.set_status(Status::HalfConfigured)?;
        pkg.trig_pend.clear();
        self.store.note(id)?;

        if !self.config.no_act {
            run.sincenothing = 0;
            let names = pending.join(" ");
            MaintainerScripts::new(self.config).run(
                &mut *self.runner,
                self.store.get(id),
                "postinst",
                "triggered",
                &names,
                &[],
                FailurePolicy::Fatal,
            )?;
        }

        self.post_postinst(run, id)
    }
}

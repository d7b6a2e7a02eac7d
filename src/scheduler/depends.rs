// src/scheduler/depends.rs

//! Is a package ready to be configured?
//!
//! Every dependency group needs one alternative that is configured at an
//! acceptable version, or provided by a configured package. An alternative
//! that is itself queued for configuration lets the package wait for it;
//! anything else blocks it. Installed packages that break the package being
//! configured block it as well.

use super::{FINAL_TRY, RunContext};
use crate::config::ForceOptions;
use crate::pkg::relation::{Dependency, Possibility};
use crate::pkg::{IsToBe, Package, PackageStore, PkgId, Status};
use std::fmt::Write;
use tracing::debug;

/// How far a package (or one of its dependencies) is from being satisfied
///
/// Ordered worst first, so the outcome of several checks is their minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DepOutcome {
    /// Cannot be configured this run
    Blocked,
    /// Waiting for packages later in the queue
    Defer,
    Satisfied,
}

/// Result of a check with the problems it found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepReport {
    pub outcome: DepOutcome,
    /// Problem lines; may be present even when satisfied, if forced
    pub messages: String,
    /// Packages that have to join the queue first
    pub enqueue: Vec<PkgId>,
}

impl DepReport {
    fn satisfied() -> Self {
        Self {
            outcome: DepOutcome::Satisfied,
            messages: String::new(),
            enqueue: Vec::new(),
        }
    }
}

/// Decides whether a package may be configured
pub trait DependencyChecker {
    /// Check Depends and Pre-Depends of `id`
    fn dependencies(&self, store: &PackageStore, run: &RunContext, id: PkgId) -> DepReport;

    /// Check whether some other package breaks `id`
    fn breaks(&self, store: &PackageStore, id: PkgId) -> DepReport;
}

/// Checks relations against the package records
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreChecker {
    force: ForceOptions,
}

/// Outcome for one alternative, with the reason when it is not satisfied
struct Found {
    outcome: DepOutcome,
    enqueue: Option<PkgId>,
}

impl Found {
    fn of(outcome: DepOutcome) -> Self {
        Self {
            outcome,
            enqueue: None,
        }
    }
}

impl StoreChecker {
    pub fn new(force: ForceOptions) -> Self {
        Self { force }
    }

    /// Whether `target` fulfils `poss`, given where it is in its lifecycle
    fn check_target(
        &self,
        store: &PackageStore,
        run: &RunContext,
        target: PkgId,
        poss: &Possibility,
        provided: Option<&str>,
        why: &mut String,
    ) -> Found {
        let pkg = store.get(target);
        let version_ok = provided.is_some()
            || poss.version_ok(&pkg.installed.version)
            || (run.dependtry >= 3 && self.force.depends_version);
        let subject = match provided {
            Some(virt) => format!("Package {} which provides {}", pkg.name, virt),
            None => format!("Package {}", pkg.name),
        };

        match pkg.status {
            s if s.satisfies_depends() => {
                if version_ok {
                    return Found::of(DepOutcome::Satisfied);
                }
                let _ = writeln!(
                    why,
                    "  Version of {} on system is {}.",
                    pkg.name,
                    pkg.installed.version.describe()
                );
                Found::of(DepOutcome::Blocked)
            }
            Status::Unpacked | Status::HalfConfigured => {
                if !version_ok {
                    let _ = writeln!(
                        why,
                        "  Version of {} to be configured is {}.",
                        pkg.name,
                        pkg.installed.version.describe()
                    );
                    return Found::of(DepOutcome::Blocked);
                }
                if pkg.istobe() == IsToBe::InstallNew {
                    let _ = writeln!(why, "  {} is to be configured.", subject);
                    return Found::of(DepOutcome::Defer);
                }
                if self.force.configure_any {
                    let _ = writeln!(why, "  {} is not configured yet.", subject);
                    return Found {
                        outcome: DepOutcome::Defer,
                        enqueue: Some(target),
                    };
                }
                let _ = writeln!(why, "  {} is not configured yet.", subject);
                Found::of(DepOutcome::Blocked)
            }
            Status::HalfInstalled => {
                let _ = writeln!(why, "  {} is not configured yet.", subject);
                Found::of(DepOutcome::Blocked)
            }
            _ => {
                let _ = writeln!(why, "  {} is not installed.", subject);
                Found::of(DepOutcome::Blocked)
            }
        }
    }

    /// Best outcome over the alternatives of one group
    #[allow(clippy::too_many_arguments)]
    fn check_group(
        &self,
        store: &PackageStore,
        run: &RunContext,
        pkg: &Package,
        id: PkgId,
        dep: &Dependency,
        why: &mut String,
        enqueue: &mut Vec<PkgId>,
    ) -> DepOutcome {
        let mut best = DepOutcome::Blocked;

        for poss in &dep.alternatives {
            if run.is_broken(&pkg.name, &poss.name) {
                debug!("{} -> {} counts as satisfied (cycle broken)", pkg.name, poss.name);
                return DepOutcome::Satisfied;
            }

            let mut found_any = false;
            if let Some(target) = store.find(&poss.name) {
                if target == id {
                    return DepOutcome::Satisfied;
                }
                if store.get(target).status != Status::NotInstalled || store.providers(&poss.name).is_empty() {
                    found_any = true;
                    let found = self.check_target(store, run, target, poss, None, why);
                    if found.outcome == DepOutcome::Satisfied {
                        return DepOutcome::Satisfied;
                    }
                    if let Some(extra) = found.enqueue {
                        enqueue.push(extra);
                    }
                    best = best.max(found.outcome);
                }
            }

            // Provides are unversioned; they cannot fulfil a versioned relation
            if poss.relation.is_none() {
                for provider in store.providers(&poss.name) {
                    if provider == id {
                        return DepOutcome::Satisfied;
                    }
                    if !store.get(provider).installed.provides.contains(&poss.name) {
                        continue;
                    }
                    found_any = true;
                    let found = self.check_target(store, run, provider, poss, Some(&poss.name), why);
                    if found.outcome == DepOutcome::Satisfied {
                        return DepOutcome::Satisfied;
                    }
                    if let Some(extra) = found.enqueue {
                        enqueue.push(extra);
                    }
                    best = best.max(found.outcome);
                }
            }

            if !found_any {
                let _ = writeln!(why, "  Package {} is not installed.", poss.name);
            }
        }

        best
    }
}

impl DependencyChecker for StoreChecker {
    fn dependencies(&self, store: &PackageStore, run: &RunContext, id: PkgId) -> DepReport {
        let pkg = store.get(id);
        let mut report = DepReport::satisfied();
        let mut deferred = String::new();

        let groups = pkg
            .installed
            .pre_depends
            .iter()
            .map(|d| ("pre-depends on", d))
            .chain(pkg.installed.depends.iter().map(|d| ("depends on", d)));

        for (verb, dep) in groups {
            let mut why = String::new();
            let outcome = self.check_group(store, run, pkg, id, dep, &mut why, &mut report.enqueue);
            if outcome == DepOutcome::Satisfied {
                continue;
            }

            let text = format!(" {} {} {}; however:\n{}", pkg.name, verb, dep, why);
            if outcome == DepOutcome::Blocked {
                report.messages.push_str(&text);
            } else {
                deferred.push_str(&text);
            }
            report.outcome = report.outcome.min(outcome);
        }

        report.enqueue.sort();
        report.enqueue.dedup();

        if report.outcome == DepOutcome::Satisfied {
            return report;
        }

        if self.force.depends {
            // Defer through the earlier tries, then go ahead regardless
            if run.dependtry >= FINAL_TRY {
                report.messages.push_str(&deferred);
                report.outcome = DepOutcome::Satisfied;
            } else {
                report.outcome = DepOutcome::Defer;
            }
        } else if report.outcome == DepOutcome::Defer && run.dependtry >= FINAL_TRY {
            report.messages.push_str(&deferred);
            report.outcome = DepOutcome::Blocked;
        }

        debug!("{}: dependencies {:?} (try {})", pkg.name, report.outcome, run.dependtry);
        report
    }

    fn breaks(&self, store: &PackageStore, id: PkgId) -> DepReport {
        let pkg = store.get(id);
        let mut report = DepReport::satisfied();

        for (other_id, other) in store.iter() {
            if other_id == id
                || other.status < Status::Unpacked
                || other.istobe() == IsToBe::Remove
            {
                continue;
            }

            for dep in &other.installed.breaks {
                for poss in &dep.alternatives {
                    let hit = if poss.name == pkg.name {
                        poss.version_ok(&pkg.installed.version)
                    } else {
                        poss.relation.is_none() && pkg.installed.provides.contains(&poss.name)
                    };
                    if !hit {
                        continue;
                    }
                    let _ = writeln!(
                        report.messages,
                        " {} ({}) breaks {} and is {}.",
                        other.name,
                        other.installed.version.describe(),
                        poss,
                        other.status.description()
                    );
                    report.outcome = DepOutcome::Blocked;
                }
            }
        }

        if report.outcome == DepOutcome::Blocked && self.force.depends {
            report.outcome = DepOutcome::Satisfied;
        }
        report
    }
}

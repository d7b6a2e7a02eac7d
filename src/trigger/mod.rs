// src/trigger/mod.rs

//! Trigger bookkeeping
//!
//! A trigger is a name packages can be interested in. File triggers are
//! named by a path and fire when something at or below that path changes;
//! their interests live in `<admindir>/triggers/File` as `<path> <package>`
//! lines. Explicit interests are part of each installed package's metadata.
//!
//! Activations are appended to `<admindir>/triggers/Unincorp` as
//! `<trigger> <awaiting package or ->` lines and folded into the status
//! database by [`Triggers::incorporate`]:
//!
//! - every interested, configured package gets the trigger on its pending
//!   list and goes to `triggers-pending`
//! - the activating package, if named, waits for each of them and goes to
//!   `triggers-awaited`
//!
//! A package stops waiting once none of the packages it waits for has
//! anything pending.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pkg::{PackageStore, PkgId, Status};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Awaiter column value meaning nobody waits
pub const NO_AWAITER: &str = "-";

/// One line of the file trigger interest list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInterest {
    pub path: String,
    pub package: String,
}

impl FileInterest {
    /// `path` is the interest path itself or lies beneath it
    pub fn matches(&self, path: &str) -> bool {
        let base = self.path.trim_end_matches('/');
        match path.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Parse the file trigger interest list
pub fn parse_file_interests(text: &str) -> Result<Vec<FileInterest>> {
    let mut interests = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(path), Some(package), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(Error::ParseError(format!(
                "triggers/File line {}: expected '<path> <package>'",
                lineno + 1
            )));
        };
        // A "/noawait" style option suffix is ignored
        let package = package.split('/').next().unwrap_or(package);
        interests.push(FileInterest {
            path: path.to_string(),
            package: package.to_string(),
        });
    }
    Ok(interests)
}

/// Bring a package's status in line with its trigger lists
///
/// Only packages past configuration move; the others pick the right state
/// when their postinst finishes.
pub fn settle_status(store: &mut PackageStore, id: PkgId) -> Result<bool> {
    let pkg = store.get_mut(id);
    if !matches!(
        pkg.status,
        Status::Installed | Status::TriggersPending | Status::TriggersAwaited
    ) {
        return Ok(false);
    }

    let wanted = if !pkg.trig_pend.is_empty() {
        Status::TriggersPending
    } else if !pkg.trig_aw.is_empty() {
        Status::TriggersAwaited
    } else {
        Status::Installed
    };
    if wanted == pkg.status {
        return Ok(false);
    }
    debug!("{}: {} -> {}", pkg.name, pkg.status, wanted);
    pkg.set_status(wanted)?;
    Ok(true)
}

/// Trigger interests plus the activation log
pub struct Triggers {
    file_interests: Vec<FileInterest>,
    file_path: PathBuf,
    unincorp_path: PathBuf,
    no_act: bool,
}

impl Triggers {
    /// Load file trigger interests; a missing list means none
    pub fn load(config: &Config) -> Result<Self> {
        let path = config.trigger_file_path();
        let file_interests = match fs::read_to_string(&path) {
            Ok(text) => parse_file_interests(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} file trigger interests", file_interests.len());

        Ok(Self {
            file_interests,
            file_path: path,
            unincorp_path: config.unincorp_path(),
            no_act: config.no_act,
        })
    }

    pub fn file_interests(&self) -> &[FileInterest] {
        &self.file_interests
    }

    /// Replace the file trigger interests of `package` and rewrite the list
    pub fn set_file_interests(&mut self, package: &str, paths: &[String]) -> Result<()> {
        self.file_interests.retain(|i| i.package != package);
        for path in paths {
            self.file_interests.push(FileInterest {
                path: path.clone(),
                package: package.to_string(),
            });
        }
        self.file_interests
            .sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.package.cmp(&b.package)));
        if self.no_act {
            return Ok(());
        }

        let dir = parent_dir(&self.file_path);
        fs::create_dir_all(&dir)?;
        let mut file = NamedTempFile::new_in(&dir)?;
        for interest in &self.file_interests {
            writeln!(file, "{} {}", interest.path, interest.package)?;
        }
        file.persist(&self.file_path).map_err(|e| e.error)?;
        debug!("{} now has {} file trigger interests", package, paths.len());
        Ok(())
    }

    /// Record that `trigger` fired, optionally on behalf of `awaiter`
    pub fn activate(&mut self, trigger: &str, awaiter: Option<&str>) -> Result<()> {
        debug!("Activating trigger {} (awaiter {:?})", trigger, awaiter);
        if self.no_act {
            return Ok(());
        }

        if let Some(dir) = self.unincorp_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.unincorp_path)?;
        writeln!(log, "{} {}", trigger, awaiter.unwrap_or(NO_AWAITER))?;
        Ok(())
    }

    /// Fire every file trigger covering `path`
    pub fn activate_file(&mut self, path: &str, awaiter: &str) -> Result<()> {
        let mut fired: Vec<String> = self
            .file_interests
            .iter()
            .filter(|i| i.matches(path))
            .map(|i| i.path.clone())
            .collect();
        fired.dedup();

        for trigger in fired {
            self.activate(&trigger, Some(awaiter))?;
        }
        Ok(())
    }

    /// Packages interested in `trigger`
    fn interested(&self, store: &PackageStore, trigger: &str) -> Vec<PkgId> {
        let mut ids: Vec<PkgId> = self
            .file_interests
            .iter()
            .filter(|i| i.path == trigger)
            .filter_map(|i| store.find(&i.package))
            .collect();
        for (id, pkg) in store.iter() {
            if pkg.installed.trigger_interests.iter().any(|t| t == trigger) && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Fold the activation log into the package records and empty it
    pub fn incorporate(&mut self, store: &mut PackageStore) -> Result<()> {
        let text = match fs::read_to_string(&self.unincorp_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut touched: Vec<PkgId> = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let mut fields = line.split_whitespace();
            let (Some(trigger), awaiter) = (fields.next(), fields.next()) else {
                continue;
            };
            let awaiter = awaiter
                .filter(|a| *a != NO_AWAITER)
                .and_then(|a| store.find(a));

            for pend in self.interested(store, trigger) {
                let pkg = store.get_mut(pend);
                if pkg.status < Status::TriggersAwaited {
                    continue;
                }
                if !pkg.trig_pend.iter().any(|t| t == trigger) {
                    info!("Trigger {} pending for {}", trigger, pkg.name);
                    pkg.trig_pend.push(trigger.to_string());
                }
                let pend_name = pkg.name.clone();
                touched.push(pend);

                if let Some(aw) = awaiter.filter(|aw| *aw != pend) {
                    let awaiting = store.get_mut(aw);
                    if awaiting.status != Status::NotInstalled
                        && !awaiting.trig_aw.contains(&pend_name)
                    {
                        awaiting.trig_aw.push(pend_name);
                    }
                    touched.push(aw);
                }
            }
        }

        touched.sort();
        touched.dedup();
        for id in touched {
            settle_status(store, id)?;
            store.note(id)?;
        }

        if !text.is_empty() && !self.no_act {
            self.truncate_log()?;
        }

        fixup_awaiters(store)
    }

    /// Replace the log with an empty one
    fn truncate_log(&self) -> Result<()> {
        let dir = parent_dir(&self.unincorp_path);
        let empty = NamedTempFile::new_in(&dir)?;
        empty.persist(&self.unincorp_path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Re-derive who is still waiting for whom
///
/// Drops awaited packages with nothing pending; a `triggers-awaited`
/// package left waiting for nobody becomes `installed`. Each pending
/// package also learns who waits for it.
pub fn fixup_awaiters(store: &mut PackageStore) -> Result<()> {
    for id in store.ids() {
        store.get_mut(id).client().trig_awaiters.clear();
    }

    for id in store.ids() {
        if store.get(id).trig_aw.is_empty() {
            continue;
        }

        let awaited = store.get(id).trig_aw.clone();
        let still: Vec<String> = awaited
            .iter()
            .filter(|name| {
                store
                    .find(name)
                    .is_some_and(|p| !store.get(p).trig_pend.is_empty())
            })
            .cloned()
            .collect();

        let waiter = store.get(id).name.clone();
        for name in &still {
            if let Some(p) = store.find(name) {
                store.get_mut(p).client().trig_awaiters.push(waiter.clone());
            }
        }

        if still.len() != awaited.len() {
            store.get_mut(id).trig_aw = still;
            settle_status(store, id)?;
            store.note(id)?;
        }
    }
    Ok(())
}

/// Stop everyone waiting for `id`, whose triggers have just been processed
pub fn release_awaiters(store: &mut PackageStore, id: PkgId) -> Result<()> {
    let name = store.get(id).name.clone();
    let awaiters = store
        .get_mut(id)
        .client()
        .trig_awaiters
        .drain(..)
        .collect::<Vec<_>>();

    for waiter in awaiters {
        let Some(w) = store.find(&waiter) else {
            continue;
        };
        let pkg = store.get_mut(w);
        pkg.trig_aw.retain(|n| *n != name);
        settle_status(store, w)?;
        store.note(w)?;
    }
    Ok(())
}

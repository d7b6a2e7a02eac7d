// src/pkg/store.rs

//! The package record store
//!
//! Loads every package from the status database once, hands out stable
//! [`PkgId`] handles, and writes individual packages back with [`PackageStore::note`]
//! as soon as their state changes.

use super::relation::{self, Dependency};
use super::{Conffile, Package, Snapshot, validate_name};
use crate::db::{
    self,
    models::{ConffileEntry, PackageEntry, SnapshotEntry, SnapshotKind, TriggerEntry, TriggerListKind},
};
use crate::error::Result;
use crate::version::Version;
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

/// Stable handle to a package record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkgId(usize);

/// All package records plus the connection they persist through
pub struct PackageStore {
    conn: Connection,
    packages: Vec<Package>,
    index: HashMap<String, PkgId>,
    no_act: bool,
}

impl PackageStore {
    /// Open the status database at `db_path` and load every record
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = db::open(db_path)?;
        Self::load(conn)
    }

    /// A store backed by a throwaway in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::load(db::open_in_memory()?)
    }

    /// Load all records through an already migrated connection
    pub fn load(conn: Connection) -> Result<Self> {
        let mut store = Self {
            conn,
            packages: Vec::new(),
            index: HashMap::new(),
            no_act: false,
        };

        for entry in PackageEntry::list_all(&store.conn)? {
            let pkg = load_package(&store.conn, entry)?;
            let id = PkgId(store.packages.len());
            store.index.insert(pkg.name.clone(), id);
            store.packages.push(pkg);
        }

        debug!("Loaded {} package records", store.packages.len());
        Ok(store)
    }

    /// Keep all changes in memory only
    pub fn set_no_act(&mut self, no_act: bool) {
        self.no_act = no_act;
    }

    /// Look a package up by name, creating a blank record if it is new
    pub fn find_or_create(&mut self, name: &str) -> Result<PkgId> {
        let name = validate_name(name)?;
        if let Some(id) = self.index.get(&name) {
            return Ok(*id);
        }

        let id = PkgId(self.packages.len());
        self.packages.push(Package::new(&name));
        self.index.insert(name, id);
        Ok(id)
    }

    /// Look a package up by name without creating it
    pub fn find(&self, name: &str) -> Option<PkgId> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn get(&self, id: PkgId) -> &Package {
        &self.packages[id.0]
    }

    pub fn get_mut(&mut self, id: PkgId) -> &mut Package {
        &mut self.packages[id.0]
    }

    /// Handles of all packages, in creation order
    ///
    /// The returned list is detached from the store, so client data can be
    /// changed while walking it.
    pub fn ids(&self) -> Vec<PkgId> {
        (0..self.packages.len()).map(PkgId).collect()
    }

    /// Iterate over all records
    pub fn iter(&self) -> impl Iterator<Item = (PkgId, &Package)> {
        self.packages.iter().enumerate().map(|(i, p)| (PkgId(i), p))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Packages whose installed or available version provides `name`
    pub fn providers(&self, name: &str) -> Vec<PkgId> {
        self.iter()
            .filter(|(_, p)| {
                p.installed.provides.iter().any(|n| n == name)
                    || p.available.provides.iter().any(|n| n == name)
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Drop all per-run scheduling data
    pub fn clear_istobes(&mut self) {
        for pkg in &mut self.packages {
            pkg.clear_client();
        }
    }

    /// Write one package through to the database
    pub fn note(&mut self, id: PkgId) -> Result<()> {
        if self.no_act {
            return Ok(());
        }

        let pkg = &mut self.packages[id.0];
        debug!("Recording {} as {}", pkg.name, pkg.status);
        let row_id = db::transaction(&mut self.conn, |tx| write_package(tx, pkg))?;
        pkg.id = Some(row_id);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn load_package(conn: &Connection, entry: PackageEntry) -> Result<Package> {
    let mut pkg = Package::new(&entry.name);
    let id = entry.id.unwrap_or_default();

    pkg.id = entry.id;
    pkg.want = entry.want;
    pkg.eflag = entry.eflag;
    pkg.status = entry.status;
    pkg.config_version = entry
        .config_version
        .as_deref()
        .map(Version::parse)
        .transpose()?;
    pkg.installed = load_snapshot(conn, id, SnapshotKind::Installed)?;
    pkg.available = load_snapshot(conn, id, SnapshotKind::Available)?;
    pkg.installed.trigger_interests =
        TriggerEntry::find_by_package(conn, TriggerListKind::Interest, id)?;
    pkg.trig_pend = TriggerEntry::find_by_package(conn, TriggerListKind::Pending, id)?;
    pkg.trig_aw = TriggerEntry::find_by_package(conn, TriggerListKind::Awaited, id)?;

    Ok(pkg)
}

fn load_snapshot(conn: &Connection, package_id: i64, kind: SnapshotKind) -> Result<Snapshot> {
    let mut snap = Snapshot::default();

    if let Some(entry) = SnapshotEntry::find(conn, package_id, kind)? {
        let field = |s: &Option<String>| -> Result<Vec<Dependency>> {
            s.as_deref().map(relation::parse_field).unwrap_or(Ok(Vec::new()))
        };
        snap.version = match entry.version.as_deref() {
            Some(v) => Version::parse(v)?,
            None => Version::default(),
        };
        snap.architecture = entry.architecture.clone();
        snap.depends = field(&entry.depends)?;
        snap.pre_depends = field(&entry.pre_depends)?;
        snap.breaks = field(&entry.breaks)?;
        snap.provides = match entry.provides.as_deref() {
            Some(p) => relation::parse_provides(p)?,
            None => Vec::new(),
        };
    }

    snap.conffiles = ConffileEntry::find_by_package(conn, package_id, kind)?
        .into_iter()
        .map(|c| Conffile { path: c.path, hash: c.hash })
        .collect();

    Ok(snap)
}

/// Rewrite every row belonging to `pkg`
fn write_package(conn: &Connection, pkg: &Package) -> Result<i64> {
    let mut entry = PackageEntry::new(pkg.name.clone());
    entry.want = pkg.want;
    entry.eflag = pkg.eflag;
    entry.status = pkg.status;
    entry.config_version = pkg.config_version.as_ref().map(|v| v.to_string());
    let id = entry.upsert(conn)?;

    SnapshotEntry::delete_by_package(conn, id)?;
    ConffileEntry::delete_by_package(conn, id)?;
    for kind in [TriggerListKind::Interest, TriggerListKind::Pending, TriggerListKind::Awaited] {
        TriggerEntry::delete_by_package(conn, kind, id)?;
    }

    for (kind, snap) in [
        (SnapshotKind::Installed, &pkg.installed),
        (SnapshotKind::Available, &pkg.available),
    ] {
        if snap.is_empty() {
            continue;
        }
        let non_empty = |deps: &[Dependency]| {
            (!deps.is_empty()).then(|| relation::format_field(deps))
        };
        let mut row = SnapshotEntry::new(id, kind);
        row.version = snap
            .version
            .is_informative()
            .then(|| snap.version.to_string());
        row.architecture = snap.architecture.clone();
        row.depends = non_empty(&snap.depends);
        row.pre_depends = non_empty(&snap.pre_depends);
        row.breaks = non_empty(&snap.breaks);
        row.provides = (!snap.provides.is_empty()).then(|| snap.provides.join(", "));
        row.insert(conn)?;

        for (pos, cf) in snap.conffiles.iter().enumerate() {
            ConffileEntry::new(id, kind, pos as i64, cf.path.clone(), cf.hash.clone()).insert(conn)?;
        }
    }

    let lists = [
        (TriggerListKind::Interest, &pkg.installed.trigger_interests),
        (TriggerListKind::Pending, &pkg.trig_pend),
        (TriggerListKind::Awaited, &pkg.trig_aw),
    ];
    for (kind, names) in lists {
        for name in names {
            TriggerEntry::new(id, name.clone()).insert(conn, kind)?;
        }
    }

    Ok(id)
}

// src/db/models.rs

//! Data models for status database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading and deleting records.

use crate::error::Result;
use crate::pkg::{EFlag, Status, Want};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Map a text column through `FromStr`, reporting bad values as conversion failures
fn parse_column<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

/// Which of the two metadata snapshots a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Installed,
    Available,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &str {
        match self {
            SnapshotKind::Installed => "installed",
            SnapshotKind::Available => "available",
        }
    }
}

impl FromStr for SnapshotKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "installed" => Ok(SnapshotKind::Installed),
            "available" => Ok(SnapshotKind::Available),
            _ => Err(format!("Invalid snapshot kind: {}", s)),
        }
    }
}

/// Row of the `packages` table
#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub id: Option<i64>,
    pub name: String,
    pub want: Want,
    pub eflag: EFlag,
    pub status: Status,
    pub config_version: Option<String>,
    pub updated_at: Option<String>,
}

impl PackageEntry {
    pub fn new(name: String) -> Self {
        Self {
            id: None,
            name,
            want: Want::Unknown,
            eflag: EFlag::Ok,
            status: Status::NotInstalled,
            config_version: None,
            updated_at: None,
        }
    }

    /// Insert this package, or update the existing row with the same name
    pub fn upsert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, want, eflag, status, config_version)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                want = excluded.want,
                eflag = excluded.eflag,
                status = excluded.status,
                config_version = excluded.config_version,
                updated_at = CURRENT_TIMESTAMP",
            params![
                &self.name,
                self.want.as_str(),
                self.eflag.as_str(),
                self.status.as_str(),
                &self.config_version,
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM packages WHERE name = ?1",
            [&self.name],
            |row| row.get(0),
        )?;
        self.id = Some(id);
        Ok(id)
    }

    /// Find a package by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, want, eflag, status, config_version, updated_at
             FROM packages WHERE name = ?1",
        )?;

        let entry = stmt.query_row([name], Self::from_row).optional()?;

        Ok(entry)
    }

    /// List all packages
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, want, eflag, status, config_version, updated_at
             FROM packages ORDER BY name",
        )?;

        let entries = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Delete a package and, through the cascade, everything it owns
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            want: parse_column(row, 2)?,
            eflag: parse_column(row, 3)?,
            status: parse_column(row, 4)?,
            config_version: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

/// Row of the `snapshots` table; relation fields are kept in their text form
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub kind: SnapshotKind,
    pub version: Option<String>,
    pub architecture: Option<String>,
    pub depends: Option<String>,
    pub pre_depends: Option<String>,
    pub breaks: Option<String>,
    pub provides: Option<String>,
}

impl SnapshotEntry {
    pub fn new(package_id: i64, kind: SnapshotKind) -> Self {
        Self {
            id: None,
            package_id,
            kind,
            version: None,
            architecture: None,
            depends: None,
            pre_depends: None,
            breaks: None,
            provides: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO snapshots (package_id, kind, version, architecture, depends, pre_depends, breaks, provides)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.package_id,
                self.kind.as_str(),
                &self.version,
                &self.architecture,
                &self.depends,
                &self.pre_depends,
                &self.breaks,
                &self.provides,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find one snapshot of a package
    pub fn find(conn: &Connection, package_id: i64, kind: SnapshotKind) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, kind, version, architecture, depends, pre_depends, breaks, provides
             FROM snapshots WHERE package_id = ?1 AND kind = ?2",
        )?;

        let entry = stmt
            .query_row(params![package_id, kind.as_str()], Self::from_row)
            .optional()?;

        Ok(entry)
    }

    pub fn delete_by_package(conn: &Connection, package_id: i64) -> Result<()> {
        conn.execute("DELETE FROM snapshots WHERE package_id = ?1", [package_id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            kind: parse_column(row, 2)?,
            version: row.get(3)?,
            architecture: row.get(4)?,
            depends: row.get(5)?,
            pre_depends: row.get(6)?,
            breaks: row.get(7)?,
            provides: row.get(8)?,
        })
    }
}

/// Row of the `conffiles` table
#[derive(Debug, Clone)]
pub struct ConffileEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub kind: SnapshotKind,
    pub position: i64,
    pub path: String,
    pub hash: String,
}

impl ConffileEntry {
    pub fn new(package_id: i64, kind: SnapshotKind, position: i64, path: String, hash: String) -> Self {
        Self {
            id: None,
            package_id,
            kind,
            position,
            path,
            hash,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO conffiles (package_id, kind, position, path, hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.package_id,
                self.kind.as_str(),
                self.position,
                &self.path,
                &self.hash,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Conffiles of one snapshot, in declaration order
    pub fn find_by_package(conn: &Connection, package_id: i64, kind: SnapshotKind) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, kind, position, path, hash
             FROM conffiles WHERE package_id = ?1 AND kind = ?2 ORDER BY position",
        )?;

        let entries = stmt
            .query_map(params![package_id, kind.as_str()], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Every package recording `path` as a conffile
    pub fn find_by_path(conn: &Connection, path: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, kind, position, path, hash
             FROM conffiles WHERE path = ?1",
        )?;

        let entries = stmt
            .query_map([path], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    pub fn delete_by_package(conn: &Connection, package_id: i64) -> Result<()> {
        conn.execute("DELETE FROM conffiles WHERE package_id = ?1", [package_id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            kind: parse_column(row, 2)?,
            position: row.get(3)?,
            path: row.get(4)?,
            hash: row.get(5)?,
        })
    }
}

/// The three per-package trigger name lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerListKind {
    Interest,
    Pending,
    Awaited,
}

impl TriggerListKind {
    fn table(&self) -> &'static str {
        match self {
            TriggerListKind::Interest => "trigger_interests",
            TriggerListKind::Pending => "trigger_pending",
            TriggerListKind::Awaited => "trigger_awaited",
        }
    }
}

/// Row of one of the trigger list tables
#[derive(Debug, Clone)]
pub struct TriggerEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub name: String,
}

impl TriggerEntry {
    pub fn new(package_id: i64, name: String) -> Self {
        Self {
            id: None,
            package_id,
            name,
        }
    }

    pub fn insert(&mut self, conn: &Connection, kind: TriggerListKind) -> Result<i64> {
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (package_id, name) VALUES (?1, ?2)",
                kind.table()
            ),
            params![self.package_id, &self.name],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Names on one list of a package, in insertion order
    pub fn find_by_package(conn: &Connection, kind: TriggerListKind, package_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT name FROM {} WHERE package_id = ?1 ORDER BY id",
            kind.table()
        ))?;

        let names = stmt
            .query_map([package_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(names)
    }

    pub fn delete_by_package(conn: &Connection, kind: TriggerListKind, package_id: i64) -> Result<()> {
        conn.execute(
            &format!("DELETE FROM {} WHERE package_id = ?1", kind.table()),
            [package_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_package_upsert() {
        let (_temp, conn) = create_test_db();

        let mut entry = PackageEntry::new("foo".to_string());
        entry.status = Status::Unpacked;
        entry.want = Want::Install;
        let id = entry.upsert(&conn).unwrap();
        assert!(id > 0);

        // Same name updates in place
        entry.status = Status::Installed;
        entry.config_version = Some("1.0-1".to_string());
        let id2 = entry.upsert(&conn).unwrap();
        assert_eq!(id, id2);

        let found = PackageEntry::find_by_name(&conn, "foo").unwrap().unwrap();
        assert_eq!(found.status, Status::Installed);
        assert_eq!(found.want, Want::Install);
        assert_eq!(found.config_version.as_deref(), Some("1.0-1"));

        assert_eq!(PackageEntry::list_all(&conn).unwrap().len(), 1);
        PackageEntry::delete(&conn, id).unwrap();
        assert!(PackageEntry::find_by_name(&conn, "foo").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_and_conffiles() {
        let (_temp, conn) = create_test_db();

        let mut pkg = PackageEntry::new("foo".to_string());
        let pkg_id = pkg.upsert(&conn).unwrap();

        let mut snap = SnapshotEntry::new(pkg_id, SnapshotKind::Installed);
        snap.version = Some("1.0-1".to_string());
        snap.depends = Some("bar (>= 2)".to_string());
        snap.insert(&conn).unwrap();

        for (pos, path) in ["/etc/foo.conf", "/etc/foo/a.conf"].iter().enumerate() {
            let mut cf = ConffileEntry::new(
                pkg_id,
                SnapshotKind::Installed,
                pos as i64,
                path.to_string(),
                "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            );
            cf.insert(&conn).unwrap();
        }

        let found = SnapshotEntry::find(&conn, pkg_id, SnapshotKind::Installed)
            .unwrap()
            .unwrap();
        assert_eq!(found.version.as_deref(), Some("1.0-1"));
        assert!(SnapshotEntry::find(&conn, pkg_id, SnapshotKind::Available)
            .unwrap()
            .is_none());

        let cfs = ConffileEntry::find_by_package(&conn, pkg_id, SnapshotKind::Installed).unwrap();
        assert_eq!(cfs.len(), 2);
        assert_eq!(cfs[0].path, "/etc/foo.conf");
        assert_eq!(ConffileEntry::find_by_path(&conn, "/etc/foo/a.conf").unwrap().len(), 1);

        ConffileEntry::delete_by_package(&conn, pkg_id).unwrap();
        SnapshotEntry::delete_by_package(&conn, pkg_id).unwrap();
        assert!(ConffileEntry::find_by_package(&conn, pkg_id, SnapshotKind::Installed)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_trigger_lists() {
        let (_temp, conn) = create_test_db();

        let mut pkg = PackageEntry::new("man-db".to_string());
        let pkg_id = pkg.upsert(&conn).unwrap();

        TriggerEntry::new(pkg_id, "/usr/share/man".to_string())
            .insert(&conn, TriggerListKind::Interest)
            .unwrap();
        TriggerEntry::new(pkg_id, "/usr/share/man".to_string())
            .insert(&conn, TriggerListKind::Pending)
            .unwrap();
        // Duplicates are ignored
        TriggerEntry::new(pkg_id, "/usr/share/man".to_string())
            .insert(&conn, TriggerListKind::Pending)
            .unwrap();

        let pending = TriggerEntry::find_by_package(&conn, TriggerListKind::Pending, pkg_id).unwrap();
        assert_eq!(pending, vec!["/usr/share/man".to_string()]);
        assert!(TriggerEntry::find_by_package(&conn, TriggerListKind::Awaited, pkg_id)
            .unwrap()
            .is_empty());

        TriggerEntry::delete_by_package(&conn, TriggerListKind::Pending, pkg_id).unwrap();
        assert!(TriggerEntry::find_by_package(&conn, TriggerListKind::Pending, pkg_id)
            .unwrap()
            .is_empty());
        assert_eq!(
            TriggerEntry::find_by_package(&conn, TriggerListKind::Interest, pkg_id)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_cascade_delete() {
        let (_temp, conn) = create_test_db();

        let mut pkg = PackageEntry::new("foo".to_string());
        let pkg_id = pkg.upsert(&conn).unwrap();
        SnapshotEntry::new(pkg_id, SnapshotKind::Available)
            .insert(&conn)
            .unwrap();
        ConffileEntry::new(pkg_id, SnapshotKind::Available, 0, "/etc/x".to_string(), "h".to_string())
            .insert(&conn)
            .unwrap();

        PackageEntry::delete(&conn, pkg_id).unwrap();

        assert!(SnapshotEntry::find(&conn, pkg_id, SnapshotKind::Available)
            .unwrap()
            .is_none());
        assert!(ConffileEntry::find_by_path(&conn, "/etc/x").unwrap().is_empty());
    }
}

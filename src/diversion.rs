// src/diversion.rs

//! Read-only view of the diversions table
//!
//! `<admindir>/diversions` is a flat file of three-line records:
//!
//! ```text
//! /etc/foo.conf          contested path
//! /etc/foo.conf.distrib  where the diverted file goes instead
//! local-pkg              package owning the diversion, ":" for local
//! ```

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Owner marker for diversions not owned by any package
pub const LOCAL_OWNER: &str = ":";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diversion {
    pub contested: String,
    pub alternate: String,
    /// `None` for a local diversion
    pub package: Option<String>,
}

#[derive(Debug, Default)]
pub struct DiversionTable {
    entries: Vec<Diversion>,
    by_contested: HashMap<String, usize>,
}

impl DiversionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table; a missing file is an empty table
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(Error::Diversion(format!(
                    "failed to open diversions file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let table = Self::parse(&text)?;
        debug!("Loaded {} diversions from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut table = Self::new();
        let mut lines = text.lines();

        while let Some(contested) = lines.next() {
            let (Some(alternate), Some(owner)) = (lines.next(), lines.next()) else {
                return Err(Error::Diversion(format!(
                    "unexpected end of file in diversion of '{}'",
                    contested
                )));
            };
            let package = (owner != LOCAL_OWNER).then(|| owner.to_string());
            table.insert(Diversion {
                contested: contested.to_string(),
                alternate: alternate.to_string(),
                package,
            })?;
        }

        Ok(table)
    }

    /// Add a diversion, refusing to reuse either of its paths
    pub fn insert(&mut self, diversion: Diversion) -> Result<()> {
        for existing in &self.entries {
            if [&existing.contested, &existing.alternate].contains(&&diversion.contested)
                || [&existing.contested, &existing.alternate].contains(&&diversion.alternate)
            {
                return Err(Error::Diversion(format!(
                    "conflicting diversions involving '{}' or '{}'",
                    diversion.contested, diversion.alternate
                )));
            }
        }
        if diversion.contested == diversion.alternate {
            return Err(Error::Diversion(format!(
                "cannot divert '{}' to itself",
                diversion.contested
            )));
        }

        self.by_contested
            .insert(diversion.contested.clone(), self.entries.len());
        self.entries.push(diversion);
        Ok(())
    }

    pub fn get(&self, contested: &str) -> Option<&Diversion> {
        self.by_contested.get(contested).map(|&i| &self.entries[i])
    }

    /// Path that `package` should actually use for `path`
    ///
    /// A diversion applies to every package except the one owning it;
    /// local diversions apply to all packages.
    pub fn path_to_use<'a>(&'a self, path: &'a str, package: &str) -> &'a str {
        match self.get(path) {
            Some(d) if d.package.as_deref() != Some(package) => {
                debug!("{} is diverted to {} for {}", path, d.alternate, package);
                &d.alternate
            }
            _ => path,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// src/available.rs

//! Available-package information and registering unpacked packages
//!
//! Packages files and control files are RFC 822-like stanzas. Updating the
//! available information only touches the `available` snapshot of each
//! record; registering a control file also makes it the installed snapshot
//! and leaves the package unpacked, ready to be configured.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pkg::relation::{format_field, parse_field, parse_provides};
use crate::pkg::{
    Conffile, EFlag, NEW_CONFFILE_HASH, PackageStore, PkgId, Snapshot, Status, Want,
    validate_name,
};
use crate::trigger::Triggers;
use crate::version::Version;
use serde::Deserialize;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// One stanza of a Packages or control file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlStanza {
    pub package: String,
    pub version: String,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub depends: Option<String>,
    #[serde(rename = "Pre-Depends", default)]
    pub pre_depends: Option<String>,
    #[serde(default)]
    pub breaks: Option<String>,
    #[serde(default)]
    pub provides: Option<String>,
    /// One conffile path per line, optionally followed by a hash
    #[serde(default)]
    pub conffiles: Option<String>,
    /// Trigger interests; names starting with `/` are file triggers
    #[serde(default)]
    pub triggers: Option<String>,
}

impl ControlStanza {
    /// Metadata snapshot described by this stanza
    ///
    /// Conffiles come back with the never-resolved hash.
    pub fn to_snapshot(&self) -> Result<Snapshot> {
        let field = |value: &Option<String>| -> Result<_> {
            match value {
                Some(v) if !v.trim().is_empty() => parse_field(v),
                _ => Ok(Vec::new()),
            }
        };

        let conffiles = self
            .conffiles
            .as_deref()
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(|path| Conffile::new(path, NEW_CONFFILE_HASH))
            .collect();

        let provides = match self.provides.as_deref() {
            Some(v) if !v.trim().is_empty() => parse_provides(v)?,
            _ => Vec::new(),
        };

        Ok(Snapshot {
            version: Version::parse(&self.version)?,
            architecture: self.architecture.clone(),
            conffiles,
            depends: field(&self.depends)?,
            pre_depends: field(&self.pre_depends)?,
            breaks: field(&self.breaks)?,
            provides,
            trigger_interests: self.explicit_triggers(),
        })
    }

    fn trigger_names(&self) -> impl Iterator<Item = &str> {
        self.triggers.as_deref().unwrap_or_default().split_whitespace()
    }

    pub fn explicit_triggers(&self) -> Vec<String> {
        self.trigger_names()
            .filter(|t| !t.starts_with('/'))
            .map(String::from)
            .collect()
    }

    pub fn file_triggers(&self) -> Vec<String> {
        self.trigger_names()
            .filter(|t| t.starts_with('/'))
            .map(String::from)
            .collect()
    }
}

/// Parse every stanza in `text`
pub fn parse_stanzas(text: &str) -> Result<Vec<ControlStanza>> {
    rfc822_like::from_str(text)
        .map_err(|e| Error::ParseError(format!("package information: {}", e)))
}

/// How `update_available` treats what is already known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailableMode {
    /// Forget everything, then read the file
    Replace,
    /// Keep what is known, take newer versions from the file
    Merge,
    /// Forget everything
    Clear,
}

/// Update the available snapshots from a Packages file
///
/// Returns how many packages were updated.
pub fn update_available(
    store: &mut PackageStore,
    config: &Config,
    mode: AvailableMode,
    source: Option<&Path>,
) -> Result<usize> {
    let stanzas = match (mode, source) {
        (AvailableMode::Clear, _) => Vec::new(),
        (_, Some(path)) => parse_stanzas(&fs::read_to_string(path)?)?,
        (_, None) => {
            return Err(Error::ParseError(
                "a Packages file is needed to update available information".to_string(),
            ));
        }
    };

    if mode != AvailableMode::Merge {
        for id in store.ids() {
            if !store.get(id).available.is_empty() {
                store.get_mut(id).available = Snapshot::default();
                store.note(id)?;
            }
        }
    }

    let mut count = 0;
    for stanza in &stanzas {
        let name = validate_name(&stanza.package)?;
        let snapshot = stanza.to_snapshot()?;
        let id = store.find_or_create(&name)?;

        let current = &store.get(id).available.version;
        if current.is_informative() && snapshot.version.compare(current).is_lt() {
            debug!("{}: keeping available {} over older {}", name, current, snapshot.version);
            continue;
        }

        store.get_mut(id).available = snapshot;
        store.note(id)?;
        count += 1;
    }
    info!("Updated available information for {} packages", count);

    if !config.no_act {
        write_available_file(store, &config.available_path())?;
    }
    Ok(count)
}

/// Render one snapshot as a stanza
fn render_stanza(out: &mut String, name: &str, snapshot: &Snapshot) {
    let _ = writeln!(out, "Package: {}", name);
    let _ = writeln!(out, "Version: {}", snapshot.version);
    if let Some(arch) = &snapshot.architecture {
        let _ = writeln!(out, "Architecture: {}", arch);
    }
    for (field, deps) in [
        ("Pre-Depends", &snapshot.pre_depends),
        ("Depends", &snapshot.depends),
        ("Breaks", &snapshot.breaks),
    ] {
        if !deps.is_empty() {
            let _ = writeln!(out, "{}: {}", field, format_field(deps));
        }
    }
    if !snapshot.provides.is_empty() {
        let _ = writeln!(out, "Provides: {}", snapshot.provides.join(", "));
    }
    out.push('\n');
}

/// Rewrite the informational copy of the available information
fn write_available_file(store: &PackageStore, path: &Path) -> Result<()> {
    let mut text = String::new();
    let mut packages: Vec<_> = store
        .iter()
        .map(|(_, p)| p)
        .filter(|p| !p.available.is_empty())
        .collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));
    for pkg in packages {
        render_stanza(&mut text, &pkg.name, &pkg.available);
    }

    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Record a package as unpacked from its control stanza
///
/// Conffiles already known keep their recorded hash; new ones start out
/// as never resolved.
pub fn register(
    store: &mut PackageStore,
    triggers: &mut Triggers,
    stanza: &ControlStanza,
) -> Result<PkgId> {
    let name = validate_name(&stanza.package)?;
    let mut snapshot = stanza.to_snapshot()?;
    let id = store.find_or_create(&name)?;
    let pkg = store.get_mut(id);

    for conffile in &mut snapshot.conffiles {
        if let Some(known) = pkg.installed.find_conffile(&conffile.path) {
            conffile.hash = known.hash.clone();
        }
    }

    if !matches!(
        pkg.status,
        Status::NotInstalled | Status::HalfInstalled | Status::Unpacked
    ) {
        pkg.set_status(Status::HalfInstalled)?;
    }
    pkg.set_status(Status::Unpacked)?;
    pkg.want = Want::Install;
    pkg.eflag = EFlag::Ok;
    pkg.trig_pend.clear();
    pkg.trig_aw.clear();
    pkg.available = snapshot.clone();
    pkg.installed = snapshot;

    info!("Registered {} as unpacked", pkg.describe());
    store.note(id)?;

    triggers.set_file_interests(&name, &stanza.file_triggers())?;
    Ok(id)
}

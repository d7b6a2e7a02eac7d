// src/pkg/mod.rs

//! In-memory package records
//!
//! Every package name ever seen gets one [`Package`] holding its lifecycle
//! state and two metadata snapshots: what is installed, and what the
//! available database says is newest. Scheduling scratch data hangs off the
//! record as lazily created [`ClientData`].

pub mod relation;
pub mod store;

use crate::error::{Error, Result};
use crate::version::Version;
use relation::Dependency;
use std::fmt;
use std::str::FromStr;

pub use store::{PackageStore, PkgId};

/// Stored hash of a conffile that has never been resolved
pub const NEW_CONFFILE_HASH: &str = "newconffile";

/// Hash of a file that does not exist on disk
pub const NONEXISTENT_HASH: &str = "nonexistent";

/// Hash of a file that exists but could not be read
pub const EMPTY_HASH: &str = "-";

/// Lifecycle state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    NotInstalled,
    ConfigFiles,
    HalfInstalled,
    Unpacked,
    HalfConfigured,
    TriggersAwaited,
    TriggersPending,
    Installed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotInstalled => "not-installed",
            Status::ConfigFiles => "config-files",
            Status::HalfInstalled => "half-installed",
            Status::Unpacked => "unpacked",
            Status::HalfConfigured => "half-configured",
            Status::TriggersAwaited => "triggers-awaited",
            Status::TriggersPending => "triggers-pending",
            Status::Installed => "installed",
        }
    }

    /// Wording used in dependency problem reports
    pub fn description(&self) -> &'static str {
        match self {
            Status::NotInstalled => "not installed",
            Status::ConfigFiles => "only configuration files remain",
            Status::HalfInstalled => "half installed",
            Status::Unpacked => "unpacked but not configured",
            Status::HalfConfigured => "half configured",
            Status::TriggersAwaited => "awaiting trigger processing",
            Status::TriggersPending => "triggers pending",
            Status::Installed => "installed",
        }
    }

    /// Configured far enough to satisfy a dependency
    pub fn satisfies_depends(&self) -> bool {
        matches!(
            self,
            Status::Installed | Status::TriggersPending | Status::TriggersAwaited
        )
    }

    pub fn can_transition_to(&self, to: Status) -> bool {
        use Status::*;

        if *self == to {
            return true;
        }
        match self {
            NotInstalled => matches!(to, HalfInstalled | Unpacked),
            ConfigFiles => matches!(to, HalfInstalled | Unpacked | NotInstalled),
            HalfInstalled => matches!(to, Unpacked | NotInstalled | ConfigFiles),
            Unpacked => matches!(to, HalfConfigured | HalfInstalled),
            HalfConfigured => matches!(
                to,
                Installed | TriggersAwaited | TriggersPending | HalfInstalled
            ),
            TriggersAwaited => matches!(
                to,
                Installed | TriggersPending | HalfConfigured | HalfInstalled
            ),
            TriggersPending => matches!(
                to,
                Installed | TriggersAwaited | HalfConfigured | HalfInstalled
            ),
            Installed => matches!(
                to,
                TriggersPending | TriggersAwaited | HalfConfigured | HalfInstalled
            ),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not-installed" => Ok(Status::NotInstalled),
            "config-files" => Ok(Status::ConfigFiles),
            "half-installed" | "removal-failed" => Ok(Status::HalfInstalled),
            "unpacked" => Ok(Status::Unpacked),
            "half-configured" | "postinst-failed" => Ok(Status::HalfConfigured),
            "triggers-awaited" => Ok(Status::TriggersAwaited),
            "triggers-pending" => Ok(Status::TriggersPending),
            "installed" => Ok(Status::Installed),
            _ => Err(format!("Invalid package status: {}", s)),
        }
    }
}

/// Selection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Want {
    Unknown,
    Install,
    Hold,
    Deinstall,
    Purge,
}

impl Want {
    pub fn as_str(&self) -> &'static str {
        match self {
            Want::Unknown => "unknown",
            Want::Install => "install",
            Want::Hold => "hold",
            Want::Deinstall => "deinstall",
            Want::Purge => "purge",
        }
    }
}

impl FromStr for Want {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Want::Unknown),
            "install" => Ok(Want::Install),
            "hold" => Ok(Want::Hold),
            "deinstall" => Ok(Want::Deinstall),
            "purge" => Ok(Want::Purge),
            _ => Err(format!("Invalid want value: {}", s)),
        }
    }
}

/// Error flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EFlag {
    Ok,
    ReinstReq,
}

impl EFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EFlag::Ok => "ok",
            EFlag::ReinstReq => "reinstreq",
        }
    }
}

impl FromStr for EFlag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ok" => Ok(EFlag::Ok),
            "reinstreq" => Ok(EFlag::ReinstReq),
            _ => Err(format!("Invalid error flag: {}", s)),
        }
    }
}

/// What the current run intends to do with a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsToBe {
    #[default]
    Normal,
    InstallNew,
    Remove,
    Purge,
}

/// A tracked configuration file and the hash last recorded for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conffile {
    pub path: String,
    pub hash: String,
}

impl Conffile {
    pub fn new(path: &str, hash: &str) -> Self {
        Self {
            path: path.to_string(),
            hash: hash.to_string(),
        }
    }
}

/// Metadata of one version of a package
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub version: Version,
    pub architecture: Option<String>,
    pub conffiles: Vec<Conffile>,
    pub depends: Vec<Dependency>,
    pub pre_depends: Vec<Dependency>,
    pub breaks: Vec<Dependency>,
    pub provides: Vec<String>,
    pub trigger_interests: Vec<String>,
}

impl Snapshot {
    /// Nothing is known about this version
    pub fn is_empty(&self) -> bool {
        !self.version.is_informative()
            && self.architecture.is_none()
            && self.conffiles.is_empty()
            && self.depends.is_empty()
            && self.pre_depends.is_empty()
            && self.breaks.is_empty()
            && self.provides.is_empty()
    }

    pub fn find_conffile(&self, path: &str) -> Option<&Conffile> {
        self.conffiles.iter().find(|c| c.path == path)
    }
}

/// Per-run scheduling scratch data
#[derive(Debug, Clone, Default)]
pub struct ClientData {
    pub istobe: IsToBe,
    pub replacing_files_and_said: bool,
    /// Packages whose trigger processing is waiting for this one
    pub trig_awaiters: Vec<String>,
}

/// One package record
#[derive(Debug, Clone)]
pub struct Package {
    pub id: Option<i64>,
    pub name: String,
    pub want: Want,
    pub eflag: EFlag,
    pub status: Status,
    pub config_version: Option<Version>,
    pub installed: Snapshot,
    pub available: Snapshot,
    /// Triggers activated for this package and not yet processed
    pub trig_pend: Vec<String>,
    /// Packages with pending triggers this package waits for
    pub trig_aw: Vec<String>,
    client: Option<ClientData>,
}

impl Package {
    /// Create a blank record; the name must already be valid
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            want: Want::Unknown,
            eflag: EFlag::Ok,
            status: Status::NotInstalled,
            config_version: None,
            installed: Snapshot::default(),
            available: Snapshot::default(),
            trig_pend: Vec::new(),
            trig_aw: Vec::new(),
            client: None,
        }
    }

    /// Client data, created on first use
    pub fn client(&mut self) -> &mut ClientData {
        self.client.get_or_insert_with(ClientData::default)
    }

    pub fn client_ref(&self) -> Option<&ClientData> {
        self.client.as_ref()
    }

    pub fn istobe(&self) -> IsToBe {
        self.client.as_ref().map(|c| c.istobe).unwrap_or_default()
    }

    pub fn clear_client(&mut self) {
        self.client = None;
    }

    /// Change status, refusing moves the lifecycle does not allow
    pub fn set_status(&mut self, to: Status) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                package: self.name.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Name with the installed version, as used in progress lines
    pub fn describe(&self) -> String {
        format!("{} ({})", self.name, self.installed.version.describe())
    }
}

/// Check a package name and return its normalised (lowercase) form
pub fn validate_name(name: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| invalid("may not be empty string"))?;
    if !first.is_ascii_alphanumeric() {
        return Err(invalid("must start with an alphanumeric character"));
    }
    if let Some(bad) = chars.find(|c| !c.is_ascii_alphanumeric() && !"-+._".contains(*c)) {
        return Err(invalid(&format!(
            "character '{}' not allowed (only letters, digits and characters '-+._')",
            bad
        )));
    }

    Ok(name.to_ascii_lowercase())
}

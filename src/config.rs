// src/config.rs

//! Run configuration: directories, force options, output channels

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_ADMINDIR: &str = "/var/lib/settle";
pub const DEFAULT_INSTDIR: &str = "/";

/// Problems the operator asked to have overridden
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceOptions {
    /// Always install the new version of a conflicting conffile
    pub confnew: bool,
    /// Always keep the old version of a conflicting conffile
    pub confold: bool,
    /// Take the default answer at conffile prompts
    pub confdef: bool,
    /// Reinstall conffiles the user deleted
    pub confmiss: bool,
    /// Proceed despite unsatisfiable dependencies
    pub depends: bool,
    /// Ignore version restrictions on dependencies
    pub depends_version: bool,
    /// Configure packages not named on the command line when required
    pub configure_any: bool,
    /// Configure packages flagged as needing reinstallation
    pub remove_reinstreq: bool,
}

impl ForceOptions {
    /// Parse a comma separated list such as `confold,depends`
    pub fn parse_list(list: &str) -> Result<Self> {
        let mut force = Self::default();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            force.enable(item)?;
        }
        Ok(force)
    }

    pub fn enable(&mut self, name: &str) -> Result<()> {
        match name {
            "confnew" => self.confnew = true,
            "confold" => self.confold = true,
            "confdef" => self.confdef = true,
            "confmiss" => self.confmiss = true,
            "depends" => self.depends = true,
            "depends-version" => self.depends_version = true,
            "configure-any" => self.configure_any = true,
            "remove-reinstreq" => self.remove_reinstreq = true,
            // Conffile answers are choices, not overrides; "all" leaves them alone
            "all" => {
                self.confmiss = true;
                self.depends = true;
                self.depends_version = true;
                self.configure_any = true;
                self.remove_reinstreq = true;
            }
            other => {
                return Err(Error::ParseError(format!("unknown force option '{}'", other)));
            }
        }
        Ok(())
    }
}

impl FromStr for ForceOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_list(s)
    }
}

/// Everything a run needs to know about where and how to operate
#[derive(Debug, Clone)]
pub struct Config {
    pub admindir: PathBuf,
    pub instdir: PathBuf,
    pub force: ForceOptions,
    pub no_act: bool,
    pub status_fds: Vec<i32>,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_ADMINDIR, DEFAULT_INSTDIR)
    }
}

impl Config {
    pub fn new<A: AsRef<Path>, I: AsRef<Path>>(admindir: A, instdir: I) -> Self {
        Self {
            admindir: admindir.as_ref().to_path_buf(),
            instdir: instdir.as_ref().to_path_buf(),
            force: ForceOptions::default(),
            no_act: false,
            status_fds: Vec::new(),
            log_file: None,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.admindir.join("status.db")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.admindir.join("lock")
    }

    pub fn diversions_path(&self) -> PathBuf {
        self.admindir.join("diversions")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.admindir.join("info")
    }

    /// `<admindir>/info/<pkg>.<script>`
    pub fn script_path(&self, package: &str, script: &str) -> PathBuf {
        self.info_dir().join(format!("{}.{}", package, script))
    }

    pub fn triggers_dir(&self) -> PathBuf {
        self.admindir.join("triggers")
    }

    /// File trigger interests
    pub fn trigger_file_path(&self) -> PathBuf {
        self.triggers_dir().join("File")
    }

    /// Activations not yet incorporated into the status database
    pub fn unincorp_path(&self) -> PathBuf {
        self.triggers_dir().join("Unincorp")
    }

    pub fn available_path(&self) -> PathBuf {
        self.admindir.join("available")
    }

    /// The install root is the live filesystem root
    pub fn is_live_root(&self) -> bool {
        self.instdir == Path::new("/")
    }
}

// src/conffile/mod.rs

//! Conffile resolution
//!
//! On entry the package's new version of each conffile sits next to the
//! live file as `<path>.dpkg-new`. For each one we work out whether to keep
//! the live file, install the new one, or ask; then carry that out and
//! report the hash to record. A missing `.dpkg-new` means an earlier run
//! already dealt with the file.

pub mod decision;
pub mod deref;
pub mod hash;
pub mod prompt;

use crate::buffer::VarBuf;
use crate::config::Config;
use crate::diversion::DiversionTable;
use crate::error::{Error, Result, Severity};
use crate::pkg::{Conffile, NONEXISTENT_HASH, Package};
use crate::status::StatusReporter;
use crate::trigger::Triggers;
use decision::{Action, Decision};
use prompt::{PromptContext, Prompter};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// New version unpacked alongside the live file
pub const NEW_EXT: &str = ".dpkg-new";
/// Previous live file kept when the new one was installed
pub const OLD_EXT: &str = ".dpkg-old";
/// Distributed version kept when the live file was retained
pub const DIST_EXT: &str = ".dpkg-dist";

fn suffixed(path: &Path, ext: &str) -> PathBuf {
    let mut vb = VarBuf::with_capacity(path.as_os_str().len() + ext.len());
    vb.add_path(path);
    vb.add_str(ext);
    vb.as_path().to_path_buf()
}

/// Remove a file, warning about anything but it already being gone
fn remove_quietly(package: &str, path: &Path, what: &str) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        warn!("{}: failed to remove {} '{}': {}", package, what, path.display(), e);
    }
}

/// Everything resolving conffiles needs besides the package itself
pub struct ConffileResolver<'a> {
    pub config: &'a Config,
    pub diversions: &'a DiversionTable,
    pub prompter: &'a mut dyn Prompter,
    pub status: &'a mut StatusReporter,
    pub triggers: &'a mut Triggers,
}

impl ConffileResolver<'_> {
    /// Resolve one conffile of `package`
    ///
    /// Returns the hash to record, or `None` when nothing was done and the
    /// recorded hash must stay as it is.
    pub fn resolve(&mut self, package: &Package, conffile: &Conffile) -> Result<Option<String>> {
        let name = self
            .diversions
            .path_to_use(&conffile.path, &package.name)
            .to_string();

        let real_old = match deref::deref(&package.name, &self.config.instdir, &name) {
            Ok(path) => path,
            Err(e) if e.severity() == Severity::Advisory => {
                warn!("{}", e);
                eprintln!("settle: warning: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let real_new = suffixed(&real_old, NEW_EXT);

        if let Err(e) = fs::symlink_metadata(&real_new) {
            if e.kind() == ErrorKind::NotFound {
                debug!("{}: {} already processed", package.name, name);
                return Ok(None);
            }
            return Err(Error::ConffileDeref(format!(
                "unable to stat new distributed conffile '{}': {}",
                real_new.display(),
                e
            )));
        }

        let current = hash::file_hash(&package.name, &real_old);
        let new_hash = hash::file_hash(&package.name, &real_new);

        match fs::metadata(&real_old) {
            Ok(meta) => {
                if let Err(e) = fs::set_permissions(&real_new, meta.permissions()) {
                    warn!("{}: unable to copy permissions to '{}': {}", package.name, real_new.display(), e);
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "{}: unable to stat current installed conffile '{}': {}",
                package.name,
                real_old.display(),
                e
            ),
        }

        let force = self.config.force;
        if current != new_hash && current == NONEXISTENT_HASH && force.confmiss {
            eprintln!(
                "\nConfiguration file '{}', does not exist on system.\n\
                 Installing new config file as you requested.",
                name
            );
        }

        let decision = decision::decide(&conffile.hash, &current, &new_hash, force.confmiss);
        debug!(
            "{} (= '{}') user_edited={} dist_edited={} decision={:?}",
            name,
            real_old.display(),
            decision.user_edited,
            decision.dist_edited,
            decision
        );

        let ctx = PromptContext {
            name: &name,
            real_old: &real_old,
            real_new: &real_new,
        };
        let decision = prompt::prompt_action(&mut *self.prompter, self.status, &force, &ctx, decision)?;

        self.apply(package, &name, &real_old, &real_new, decision)?;
        Ok(Some(new_hash))
    }

    fn apply(
        &mut self,
        package: &Package,
        name: &str,
        real_old: &Path,
        real_new: &Path,
        decision: Decision,
    ) -> Result<()> {
        let pkg = package.name.as_str();

        match (decision.action, decision.backup) {
            (Action::Keep, true) => {
                remove_quietly(pkg, &suffixed(real_old, OLD_EXT), "old backup");
                self.triggers.activate_file(name, pkg)?;
                let dist = suffixed(real_old, DIST_EXT);
                if let Err(e) = fs::rename(real_new, &dist) {
                    warn!(
                        "{}: failed to rename '{}' to '{}': {}",
                        pkg,
                        real_new.display(),
                        dist.display(),
                        e
                    );
                }
                return Ok(());
            }
            (Action::Keep, false) => {
                if let Err(e) = fs::remove_file(real_new) {
                    warn!("{}: failed to remove '{}': {}", pkg, real_new.display(), e);
                }
                return Ok(());
            }
            (Action::Install, true) => {
                remove_quietly(pkg, &suffixed(real_old, DIST_EXT), "old distrib version");
                let backup = suffixed(real_old, OLD_EXT);
                remove_quietly(pkg, &backup, "backup (before overwrite)");
                if !decision.user_removed
                    && let Err(e) = fs::hard_link(real_old, &backup)
                {
                    warn!(
                        "{}: failed to link '{}' to '{}': {}",
                        pkg,
                        real_old.display(),
                        backup.display(),
                        e
                    );
                }
                println!("Installing new version of config file {} ...", name);
            }
            (Action::Install, false) => {
                println!("Installing new version of config file {} ...", name);
            }
            (Action::NewConffile, _) => {}
        }

        self.triggers.activate_file(name, pkg)?;
        fs::rename(real_new, real_old).map_err(|e| Error::ConffileInstall {
            from: real_new.display().to_string(),
            to: real_old.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::prompt::tests::ScriptedPrompter;
    use super::*;
    use crate::pkg::NEW_CONFFILE_HASH;
    use std::os::unix::fs::{MetadataExt, PermissionsExt, symlink};
    use tempfile::TempDir;

    struct Harness {
        _admin: TempDir,
        root: TempDir,
        config: Config,
        diversions: DiversionTable,
        status: StatusReporter,
        triggers: Triggers,
        prompter: ScriptedPrompter,
    }

    impl Harness {
        fn new(file_triggers: &str) -> Self {
            let admin = TempDir::new().unwrap();
            let root = TempDir::new().unwrap();
            fs::create_dir_all(root.path().join("etc")).unwrap();
            let config = Config::new(admin.path(), root.path());
            fs::create_dir_all(config.triggers_dir()).unwrap();
            fs::write(config.trigger_file_path(), file_triggers).unwrap();
            let triggers = Triggers::load(&config).unwrap();
            Self {
                _admin: admin,
                root,
                config,
                diversions: DiversionTable::new(),
                status: StatusReporter::new(),
                triggers,
                prompter: ScriptedPrompter::default(),
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel.trim_start_matches('/'))
        }

        fn write(&self, rel: &str, content: &str) {
            fs::write(self.path(rel), content).unwrap();
        }

        fn hash_of(&self, rel: &str) -> String {
            hash::file_hash("test", &self.path(rel))
        }

        fn resolve(&mut self, stored: &str) -> Result<Option<String>> {
            let pkg = Package::new("foo");
            let conffile = Conffile::new("/etc/foo.conf", stored);
            let mut resolver = ConffileResolver {
                config: &self.config,
                diversions: &self.diversions,
                prompter: &mut self.prompter,
                status: &mut self.status,
                triggers: &mut self.triggers,
            };
            resolver.resolve(&pkg, &conffile)
        }
    }

    #[test]
    fn test_identical_is_noop() {
        let mut h = Harness::new("");
        h.write("/etc/foo.conf", "same\n");
        h.write("/etc/foo.conf.dpkg-new", "same\n");
        let stored = h.hash_of("/etc/foo.conf");

        let recorded = h.resolve(&stored).unwrap();
        assert_eq!(recorded.as_deref(), Some(stored.as_str()));
        assert!(!h.path("/etc/foo.conf.dpkg-new").exists());
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf")).unwrap(), "same\n");
        assert!(h.prompter.shown.is_empty());
    }

    #[test]
    fn test_untouched_file_upgraded_silently() {
        let mut h = Harness::new("");
        h.write("/etc/foo.conf", "v1\n");
        h.write("/etc/foo.conf.dpkg-new", "v2\n");
        fs::set_permissions(h.path("/etc/foo.conf"), fs::Permissions::from_mode(0o600)).unwrap();
        let stored = h.hash_of("/etc/foo.conf");
        let new_hash = h.hash_of("/etc/foo.conf.dpkg-new");

        let recorded = h.resolve(&stored).unwrap();
        assert_eq!(recorded, Some(new_hash));
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf")).unwrap(), "v2\n");
        assert!(!h.path("/etc/foo.conf.dpkg-old").exists());
        assert!(h.prompter.shown.is_empty());

        // Permissions carried over from the old file
        let mode = fs::metadata(h.path("/etc/foo.conf")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_conflict_install_keeps_backup_and_fires_trigger() {
        let mut h = Harness::new("/etc/foo.conf watcher\n");
        h.write("/etc/foo.conf", "original\n");
        let stored = h.hash_of("/etc/foo.conf");
        h.write("/etc/foo.conf", "edited by user\n");
        h.write("/etc/foo.conf.dpkg-new", "shipped v2\n");
        let new_hash = h.hash_of("/etc/foo.conf.dpkg-new");
        let inode_before = fs::metadata(h.path("/etc/foo.conf")).unwrap().ino();

        h.prompter = ScriptedPrompter::with_answers(&["i"]);
        let recorded = h.resolve(&stored).unwrap();

        assert_eq!(recorded, Some(new_hash));
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf")).unwrap(), "shipped v2\n");
        let backup = h.path("/etc/foo.conf.dpkg-old");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "edited by user\n");
        // Hard link of the old live file, not a copy
        assert_eq!(fs::metadata(&backup).unwrap().ino(), inode_before);
        assert!(!h.path("/etc/foo.conf.dpkg-new").exists());

        let log = fs::read_to_string(h.config.unincorp_path()).unwrap();
        assert_eq!(log, "/etc/foo.conf foo\n");
    }

    #[test]
    fn test_conflict_keep_saves_dist() {
        let mut h = Harness::new("");
        h.write("/etc/foo.conf", "original\n");
        let stored = h.hash_of("/etc/foo.conf");
        h.write("/etc/foo.conf", "edited\n");
        h.write("/etc/foo.conf.dpkg-new", "shipped\n");
        h.write("/etc/foo.conf.dpkg-old", "stale\n");

        h.prompter = ScriptedPrompter::with_answers(&["n"]);
        h.resolve(&stored).unwrap();

        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf")).unwrap(), "edited\n");
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf.dpkg-dist")).unwrap(), "shipped\n");
        assert!(!h.path("/etc/foo.conf.dpkg-old").exists());
    }

    #[test]
    fn test_circular_link_untouched() {
        let mut h = Harness::new("");
        symlink("foo.conf", h.path("/etc/foo.conf")).unwrap();
        h.write("/etc/foo.conf.dpkg-new", "new\n");

        let recorded = h.resolve("0123456789abcdef0123456789abcdef").unwrap();
        assert!(recorded.is_none());
        assert!(fs::symlink_metadata(h.path("/etc/foo.conf")).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf.dpkg-new")).unwrap(), "new\n");
    }

    #[test]
    fn test_link_out_of_root_untouched() {
        let mut h = Harness::new("");
        h.config.instdir = h.path("/jail");
        fs::create_dir_all(h.path("/jail/etc")).unwrap();
        symlink("../../outside.conf", h.path("/jail/etc/foo.conf")).unwrap();
        h.write("/outside.conf", "host file\n");
        h.write("/outside.conf.dpkg-new", "replacement\n");
        let stored = h.hash_of("/outside.conf");

        let recorded = h.resolve(&stored).unwrap();
        assert!(recorded.is_none());
        assert_eq!(fs::read_to_string(h.path("/outside.conf")).unwrap(), "host file\n");
        assert_eq!(
            fs::read_to_string(h.path("/outside.conf.dpkg-new")).unwrap(),
            "replacement\n"
        );
    }

    #[test]
    fn test_rerun_without_candidate_does_nothing() {
        let mut h = Harness::new("");
        h.write("/etc/foo.conf", "whatever\n");
        let recorded = h.resolve("0123456789abcdef0123456789abcdef").unwrap();
        assert!(recorded.is_none());
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf")).unwrap(), "whatever\n");
    }

    #[test]
    fn test_new_conffile_placed() {
        let mut h = Harness::new("");
        h.write("/etc/foo.conf.dpkg-new", "fresh\n");
        let recorded = h.resolve(NEW_CONFFILE_HASH).unwrap();
        assert_eq!(recorded, Some(h.hash_of("/etc/foo.conf")));
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf")).unwrap(), "fresh\n");
    }

    #[test]
    fn test_diverted_conffile() {
        let mut h = Harness::new("");
        h.diversions = DiversionTable::parse("/etc/foo.conf\n/etc/foo.conf.orig\n:\n").unwrap();
        h.write("/etc/foo.conf", "local admin file\n");
        h.write("/etc/foo.conf.orig.dpkg-new", "packaged\n");

        h.resolve(NEW_CONFFILE_HASH).unwrap();
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf.orig")).unwrap(), "packaged\n");
        assert_eq!(fs::read_to_string(h.path("/etc/foo.conf")).unwrap(), "local admin file\n");
    }
}

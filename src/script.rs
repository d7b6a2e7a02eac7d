// src/script.rs

//! Maintainer script execution
//!
//! Everything that forks goes through [`ProcessRunner`]: maintainer scripts,
//! and the pager and shell offered at the conffile prompt. [`SystemRunner`]
//! is the real implementation; tests substitute a recorder.
//!
//! Scripts live in `<admindir>/info/<package>.<script>` and are called as
//! `<script> <action> <old-version-or-empty> [extra...]` with
//! `DPKG_MAINTSCRIPT_PACKAGE`, `DPKG_MAINTSCRIPT_ARCH` and
//! `DPKG_RUNNING_VERSION` set. For a non-live install root the child
//! chroots first and sees the script path relative to that root.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pkg::Package;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    Exited(i32),
    Signaled(i32),
}

impl ExitClass {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(0), _) => ExitClass::Success,
            (Some(code), _) => ExitClass::Exited(code),
            (None, Some(sig)) => ExitClass::Signaled(sig),
            (None, None) => ExitClass::Exited(-1),
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ExitClass::Success
    }

    /// Tail of a "subprocess X ..." diagnostic
    pub fn describe(&self) -> String {
        match self {
            ExitClass::Success => "exited normally".to_string(),
            ExitClass::Exited(code) => format!("returned error exit status {}", code),
            ExitClass::Signaled(sig) => {
                let name = nix::sys::signal::Signal::try_from(*sig)
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|_| sig.to_string());
                format!("was killed by signal ({})", name)
            }
        }
    }
}

/// One external command to run to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// chroot here before exec
    pub root: Option<PathBuf>,
}

impl Invocation {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Runs a command and reports how it ended
pub trait ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<ExitClass>;
}

/// Fork and exec for real, waiting for the child
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<ExitClass> {
        debug!(
            "Running {} {:?}",
            invocation.program.display(),
            invocation.args
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        if let Some(root) = invocation.root.clone() {
            // SAFETY: only async-signal-safe syscalls run between fork and exec
            unsafe {
                cmd.pre_exec(move || {
                    nix::unistd::chroot(&root).map_err(io::Error::from)?;
                    nix::unistd::chdir("/").map_err(io::Error::from)?;
                    Ok(())
                });
            }
        }

        // std retries the wait on EINTR
        let status = cmd.status().map_err(|e| {
            Error::ScriptSpawn(format!("{}: {}", invocation.program.display(), e))
        })?;

        Ok(ExitClass::from_status(status))
    }
}

/// What a script failure means for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Fatal,
    /// Log and carry on; for cleanup phases such as a postrm during purge,
    /// where the package state has already been committed
    Warn,
}

/// Human name of a maintainer script, as used in diagnostics
pub fn script_description(script: &str) -> String {
    match script {
        "postinst" => "installed post-installation script".to_string(),
        "prerm" => "installed pre-removal script".to_string(),
        "postrm" => "installed post-removal script".to_string(),
        "preinst" => "new pre-installation script".to_string(),
        other => format!("{} script", other),
    }
}

/// Locates and runs a package's maintainer scripts
pub struct MaintainerScripts<'a> {
    config: &'a Config,
}

impl<'a> MaintainerScripts<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Build the invocation for `<pkg>.<script> <action> <old_version> [extra...]`
    ///
    /// Returns `None` when the package ships no such script.
    pub fn prepare(
        &self,
        package: &Package,
        script: &str,
        action: &str,
        old_version: &str,
        extra: &[String],
    ) -> Result<Option<Invocation>> {
        let path = self.config.script_path(&package.name, script);

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} has no {}", package.name, script);
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::ScriptSpawn(format!(
                    "{}: unable to stat: {}",
                    path.display(),
                    e
                )));
            }
        };

        if meta.permissions().mode() & 0o555 != 0o555 {
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).map_err(|e| {
                Error::ScriptSpawn(format!("{}: unable to set execute permissions: {}", path.display(), e))
            })?;
        }

        let (program, root) = if self.config.is_live_root() {
            (path, None)
        } else {
            (
                relative_to_root(&path, &self.config.instdir),
                Some(self.config.instdir.clone()),
            )
        };

        let mut inv = Invocation::new(program)
            .arg(action)
            .arg(old_version)
            .env("DPKG_MAINTSCRIPT_PACKAGE", package.name.as_str())
            .env(
                "DPKG_MAINTSCRIPT_ARCH",
                package.installed.architecture.clone().unwrap_or_default(),
            )
            .env("DPKG_RUNNING_VERSION", env!("CARGO_PKG_VERSION"));
        inv.args.extend(extra.iter().cloned());
        inv.root = root;

        Ok(Some(inv))
    }

    /// Run a maintainer script if the package has it
    ///
    /// Returns whether the script was run. A failing script is an error under
    /// [`FailurePolicy::Fatal`] and a warning under [`FailurePolicy::Warn`].
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        runner: &mut dyn ProcessRunner,
        package: &Package,
        script: &str,
        action: &str,
        old_version: &str,
        extra: &[String],
        policy: FailurePolicy,
    ) -> Result<bool> {
        let Some(inv) = self.prepare(package, script, action, old_version, extra)? else {
            return Ok(false);
        };

        info!("Running {} {} {}", package.name, script, action);
        let exit = runner.run(&inv)?;
        if exit.is_success() {
            return Ok(true);
        }

        let err = Error::ScriptFailed {
            script: script_description(script),
            status: exit.describe(),
        };
        match policy {
            FailurePolicy::Fatal => Err(err),
            FailurePolicy::Warn => {
                warn!("{}: {}", package.name, err);
                Ok(true)
            }
        }
    }
}

/// `root/var/lib/x` seen from inside `root` is `/var/lib/x`
fn relative_to_root(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rest) => Path::new("/").join(rest),
        Err(_) => {
            warn!(
                "{} is outside the install root {}",
                path.display(),
                root.display()
            );
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Records invocations and answers with a fixed exit
    struct Recorder {
        calls: Vec<Invocation>,
        exit: ExitClass,
    }

    impl ProcessRunner for Recorder {
        fn run(&mut self, invocation: &Invocation) -> Result<ExitClass> {
            self.calls.push(invocation.clone());
            Ok(self.exit)
        }
    }

    fn setup(instdir: &Path, admindir: &Path) -> (Config, Package) {
        let config = Config::new(admindir, instdir);
        fs::create_dir_all(config.info_dir()).unwrap();
        let mut pkg = Package::new("foo");
        pkg.installed.architecture = Some("amd64".to_string());
        (config, pkg)
    }

    #[test]
    fn test_missing_script_is_not_run() {
        let dir = TempDir::new().unwrap();
        let (config, pkg) = setup(Path::new("/"), dir.path());
        let mut runner = Recorder { calls: Vec::new(), exit: ExitClass::Success };

        let ran = MaintainerScripts::new(&config)
            .run(&mut runner, &pkg, "postinst", "configure", "", &[], FailurePolicy::Fatal)
            .unwrap();
        assert!(!ran);
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn test_invocation_contract() {
        let dir = TempDir::new().unwrap();
        let (config, pkg) = setup(Path::new("/"), dir.path());
        let script = config.script_path("foo", "postinst");
        fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();

        let mut runner = Recorder { calls: Vec::new(), exit: ExitClass::Success };
        let ran = MaintainerScripts::new(&config)
            .run(&mut runner, &pkg, "postinst", "configure", "1.0-1", &[], FailurePolicy::Fatal)
            .unwrap();
        assert!(ran);

        let inv = &runner.calls[0];
        assert_eq!(inv.program, script);
        assert_eq!(inv.args, vec!["configure".to_string(), "1.0-1".to_string()]);
        assert!(inv.env.contains(&("DPKG_MAINTSCRIPT_PACKAGE".to_string(), "foo".to_string())));
        assert!(inv.env.contains(&("DPKG_MAINTSCRIPT_ARCH".to_string(), "amd64".to_string())));
        assert!(inv.env.iter().any(|(k, _)| k == "DPKG_RUNNING_VERSION"));
        assert!(inv.root.is_none());

        // Made executable before running
        let mode = fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_chroot_relative_path() {
        let root = TempDir::new().unwrap();
        let admindir = root.path().join("var/lib/settle");
        let (config, pkg) = setup(root.path(), &admindir);
        fs::write(config.script_path("foo", "postinst"), "#!/bin/sh\n").unwrap();

        let inv = MaintainerScripts::new(&config)
            .prepare(&pkg, "postinst", "configure", "", &["extra".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(inv.program, PathBuf::from("/var/lib/settle/info/foo.postinst"));
        assert_eq!(inv.root.as_deref(), Some(root.path()));
        assert_eq!(inv.args, vec!["configure", "", "extra"]);
    }

    #[test]
    fn test_failure_policy() {
        let dir = TempDir::new().unwrap();
        let (config, pkg) = setup(Path::new("/"), dir.path());
        fs::write(config.script_path("foo", "postinst"), "#!/bin/sh\nexit 3\n").unwrap();
        let scripts = MaintainerScripts::new(&config);

        let mut runner = Recorder { calls: Vec::new(), exit: ExitClass::Exited(3) };
        let err = scripts
            .run(&mut runner, &pkg, "postinst", "configure", "", &[], FailurePolicy::Fatal)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "subprocess installed post-installation script returned error exit status 3"
        );

        let mut runner = Recorder { calls: Vec::new(), exit: ExitClass::Signaled(9) };
        assert!(scripts
            .run(&mut runner, &pkg, "postinst", "configure", "", &[], FailurePolicy::Warn)
            .unwrap());
    }

    #[test]
    fn test_system_runner_classifies_exit() {
        let mut runner = SystemRunner;
        let ok = runner.run(&Invocation::new("sh").arg("-c").arg("exit 0")).unwrap();
        assert_eq!(ok, ExitClass::Success);

        let failed = runner.run(&Invocation::new("sh").arg("-c").arg("exit 7")).unwrap();
        assert_eq!(failed, ExitClass::Exited(7));

        let killed = runner
            .run(&Invocation::new("sh").arg("-c").arg("kill -TERM $$"))
            .unwrap();
        assert_eq!(killed, ExitClass::Signaled(15));
        assert_eq!(killed.describe(), "was killed by signal (SIGTERM)");

        assert!(runner.run(&Invocation::new("/nonexistent/program")).is_err());
    }
}

// src/main.rs

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use settle::available::{self, AvailableMode};
use settle::conffile::prompt::TerminalPrompter;
use settle::config::{Config, DEFAULT_ADMINDIR, DEFAULT_INSTDIR, ForceOptions};
use settle::diversion::DiversionTable;
use settle::lock::AdminLock;
use settle::pkg::{EFlag, Package, PackageStore, Status, Want};
use settle::scheduler::depends::StoreChecker;
use settle::scheduler::{QueueAction, RunContext, Scheduler};
use settle::script::SystemRunner;
use settle::status::StatusReporter;
use settle::trigger::Triggers;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "settle")]
#[command(author, version, about = "Package status database and configuration engine", long_about = None)]
struct Cli {
    /// Administrative directory holding the status database
    #[arg(long, global = true, env = "SETTLE_ADMINDIR", default_value = DEFAULT_ADMINDIR)]
    admindir: PathBuf,

    /// Root of the filesystem packages are installed into
    #[arg(long, global = true, env = "SETTLE_INSTDIR", default_value = DEFAULT_INSTDIR)]
    instdir: PathBuf,

    /// Override problems (comma separated: confnew, confold, confdef,
    /// confmiss, depends, depends-version, configure-any, remove-reinstreq, all)
    #[arg(long, global = true, value_name = "THINGS")]
    force: Vec<String>,

    /// Say what would be done without changing anything
    #[arg(long, global = true)]
    no_act: bool,

    /// Send machine-readable status lines to this file descriptor
    #[arg(long = "status-fd", global = true, value_name = "FD")]
    status_fd: Vec<i32>,

    /// Append actions and status changes to this log file
    #[arg(long, global = true, value_name = "FILE")]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the status database and administrative directories
    Init,
    /// Configure unpacked packages
    Configure {
        /// Packages to configure
        packages: Vec<String>,
        /// Configure every package that is unpacked or has pending triggers
        #[arg(short = 'a', long)]
        pending: bool,
    },
    /// Process pending triggers only
    TriggersOnly {
        /// Packages whose triggers to process
        packages: Vec<String>,
        /// Process every package with pending triggers
        #[arg(short = 'a', long)]
        pending: bool,
    },
    /// Replace available package information with a Packages file
    UpdateAvail {
        /// Packages file
        packages_file: PathBuf,
    },
    /// Merge newer package information from a Packages file
    MergeAvail {
        /// Packages file
        packages_file: PathBuf,
    },
    /// Forget all available package information
    ClearAvail,
    /// Record a package as unpacked from its control file
    Register {
        /// Control file of the unpacked package
        control_file: PathBuf,
    },
    /// List packages
    List {
        /// Only packages whose name contains this
        pattern: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Report packages that are not fully installed
    Audit,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: clap_complete::Shell,
    },
}

/// One row of `list --json`
#[derive(Serialize)]
struct PackageSummary<'a> {
    name: &'a str,
    want: &'a str,
    status: &'a str,
    eflag: &'a str,
    version: String,
    config_version: Option<String>,
    available: Option<String>,
    triggers_pending: &'a [String],
    triggers_awaited: &'a [String],
}

impl<'a> From<&'a Package> for PackageSummary<'a> {
    fn from(pkg: &'a Package) -> Self {
        let informative = |v: &settle::version::Version| v.is_informative().then(|| v.to_string());
        Self {
            name: &pkg.name,
            want: pkg.want.as_str(),
            status: pkg.status.as_str(),
            eflag: pkg.eflag.as_str(),
            version: pkg.installed.version.describe(),
            config_version: pkg.config_version.as_ref().and_then(informative),
            available: informative(&pkg.available.version),
            triggers_pending: &pkg.trig_pend,
            triggers_awaited: &pkg.trig_aw,
        }
    }
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::new(&self.admindir, &self.instdir);
        let mut force = ForceOptions::default();
        for list in &self.force {
            for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                force.enable(item)?;
            }
        }
        config.force = force;
        config.no_act = self.no_act;
        config.status_fds = self.status_fd.clone();
        config.log_file = self.log.clone();
        Ok(config)
    }
}

/// Take the administrative lock unless nothing is going to be written
fn lock(config: &Config) -> Result<Option<AdminLock>> {
    if config.no_act {
        return Ok(None);
    }
    Ok(Some(AdminLock::acquire(config.lock_path())?))
}

fn open_store(config: &Config) -> Result<PackageStore> {
    let db_path = config.db_path();
    let mut store = PackageStore::open(&db_path.to_string_lossy()).with_context(|| {
        format!(
            "cannot open status database in {} (run 'settle init' first?)",
            config.admindir.display()
        )
    })?;
    store.set_no_act(config.no_act);
    Ok(store)
}

/// Run the configuration queue; false when some package failed
fn run_queue(config: &Config, action: QueueAction, packages: &[String], pending: bool) -> Result<bool> {
    if pending && !packages.is_empty() {
        bail!("{} --pending does not take any package names", action.option());
    }
    if !pending && packages.is_empty() {
        bail!("{} needs at least one package name argument", action.option());
    }

    let _lock = lock(config)?;
    let mut store = open_store(config)?;
    let diversions = DiversionTable::load(&config.diversions_path())?;
    let mut triggers = Triggers::load(config)?;
    let mut status = StatusReporter::open(config)?;
    let mut prompter = TerminalPrompter::new(SystemRunner);
    let mut runner = SystemRunner;
    let checker = StoreChecker::new(config.force);

    let mut run = RunContext::new();
    let mut unknown = Vec::new();
    for name in packages {
        match store.find(name) {
            Some(id) => run.enqueue(&mut store, id),
            None => unknown.push(name.as_str()),
        }
    }

    let mut scheduler = Scheduler {
        config,
        store: &mut store,
        diversions: &diversions,
        triggers: &mut triggers,
        status: &mut status,
        prompter: &mut prompter,
        runner: &mut runner,
        checker: &checker,
    };
    for name in unknown {
        scheduler.reject_unknown(&mut run, name, action);
    }
    if pending {
        scheduler.enqueue_pending(&mut run, action);
    }
    info!("{} packages queued", run.queue.len());
    scheduler.process_queue(&mut run, action)?;

    match run.summary() {
        Some(summary) => {
            eprint!("{}", summary);
            Ok(false)
        }
        None => Ok(true),
    }
}

fn update_avail(config: &Config, mode: AvailableMode, source: Option<PathBuf>) -> Result<()> {
    let _lock = lock(config)?;
    let mut store = open_store(config)?;

    match (mode, &source) {
        (AvailableMode::Replace, Some(path)) => {
            println!("Replacing available packages info, using {}.", path.display())
        }
        (AvailableMode::Merge, Some(path)) => {
            println!("Updating available packages info, using {}.", path.display())
        }
        _ => {}
    }

    let count = available::update_available(&mut store, config, mode, source.as_deref())
        .with_context(|| match &source {
            Some(path) => format!("reading {}", path.display()),
            None => "clearing available information".to_string(),
        })?;
    if mode != AvailableMode::Clear {
        println!("Information about {} package(s) was updated.", count);
    }
    Ok(())
}

fn register(config: &Config, control_file: PathBuf) -> Result<()> {
    let text = fs::read_to_string(&control_file)
        .with_context(|| format!("reading {}", control_file.display()))?;
    let stanzas = available::parse_stanzas(&text)?;
    let [stanza] = stanzas.as_slice() else {
        bail!(
            "{} must contain exactly one package stanza, found {}",
            control_file.display(),
            stanzas.len()
        );
    };

    let _lock = lock(config)?;
    let mut store = open_store(config)?;
    let mut triggers = Triggers::load(config)?;
    let id = available::register(&mut store, &mut triggers, stanza)?;
    println!("Registered {} as unpacked.", store.get(id).describe());
    Ok(())
}

/// Three-letter `want status eflag` abbreviation
fn abbreviation(pkg: &Package) -> String {
    let want = match pkg.want {
        Want::Unknown => 'u',
        Want::Install => 'i',
        Want::Hold => 'h',
        Want::Deinstall => 'r',
        Want::Purge => 'p',
    };
    let status = match pkg.status {
        Status::NotInstalled => 'n',
        Status::ConfigFiles => 'c',
        Status::HalfInstalled => 'H',
        Status::Unpacked => 'U',
        Status::HalfConfigured => 'F',
        Status::TriggersAwaited => 'W',
        Status::TriggersPending => 't',
        Status::Installed => 'i',
    };
    let eflag = match pkg.eflag {
        EFlag::Ok => ' ',
        EFlag::ReinstReq => 'R',
    };
    format!("{}{}{}", want, status, eflag)
}

fn list(config: &Config, pattern: Option<String>, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let mut packages: Vec<&Package> = store
        .iter()
        .map(|(_, p)| p)
        .filter(|p| pattern.as_deref().is_none_or(|pat| p.name.contains(pat)))
        .filter(|p| pattern.is_some() || p.status != Status::NotInstalled)
        .collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    if json {
        let rows: Vec<PackageSummary> = packages.iter().map(|p| PackageSummary::from(*p)).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if packages.is_empty() {
        println!("No packages found.");
        return Ok(());
    }
    for pkg in &packages {
        println!(
            "{:<3} {:<30} {:<24} {}",
            abbreviation(pkg),
            pkg.name,
            pkg.installed.version.describe(),
            pkg.status
        );
    }
    println!("\nTotal: {} package(s)", packages.len());
    Ok(())
}

fn audit(config: &Config) -> Result<bool> {
    let store = open_store(config)?;

    let groups: [(&str, fn(&Package) -> bool); 6] = [
        (
            "The following packages are in a mess due to serious problems during\n\
             installation. They must be reinstalled for them (and any packages\n\
             that depend on them) to function properly:",
            |p| p.eflag == EFlag::ReinstReq,
        ),
        (
            "The following packages have been unpacked but not yet configured.\n\
             They must be configured using settle configure for them to work:",
            |p| p.status == Status::Unpacked,
        ),
        (
            "The following packages are only half configured, probably due to\n\
             problems configuring them the first time. The configuration should\n\
             be retried using settle configure <package>:",
            |p| p.status == Status::HalfConfigured,
        ),
        (
            "The following packages are only half installed, due to problems\n\
             during installation. The installation can probably be completed by\n\
             retrying it:",
            |p| p.status == Status::HalfInstalled,
        ),
        (
            "The following packages are awaiting processing of triggers that they\n\
             have activated in other packages. This processing can be requested\n\
             using settle configure --pending or settle triggers-only:",
            |p| p.status == Status::TriggersAwaited,
        ),
        (
            "The following packages have been triggered, but the trigger processing\n\
             has not yet been done. Trigger processing can be requested using\n\
             settle configure --pending or settle triggers-only:",
            |p| p.status == Status::TriggersPending,
        ),
    ];

    let mut clean = true;
    for (heading, selects) in groups {
        let mut matching: Vec<&Package> = store.iter().map(|(_, p)| p).filter(|p| selects(p)).collect();
        if matching.is_empty() {
            continue;
        }
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        clean = false;
        println!("{}", heading);
        for pkg in matching {
            println!(" {:<20} {}", pkg.name, pkg.installed.version.describe());
        }
        println!();
    }
    Ok(clean)
}

fn init(config: &Config) -> Result<()> {
    for dir in [config.admindir.clone(), config.info_dir(), config.triggers_dir()] {
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let db_path = config.db_path();
    info!("Initializing status database at: {}", db_path.display());
    settle::db::init(&db_path.to_string_lossy())?;
    println!("Status database initialized at: {}", db_path.display());
    Ok(())
}

fn main() -> Result<()> {
    // Progress goes to stdout, diagnostics to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    let ok = match cli.command {
        Some(Commands::Init) => init(&config).map(|_| true)?,
        Some(Commands::Configure { packages, pending }) => {
            run_queue(&config, QueueAction::Configure, &packages, pending)?
        }
        Some(Commands::TriggersOnly { packages, pending }) => {
            run_queue(&config, QueueAction::TriggersOnly, &packages, pending)?
        }
        Some(Commands::UpdateAvail { packages_file }) => {
            update_avail(&config, AvailableMode::Replace, Some(packages_file)).map(|_| true)?
        }
        Some(Commands::MergeAvail { packages_file }) => {
            update_avail(&config, AvailableMode::Merge, Some(packages_file)).map(|_| true)?
        }
        Some(Commands::ClearAvail) => update_avail(&config, AvailableMode::Clear, None).map(|_| true)?,
        Some(Commands::Register { control_file }) => register(&config, control_file).map(|_| true)?,
        Some(Commands::List { pattern, json }) => list(&config, pattern, json).map(|_| true)?,
        Some(Commands::Audit) => audit(&config)?,
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "settle", &mut io::stdout());
            true
        }
        None => {
            println!("Settle v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'settle --help' for usage information");
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::try_parse_from([
            "settle",
            "--admindir",
            "/tmp/admin",
            "--force",
            "confold,depends",
            "--force",
            "confmiss",
            "configure",
            "foo",
            "bar",
        ])
        .unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.admindir, PathBuf::from("/tmp/admin"));
        assert!(config.force.confold && config.force.depends && config.force.confmiss);
        assert!(!config.force.confnew);
        match cli.command {
            Some(Commands::Configure { packages, pending }) => {
                assert_eq!(packages, vec!["foo".to_string(), "bar".to_string()]);
                assert!(!pending);
            }
            _ => panic!("expected configure"),
        }
    }

    #[test]
    fn test_unknown_force_option_rejected() {
        let cli = Cli::try_parse_from(["settle", "--force", "everything", "audit"]).unwrap();
        assert!(cli.config().is_err());
    }

    #[test]
    fn test_abbreviation() {
        let mut pkg = Package::new("foo");
        pkg.want = Want::Install;
        pkg.status = Status::Installed;
        assert_eq!(abbreviation(&pkg), "ii ");
        pkg.status = Status::HalfConfigured;
        pkg.eflag = EFlag::ReinstReq;
        assert_eq!(abbreviation(&pkg), "iFR");
    }

    #[test]
    fn test_queue_needs_names_or_pending() {
        let config = Config::new("/nonexistent/admin", "/");
        assert!(run_queue(&config, QueueAction::Configure, &[], false).is_err());
        assert!(run_queue(&config, QueueAction::Configure, &["foo".to_string()], true).is_err());
    }

    #[test]
    fn test_configure_unknown_name_leaves_no_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::new(dir.path().join("admin"), dir.path());
        init(&config).unwrap();

        let ok = run_queue(&config, QueueAction::Configure, &["nosuch".to_string()], false).unwrap();
        assert!(!ok);

        let store = open_store(&config).unwrap();
        assert!(store.find("nosuch").is_none());
        assert!(store.ids().is_empty());
    }
}

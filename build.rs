// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn packages_arg() -> Arg {
    Arg::new("packages").num_args(0..).help("Package names")
}

fn pending_arg() -> Arg {
    Arg::new("pending")
        .short('a')
        .long("pending")
        .action(ArgAction::SetTrue)
        .help("Act on every package that needs it")
}

fn build_cli() -> Command {
    Command::new("settle")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Settle Contributors")
        .about("Package status database and configuration engine")
        .subcommand_required(false)
        .arg(
            Arg::new("admindir")
                .long("admindir")
                .global(true)
                .value_name("DIR")
                .default_value("/var/lib/settle")
                .env("SETTLE_ADMINDIR")
                .help("Administrative directory holding the status database"),
        )
        .arg(
            Arg::new("instdir")
                .long("instdir")
                .global(true)
                .value_name("DIR")
                .default_value("/")
                .env("SETTLE_INSTDIR")
                .help("Root of the filesystem packages are installed into"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .global(true)
                .value_name("THINGS")
                .action(ArgAction::Append)
                .help("Override problems (confnew, confold, confdef, confmiss, depends, depends-version, configure-any, remove-reinstreq, all)"),
        )
        .arg(
            Arg::new("no_act")
                .long("no-act")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Say what would be done without changing anything"),
        )
        .arg(
            Arg::new("status_fd")
                .long("status-fd")
                .global(true)
                .value_name("FD")
                .action(ArgAction::Append)
                .help("Send machine-readable status lines to this file descriptor"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .global(true)
                .value_name("FILE")
                .help("Append actions and status changes to this log file"),
        )
        .subcommand(Command::new("init").about("Create the status database and administrative directories"))
        .subcommand(
            Command::new("configure")
                .about("Configure unpacked packages")
                .arg(packages_arg())
                .arg(pending_arg()),
        )
        .subcommand(
            Command::new("triggers-only")
                .about("Process pending triggers only")
                .arg(packages_arg())
                .arg(pending_arg()),
        )
        .subcommand(
            Command::new("update-avail")
                .about("Replace available package information with a Packages file")
                .arg(Arg::new("packages_file").required(true).help("Packages file")),
        )
        .subcommand(
            Command::new("merge-avail")
                .about("Merge newer package information from a Packages file")
                .arg(Arg::new("packages_file").required(true).help("Packages file")),
        )
        .subcommand(Command::new("clear-avail").about("Forget all available package information"))
        .subcommand(
            Command::new("register")
                .about("Record a package as unpacked from its control file")
                .arg(Arg::new("control_file").required(true).help("Control file of the unpacked package")),
        )
        .subcommand(
            Command::new("list")
                .about("List packages")
                .arg(Arg::new("pattern").help("Only packages whose name contains this"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print JSON instead of a table"),
                ),
        )
        .subcommand(Command::new("audit").about("Report packages that are not fully installed"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("settle.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}

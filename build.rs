// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common arguments locating an install
fn install_args() -> [Arg; 3] {
    [
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("PATH")
            .help("Configuration file (TOML)"),
        Arg::new("root")
            .short('r')
            .long("root")
            .value_name("DIR")
            .help("Root directory of the installed application"),
        Arg::new("source")
            .short('s')
            .long("source")
            .value_name("URL|DIR")
            .help("Feed URL or directory"),
    ]
}

fn ignore_deltas_arg() -> Arg {
    Arg::new("ignore_deltas")
        .long("ignore-deltas")
        .action(clap::ArgAction::SetTrue)
        .help("Plan with full packages only")
}

fn build_cli() -> Command {
    Command::new("updraft")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Updraft Contributors")
        .about("Application self-update engine with binary delta packages")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(clap::ArgAction::SetTrue)
                .help("Don't draw progress bars"),
        )
        .subcommand(
            Command::new("check")
                .about("Check the feed for a newer version")
                .args(install_args())
                .arg(ignore_deltas_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print the plan as JSON"),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("Download the packages needed to update")
                .args(install_args())
                .arg(ignore_deltas_arg()),
        )
        .subcommand(
            Command::new("apply")
                .about("Install packages that were already downloaded")
                .args(install_args())
                .arg(ignore_deltas_arg()),
        )
        .subcommand(
            Command::new("update")
                .about("Check, download and apply")
                .args(install_args()),
        )
        .subcommand(
            Command::new("version")
                .about("Print the installed version")
                .args(install_args()),
        )
        .subcommand(
            Command::new("releasify")
                .about("Rebuild the RELEASES file for a directory of packages")
                .arg(Arg::new("dir").required(true).help("Directory holding the .nupkg files"))
                .arg(
                    Arg::new("stage")
                        .long("stage")
                        .value_name("PERCENT")
                        .help("Staged rollout percentage for the newest full package"),
                ),
        )
        .subcommand(
            Command::new("diff")
                .about("Create a bsdiff patch between two files")
                .arg(Arg::new("old").required(true))
                .arg(Arg::new("new").required(true))
                .arg(Arg::new("patch").required(true)),
        )
        .subcommand(
            Command::new("patch")
                .about("Apply a bsdiff patch")
                .arg(Arg::new("old").required(true))
                .arg(Arg::new("patch").required(true))
                .arg(Arg::new("output").required(true)),
        )
        .subcommand(
            Command::new("delta")
                .about("Delta package commands")
                .subcommand(
                    Command::new("create")
                        .about("Create a delta package from two full packages")
                        .arg(Arg::new("base").required(true).help("Older full package"))
                        .arg(Arg::new("new").required(true).help("Newer full package"))
                        .arg(Arg::new("output").short('o').long("output").help("Output delta package")),
                )
                .subcommand(
                    Command::new("apply")
                        .about("Rebuild a full package from a base package and deltas")
                        .arg(Arg::new("base").required(true).help("Base full package"))
                        .arg(
                            Arg::new("deltas")
                                .required(true)
                                .num_args(1..)
                                .help("Delta packages, in ascending version order"),
                        )
                        .arg(
                            Arg::new("output")
                                .short('o')
                                .long("output")
                                .required(true)
                                .help("Output full package"),
                        )
                        .arg(
                            Arg::new("diff_helper")
                                .long("diff-helper")
                                .help("Helper for .diff entries"),
                        ),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("updraft.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}

// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("larder")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Larder Contributors")
        .about("Schema-driven package database keeper")
        .subcommand_required(false)
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .default_value("/var/lib/larder")
                .help("Managed root directory"),
        )
        .subcommand(Command::new("init").about("Initialize the managed root"))
        .subcommand(
            Command::new("info")
                .about("Show information about installed packages")
                .arg(Arg::new("all").short('a').long("all").action(clap::ArgAction::SetTrue))
                .arg(
                    Arg::new("depends")
                        .short('R')
                        .long("depends")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print the packages the package depends on"),
                )
                .arg(
                    Arg::new("who-owns")
                        .short('W')
                        .long("who-owns")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print the package owning the given files"),
                )
                .arg(Arg::new("args").num_args(0..).help("Package names")),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify package integrity and signature")
                .arg(Arg::new("files").num_args(1..).help("Signed container files")),
        )
        .subcommand(
            Command::new("update")
                .about("Synchronize repository indices")
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(clap::ArgAction::SetTrue)
                        .help("Fetch even when the cached index looks current"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Render a database file as text")
                .arg(Arg::new("file").required(true).help("Database file")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("larder.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}

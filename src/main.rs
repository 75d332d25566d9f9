// src/main.rs

use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use bitflags::bitflags;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use larder::db::value::Value;
use larder::db::{Database, Obj, dump, format};
use larder::packages::dependency::{Dependency, dependency_tostring};
use larder::packages::scalars::human_size;
use larder::packages::{self, pi, pkg};
use larder::query::{PkgId, QueryIndex};
use larder::repository;
use larder::sign::SharedSignCtx;
use larder::store::{self, Store};
use larder::stream::{FileStream, GzipMultipart, gunzip};

#[derive(Parser)]
#[command(name = "larder")]
#[command(author, version, about = "Schema-driven package database keeper", long_about = None)]
struct Cli {
    /// Managed root directory
    #[arg(long, global = true, default_value = "/var/lib/larder")]
    root: PathBuf,

    /// Increase verbosity (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the managed root
    Init,
    /// Show information about installed packages
    Info(InfoCmd),
    /// Verify package integrity and signature
    Verify {
        /// Signed container files to check
        files: Vec<String>,
    },
    /// Synchronize repository indices
    Update {
        /// Fetch even when the cached index looks current
        #[arg(short, long)]
        force: bool,
    },
    /// Render a database file as text
    Dump {
        /// Database file to render
        file: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct InfoCmd {
    /// Print all fields
    #[arg(short = 'a', long)]
    all: bool,
    /// Removed; package contents live in the manifest
    #[arg(short = 'L', long)]
    contents: bool,
    /// Print the packages the package depends on
    #[arg(short = 'R', long)]
    depends: bool,
    /// Print the description
    #[arg(short = 'd', long)]
    description: bool,
    /// Print the install-if rule
    #[arg(long)]
    install_if: bool,
    /// Check the given dependencies against the installed set
    #[arg(short = 'e', long)]
    installed: bool,
    /// Print the license
    #[arg(long)]
    license: bool,
    /// Print the maintainer
    #[arg(long)]
    maintainer: bool,
    /// Print the origin (source package)
    #[arg(long)]
    origin: bool,
    /// Print what the package provides
    #[arg(short = 'P', long)]
    provides: bool,
    /// Print the packages that depend on the package
    #[arg(short = 'r', long)]
    rdepends: bool,
    /// Print what the package replaces
    #[arg(long)]
    replaces: bool,
    /// Print the packages whose install-if mentions the package
    #[arg(long)]
    rinstall_if: bool,
    /// Print the download and installed sizes
    #[arg(short = 's', long)]
    size: bool,
    /// Print the triggers
    #[arg(short = 't', long)]
    triggers: bool,
    /// Print the upstream URL
    #[arg(short = 'w', long)]
    webpage: bool,
    /// Print the package owning the given files
    #[arg(short = 'W', long)]
    who_owns: bool,
    /// Package names (or files with -W, dependencies with -e)
    args: Vec<String>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct InfoFields: u32 {
        const DESC = 1 << 1;
        const URL = 1 << 2;
        const SIZE = 1 << 3;
        const DEPENDS = 1 << 4;
        const PROVIDES = 1 << 5;
        const RDEPENDS = 1 << 6;
        const TRIGGERS = 1 << 7;
        const INSTALL_IF = 1 << 8;
        const RINSTALL_IF = 1 << 9;
        const REPLACES = 1 << 10;
        const LICENSE = 1 << 11;
        const MAINTAINER = 1 << 12;
        const ORIGIN = 1 << 13;
        const REPOSITORY = 1 << 14;
    }
}

impl InfoCmd {
    fn field_mask(&self) -> InfoFields {
        let mut mask = InfoFields::empty();
        if self.description {
            mask |= InfoFields::DESC;
        }
        if self.webpage {
            mask |= InfoFields::URL;
        }
        if self.size {
            mask |= InfoFields::SIZE;
        }
        if self.depends {
            mask |= InfoFields::DEPENDS;
        }
        if self.provides {
            mask |= InfoFields::PROVIDES;
        }
        if self.rdepends {
            mask |= InfoFields::RDEPENDS;
        }
        if self.triggers {
            mask |= InfoFields::TRIGGERS;
        }
        if self.install_if {
            mask |= InfoFields::INSTALL_IF;
        }
        if self.rinstall_if {
            mask |= InfoFields::RINSTALL_IF;
        }
        if self.replaces {
            mask |= InfoFields::REPLACES;
        }
        if self.license {
            mask |= InfoFields::LICENSE;
        }
        if self.maintainer {
            mask |= InfoFields::MAINTAINER;
        }
        if self.origin {
            mask |= InfoFields::ORIGIN;
        }
        // Default subaction is "all fields".
        if self.all || mask.is_empty() {
            mask = InfoFields::all();
        }
        mask
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let verbosity = 1 + cli.verbose as i32 - cli.quiet as i32;
    let code = match run(&cli, verbosity) {
        Ok(errors) => errors.min(255) as i32,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli, verbosity: i32) -> Result<usize> {
    match &cli.command {
        Commands::Init => {
            store::init(&cli.root)?;
            if verbosity >= 1 {
                println!("initialized {}", cli.root.display());
            }
            Ok(0)
        }
        Commands::Info(args) => cmd_info(cli, args, verbosity),
        Commands::Verify { files } => cmd_verify(cli, files, verbosity),
        Commands::Update { force } => {
            let store = Store::open(&cli.root)?;
            let summary = repository::sync_repositories(&store, *force)?;
            if verbosity >= 1 {
                println!(
                    "{} updated, {} unchanged, {} errors",
                    summary.updated, summary.unchanged, summary.errors
                );
            }
            Ok(summary.errors)
        }
        Commands::Dump { file } => cmd_dump(file),
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "larder", &mut std::io::stdout());
            Ok(0)
        }
    }
}

fn report_error(verbosity: i32, msg: &str) {
    if verbosity >= 0 {
        eprintln!("ERROR: {msg}");
    }
}

fn report_warning(verbosity: i32, msg: &str) {
    if verbosity >= 1 {
        eprintln!("WARNING: {msg}");
    }
}

fn cmd_info(cli: &Cli, args: &InfoCmd, verbosity: i32) -> Result<usize> {
    if args.contents {
        report_warning(verbosity, "info -L has been replaced with the dump applet");
        return Ok(0);
    }

    let store = Store::open_unlocked(&cli.root)?;
    let db = store.load_installed()?;
    let q = QueryIndex::build(&db)?;
    debug!("installed set holds {} packages", q.len());

    if args.who_owns {
        return Ok(info_who_owns(&db, &q, &args.args, verbosity));
    }
    if args.installed {
        return Ok(info_exists(&db, &q, &args.args, verbosity));
    }

    let mut errors = 0;
    if args.args.is_empty() {
        // No names: list every installed package.
        for id in 0..q.len() {
            verbose_print_pkg(&db, &q, id, verbosity, 1);
        }
        return Ok(0);
    }

    let mask = args.field_mask();
    for name in &args.args {
        let ids = q.providers(name);
        if ids.is_empty() {
            report_error(verbosity, &format!("{name}: package not found"));
            errors += 1;
            continue;
        }
        for id in ids {
            print_package(&store, &db, &q, id, mask);
        }
    }
    Ok(errors)
}

fn info_who_owns(db: &Database, q: &QueryIndex, args: &[String], verbosity: i32) -> usize {
    let mut errors = 0;
    let mut names: Vec<String> = Vec::new();
    for path in args {
        match q.owner_of(path).and_then(|id| q.package(db, id)) {
            None => {
                report_error(verbosity, &format!("{path}: Could not find owner package"));
                errors += 1;
            }
            Some(p) => {
                let Some(info) = p.obj(pkg::INFO) else { continue };
                let name = info.text(pi::NAME).unwrap_or("?");
                if verbosity < 1 {
                    names.push(name.to_string());
                } else {
                    println!("{path} is owned by {}", pkg_ver(&info));
                }
            }
        }
    }
    if verbosity < 1 && !names.is_empty() {
        names.sort();
        names.dedup();
        println!("{}", names.join(" "));
    }
    errors
}

fn info_exists(db: &Database, q: &QueryIndex, args: &[String], verbosity: i32) -> usize {
    let mut errors = 0;
    for arg in args {
        let dep = match Dependency::parse(arg) {
            Ok(d) => d,
            Err(e) => {
                report_error(verbosity, &e.to_string());
                errors += 1;
                continue;
            }
        };
        if !q.is_satisfied(db, &dep) {
            errors += 1;
            continue;
        }
        if let Some(&id) = q.providers(&dep.name).first() {
            verbose_print_pkg(db, q, id, verbosity, 0);
        }
    }
    errors
}

fn verbose_print_pkg(db: &Database, q: &QueryIndex, id: PkgId, verbosity: i32, minimal: i32) {
    if verbosity.max(minimal) < 1 {
        return;
    }
    let Some(info) = q.package(db, id).and_then(|p| p.obj(pkg::INFO)) else {
        return;
    };
    let mut line = info.text(pi::NAME).unwrap_or("?").to_string();
    if verbosity > 1 {
        line.push('-');
        line.push_str(info.text(pi::VERSION).unwrap_or("?"));
    }
    if verbosity > 2 {
        line.push_str(" - ");
        line.push_str(info.text(pi::DESCRIPTION).unwrap_or(""));
    }
    println!("{line}");
}

fn pkg_ver(info: &Obj<'_>) -> String {
    format!(
        "{}-{}",
        info.text(pi::NAME).unwrap_or("?"),
        info.text(pi::VERSION).unwrap_or("?")
    )
}

fn dep_list_line(info: &Obj<'_>, field: u16) -> Option<String> {
    let arr = info.arr(field)?;
    if arr.is_empty() {
        return None;
    }
    let parts: Vec<String> = arr.objs().filter_map(dependency_tostring).collect();
    Some(parts.join(" "))
}

fn size_line(info: &Obj<'_>, field: u16) -> Option<String> {
    if info.val(field).is_null() {
        return None;
    }
    let (v, unit) = human_size(info.int(field) as u64);
    Some(format!("{v} {unit}"))
}

fn print_package(store: &Store, db: &Database, q: &QueryIndex, id: PkgId, mask: InfoFields) {
    let Some(p) = q.package(db, id) else { return };
    let Some(info) = p.obj(pkg::INFO) else { return };
    let name = info.text(pi::NAME).unwrap_or("?");

    println!("Package: {name}");
    if let Some(v) = info.text(pi::VERSION) {
        println!("Version: {v}");
    }
    if mask.contains(InfoFields::REPOSITORY) {
        println!("Repository:");
        println!("  {}", store.installed_path().display());
    }
    if mask.contains(InfoFields::ORIGIN)
        && let Some(o) = info.text(pi::ORIGIN)
    {
        println!("Source-Package: {o}");
    }
    if mask.contains(InfoFields::DESC)
        && let Some(d) = info.text(pi::DESCRIPTION)
    {
        println!("Description: {d}");
    }
    if mask.contains(InfoFields::URL)
        && let Some(u) = info.text(pi::URL)
    {
        println!("URL: {u}");
    }
    if mask.contains(InfoFields::LICENSE)
        && let Some(l) = info.text(pi::LICENSE)
    {
        println!("License: {l}");
    }
    if mask.contains(InfoFields::MAINTAINER)
        && let Some(m) = info.text(pi::MAINTAINER)
    {
        println!("Maintainer: {m}");
    }
    if mask.contains(InfoFields::SIZE) {
        if let Some(s) = size_line(&info, pi::FILE_SIZE) {
            println!("Download-Size: {s}");
        }
        if let Some(s) = size_line(&info, pi::INSTALLED_SIZE) {
            println!("Installed-Size: {s}");
        }
    }
    if mask.contains(InfoFields::DEPENDS)
        && let Some(l) = dep_list_line(&info, pi::DEPENDS)
    {
        println!("Depends: {l}");
    }
    if mask.contains(InfoFields::PROVIDES)
        && let Some(l) = dep_list_line(&info, pi::PROVIDES)
    {
        println!("Provides: {l}");
    }
    if mask.contains(InfoFields::REPLACES)
        && let Some(l) = dep_list_line(&info, pi::REPLACES)
    {
        println!("Replaces: {l}");
    }
    if mask.contains(InfoFields::INSTALL_IF)
        && let Some(l) = dep_list_line(&info, pi::INSTALL_IF)
    {
        println!("Install-If: {l}");
    }
    if mask.contains(InfoFields::RDEPENDS) {
        let lines: Vec<String> = q
            .rdepends_of(name)
            .iter()
            .filter_map(|&rid| q.package(db, rid))
            .filter_map(|rp| rp.obj(pkg::INFO))
            .map(|ri| pkg_ver(&ri))
            .collect();
        println!("Reverse-Depends: {}", lines.join(" "));
    }
    if mask.contains(InfoFields::RINSTALL_IF) {
        let rids = q.rinstall_if_of(name);
        if !rids.is_empty() {
            println!("Reverse-Install-If:");
            for &rid in rids {
                if let Some(ri) = q.package(db, rid).and_then(|rp| rp.obj(pkg::INFO)) {
                    println!("  {}", pkg_ver(&ri));
                }
            }
        }
    }
    if mask.contains(InfoFields::TRIGGERS)
        && let Some(triggers) = p.arr(pkg::TRIGGERS)
        && !triggers.is_empty()
    {
        let names: Vec<String> = triggers
            .iter()
            .filter_map(|v| db.r_text(v))
            .map(str::to_string)
            .collect();
        println!("Triggers: {}", names.join(" "));
    }
    println!();
}

fn cmd_verify(cli: &Cli, files: &[String], verbosity: i32) -> Result<usize> {
    let store = Store::open_unlocked(&cli.root)?;
    let mut rc = 0;
    for file in files {
        match verify_one(&store, file) {
            Ok((control, data)) => {
                let ok = control && data;
                if verbosity >= 1 {
                    let status = if ok {
                        "OK"
                    } else if !control {
                        "UNTRUSTED"
                    } else {
                        "FAILED"
                    };
                    println!("{file}: {status}");
                } else if !ok {
                    println!("{file}");
                }
                if !ok {
                    rc += 1;
                }
            }
            Err(e) => {
                report_error(verbosity, &format!("{file}: {e}"));
                rc += 1;
            }
        }
    }
    Ok(rc)
}

fn verify_one(store: &Store, file: &str) -> Result<(bool, bool)> {
    let ctx = SharedSignCtx::new(store.keys_dir());
    let src = FileStream::open(file)?;
    let reader = GzipMultipart::new(src, ctx.clone());
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        if name.starts_with('.') {
            let mut content = Vec::new();
            entry.by_ref().take(64 * 1024).read_to_end(&mut content)?;
            ctx.process_entry(&name, &content);
        }
    }
    // Drain whatever follows the archive so the end-of-stream event
    // reaches the signing context.
    let mut inner = archive.into_inner();
    std::io::copy(&mut inner, &mut std::io::sink())?;

    Ok((ctx.control_verified(), ctx.data_verified()))
}

fn cmd_dump(file: &str) -> Result<usize> {
    let mut raw = std::fs::read(file)?;
    if raw.starts_with(&[0x1f, 0x8b]) {
        let mut plain = Vec::new();
        gunzip(&raw[..]).read_to_end(&mut plain)?;
        raw = plain;
    }
    let db = format::from_bytes(&raw)?;
    let Some(schema) = packages::schema_for_id(db.schema_id()) else {
        anyhow::bail!("{file}: unknown schema id");
    };
    if db.root() == Value::Null {
        return Ok(0);
    }
    print!("{}", dump::render(&db, schema, db.root()));
    Ok(0)
}

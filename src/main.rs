//! Thin CLI layer: parse args, styled output, and call into vpm-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use vpm_core::cache::PackageCache;
use vpm_core::cas::compute_integrity;
use vpm_core::config::Config;
use vpm_core::fs::NativeFileSystem;
use vpm_core::orchestrator::{InstallOptions, InstallResult, Orchestrator, Phase};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn project_root() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn orchestrator() -> Result<Orchestrator, String> {
    let root = project_root();
    vpm_core::log::init_cache().map_err(|e| format!("failed to initialize cache directory: {}", e))?;

    let config = Config::load(&root);
    let cache_dir = config.cache_dir.clone().unwrap_or_else(|| PathBuf::from(vpm_core::log::get_cache_dir()));
    let package_ttl = config.package_ttl;
    let store = vpm_core::cache::DiskStore::new(cache_dir.join("packages")).map_err(|e| e.to_string())?;
    let cache = PackageCache::new(package_ttl, Some(Box::new(store)));
    let fs = NativeFileSystem::new(root);
    Ok(Orchestrator::new(config, Box::new(fs), cache))
}

fn progress_bar(quiet: bool) -> Option<ProgressBar> {
    if quiet || !use_color() {
        return None;
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("=>-"),
    );
    Some(bar)
}

fn report_install_result(result: &InstallResult, json: bool) -> Result<(), String> {
    if json {
        let payload = serde_json::json!({
            "success": result.success,
            "installed": result.installed.iter().map(|p| serde_json::json!({
                "name": p.name, "version": p.version, "path": p.path,
            })).collect::<Vec<_>>(),
            "warnings": result.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            "errors": result.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap());
    } else {
        for pkg in &result.installed {
            dim(&format!("+ {}@{}", pkg.name, pkg.version));
        }
        for w in &result.warnings {
            warning(&format!("warning: {}", w));
        }
        for e in &result.errors {
            error(&format!("error: {}", e));
        }
        if result.success {
            success(&format!("done in {:.2}s", result.duration.as_secs_f64()));
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(format!("install finished with {} error(s)", result.errors.len()))
    }
}

#[allow(clippy::too_many_arguments)]
fn run_install(
    packages: Vec<String>,
    quiet: bool,
    json: bool,
    save_dev: bool,
    no_save: bool,
    production: bool,
    force: bool,
    no_peer: bool,
) -> Result<(), String> {
    let orch = orchestrator()?;
    let bar = progress_bar(quiet);
    let options = InstallOptions {
        save_dev,
        no_save,
        production,
        force,
        peer: !no_peer,
        on_progress: bar.clone().map(|bar| -> Box<dyn Fn(vpm_core::orchestrator::ProgressEvent)> {
            Box::new(move |event| {
                let label = match event.phase {
                    Phase::Resolving => "resolving",
                    Phase::Downloading => "installing",
                };
                bar.set_length(event.total as u64);
                bar.set_position(event.current as u64);
                bar.set_message(match &event.package {
                    Some(p) => format!("{} {}", label, p),
                    None => label.to_string(),
                });
            })
        }),
    };

    let pkgs_arg = if packages.is_empty() { None } else { Some(packages.as_slice()) };
    let result = orch.install(pkgs_arg, options);
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    report_install_result(&result, json)
}

fn cmd_install(sub_m: &clap::ArgMatches) -> Result<(), String> {
    let packages: Vec<String> = sub_m.get_many::<String>("package").map(|v| v.cloned().collect()).unwrap_or_default();
    run_install(
        packages,
        sub_m.get_flag("quiet"),
        sub_m.get_flag("json"),
        sub_m.get_flag("save-dev"),
        sub_m.get_flag("no-save"),
        sub_m.get_flag("production"),
        sub_m.get_flag("force"),
        sub_m.get_flag("no-peer"),
    )
}

fn cmd_uninstall(sub_m: &clap::ArgMatches) -> Result<(), String> {
    let packages: Vec<String> = sub_m.get_many::<String>("package").map(|v| v.cloned().collect()).unwrap_or_default();
    if packages.is_empty() {
        return Err("uninstall requires at least one package name".to_string());
    }
    let json = sub_m.get_flag("json");
    let orch = orchestrator()?;
    let result = orch.uninstall(&packages);
    report_install_result(&result, json)
}

fn cmd_list(sub_m: &clap::ArgMatches) -> Result<(), String> {
    let json = sub_m.get_flag("json");
    let orch = orchestrator()?;
    let packages = orch.list().map_err(|e| e.to_string())?;

    if json {
        let payload: Vec<_> = packages
            .iter()
            .map(|p| serde_json::json!({ "name": p.name, "version": p.version, "path": p.path }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload).unwrap());
        return Ok(());
    }

    if packages.is_empty() {
        info("(no packages installed)");
        return Ok(());
    }
    for pkg in &packages {
        println!("{} {}", pkg.name.bold(), format!("@{}", pkg.version).dimmed());
    }
    Ok(())
}

fn cmd_run(sub_m: &clap::ArgMatches) -> Result<(), String> {
    let script: &String = sub_m.get_one("script").ok_or("run requires a script name")?;
    let orch = orchestrator()?;
    let cmd = orch.run(script).map_err(|e| e.to_string())?;
    info(&format!("{}: {}", script, cmd));
    dim("vpm does not execute lifecycle scripts; run the command above in your own shell.");
    Ok(())
}

fn cmd_init(sub_m: &clap::ArgMatches) -> Result<(), String> {
    let root = project_root();
    let manifest_path = root.join("package.json");
    if manifest_path.exists() && !sub_m.get_flag("force") {
        return Err("package.json already exists (use --force to overwrite)".to_string());
    }
    let name = root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "project".to_string());
    let manifest = serde_json::json!({
        "name": name,
        "version": "1.0.0",
        "dependencies": {},
        "devDependencies": {},
    });
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest).unwrap())
        .map_err(|e| format!("failed to write package.json: {}", e))?;
    success("created package.json");
    Ok(())
}

fn cmd_verify(sub_m: &clap::ArgMatches) -> Result<(), String> {
    let path: &String = sub_m.get_one("file").ok_or("verify requires a file path")?;
    let sri: &String = sub_m.get_one("integrity").ok_or("verify requires --integrity <sri>")?;
    let bytes = std::fs::read(path).map_err(|e| format!("failed to read {}: {}", path, e))?;
    let computed = compute_integrity(&bytes);
    if computed == *sri {
        success(&format!("integrity OK ({})", computed));
        Ok(())
    } else {
        Err(format!("integrity mismatch: expected {}, computed {}", sri, computed))
    }
}

fn run() -> Result<(), String> {
    let matches = Command::new("vpm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("In-browser-grade, npm-compatible package manager core with a native CLI harness")
        .after_help("Examples:\n  vpm install\n  vpm install lodash left-pad\n  vpm uninstall left-pad\n  vpm list\n  vpm run build")
        .subcommand(
            Command::new("install")
                .visible_alias("i")
                .visible_alias("add")
                .about("Install packages (from args or package.json)")
                .arg(Arg::new("package").required(false).num_args(0..).help("Package(s) to install, as name or name@range; omit to install from package.json"))
                .arg(Arg::new("save-dev").long("save-dev").short('D').action(ArgAction::SetTrue).help("Save to devDependencies instead of dependencies"))
                .arg(Arg::new("no-save").long("no-save").action(ArgAction::SetTrue).help("Do not write installed packages back to package.json"))
                .arg(Arg::new("production").long("production").action(ArgAction::SetTrue).help("Skip devDependencies"))
                .arg(Arg::new("force").long("force").action(ArgAction::SetTrue).help("Ignore the existing lockfile and re-resolve from scratch"))
                .arg(Arg::new("no-peer").long("no-peer").action(ArgAction::SetTrue).help("Do not resolve peerDependencies"))
                .arg(Arg::new("quiet").short('q').long("quiet").action(ArgAction::SetTrue).help("Suppress the progress bar"))
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue).help("Output a machine-readable JSON result")),
        )
        .subcommand(
            Command::new("uninstall")
                .visible_alias("remove")
                .visible_alias("rm")
                .about("Remove packages from node_modules and package.json")
                .arg(Arg::new("package").required(true).num_args(1..).help("Package name(s) to remove"))
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue).help("Output a machine-readable JSON result")),
        )
        .subcommand(
            Command::new("list")
                .visible_alias("ls")
                .about("List installed packages")
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue).help("Output a machine-readable JSON result")),
        )
        .subcommand(
            Command::new("run")
                .about("Look up a package.json script; does not execute it")
                .arg(Arg::new("script").required(true).help("Script name from package.json's \"scripts\" object")),
        )
        .subcommand(
            Command::new("init")
                .about("Create a minimal package.json in the current directory")
                .arg(Arg::new("force").long("force").action(ArgAction::SetTrue).help("Overwrite an existing package.json")),
        )
        .subcommand(
            Command::new("verify")
                .about("Check a downloaded file against an SRI integrity string")
                .arg(Arg::new("file").required(true).help("Path to the file to check"))
                .arg(Arg::new("integrity").long("integrity").required(true).help("Expected SRI string, e.g. sha512-...")),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("install", sub_m)) => cmd_install(sub_m),
        Some(("uninstall", sub_m)) => cmd_uninstall(sub_m),
        Some(("list", sub_m)) => cmd_list(sub_m),
        Some(("run", sub_m)) => cmd_run(sub_m),
        Some(("init", sub_m)) => cmd_init(sub_m),
        Some(("verify", sub_m)) => cmd_verify(sub_m),
        _ => run_install(Vec::new(), false, false, false, false, false, false, false),
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}

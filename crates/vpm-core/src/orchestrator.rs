//! Orchestrator (C8): drives `install`/`uninstall`/`list`/`run` by composing
//! every other component against a `FileSystem` capability (spec §4.8).
//!
//! The teacher has no single equivalent — its CLI commands each wire the
//! pieces together ad hoc (`install.rs`'s `resolve_full_tree` +
//! `lockfile_write::write_package_lock`, `doctor.rs` shelling to `npm`,
//! etc.) — so this module's shape is new, but every step it takes
//! (read manifest, resolve, hoist, cache-or-download-and-extract each flat
//! entry, write files, write the lockfile) is spec §4.8's state machine
//! translated directly into code, using the teacher's actual `RegistryClient`/
//! `PackageCache`/`resolve`/`hoist`/lockfile building blocks underneath.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::bin_links;
use crate::cache::PackageCache;
use crate::config::Config;
use crate::error::{PmError, Warning};
use crate::extract;
use crate::fs::FileSystem;
use crate::hoist::{hoist, FlatDependency};
use crate::lockfile::{self, Lockfile};
use crate::log;
use crate::registry::RegistryClient;
use crate::resolver::{self, ResolveOptions};
use crate::run;

const MANIFEST_PATH: &str = "package.json";
const LOCKFILE_PATH: &str = "package-lock.json";

/// The two progress milestones the spec's `install` flow reports through
/// (spec §4.8/§6): metadata resolution, then tarball download/extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Downloading,
}

/// One progress tick, handed to `InstallOptions::on_progress`.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    pub package: Option<String>,
    pub message: Option<String>,
}

/// Options for `install` (spec §6). `on_progress` is a plain callback, not
/// an async stream, since the whole PM core is synchronous from the
/// caller's point of view (spec §5).
pub struct InstallOptions {
    pub save_dev: bool,
    pub no_save: bool,
    pub production: bool,
    pub force: bool,
    pub peer: bool,
    pub on_progress: Option<Box<dyn Fn(ProgressEvent)>>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self { save_dev: false, no_save: false, production: false, force: false, peer: true, on_progress: None }
    }
}

/// One package actually written to disk by `install`.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub path: String,
}

/// The result record returned by `install`/`uninstall` (spec §4.8):
/// `success` is exactly `errors.is_empty()`.
#[derive(Debug, Clone)]
pub struct InstallResult {
    pub success: bool,
    pub installed: Vec<InstalledPackage>,
    pub warnings: Vec<Warning>,
    pub errors: Vec<PmError>,
    pub duration: Duration,
}

/// One package found by `list` (spec §4.8).
#[derive(Debug, Clone)]
pub struct ListedPackage {
    pub name: String,
    pub version: String,
    pub path: String,
}

/// Drives `install`/`uninstall`/`list`/`run` against a `FileSystem`
/// capability, composing the registry client, cache, resolver, hoister,
/// and lockfile codec. One `Orchestrator` serves one project; the spec's
/// concurrency discipline (spec §5) makes at-most-one-install-at-a-time
/// the caller's obligation, not something enforced here.
pub struct Orchestrator {
    config: Config,
    registry: RegistryClient,
    cache: PackageCache,
    fs: Box<dyn FileSystem>,
}

impl Orchestrator {
    pub fn new(config: Config, fs: Box<dyn FileSystem>, cache: PackageCache) -> Self {
        let registry = RegistryClient::new(config.clone());
        Self { config, registry, cache, fs }
    }

    fn read_manifest(&self) -> Value {
        match self.fs.read_file(MANIFEST_PATH) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| default_manifest()),
            Err(_) => default_manifest(),
        }
    }

    fn write_manifest(&self, manifest: &Value) -> Result<(), PmError> {
        let pretty = serde_json::to_string_pretty(manifest)
            .map_err(|e| PmError::InvalidPackageJson { path: Some(MANIFEST_PATH.to_string()), message: e.to_string() })?;
        self.fs.write_file(MANIFEST_PATH, pretty.as_bytes())
    }

    /// Reads and parses the existing lockfile, if any. Currently used only
    /// as an informational seed: its warnings are surfaced, but (per the
    /// spec's open question in §9) its pinned versions are not yet fed back
    /// into the resolver as hints.
    fn read_existing_lockfile(&self, force: bool) -> (Option<Lockfile>, Vec<Warning>) {
        if force || !self.fs.exists(LOCKFILE_PATH) {
            return (None, Vec::new());
        }
        match self.fs.read_file(LOCKFILE_PATH) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(json) => match lockfile::parse_lockfile(&json, false) {
                    Ok((lf, warnings)) => (Some(lf), warnings),
                    Err(w) => (None, vec![w]),
                },
                Err(e) => (None, vec![Warning::general(format!("failed to parse existing lockfile: {}", e))]),
            },
            Err(e) => (None, vec![Warning::general(format!("failed to read existing lockfile: {}", e))]),
        }
    }

    /// Runs `install`: reads the manifest, optionally records explicit
    /// `packages` onto it, resolves + hoists the dependency set, downloads
    /// or serves from cache each flat entry, writes files, and regenerates
    /// the lockfile (spec §4.8, step-for-step).
    pub fn install(&self, packages: Option<&[String]>, options: InstallOptions) -> InstallResult {
        let start = Instant::now();
        let mut warnings: Vec<Warning> = Vec::new();
        let mut errors: Vec<PmError> = Vec::new();

        let mut manifest = self.read_manifest();
        let mut manifest_dirty = false;

        let explicit: Option<Vec<(String, String)>> = packages.map(|specs| specs.iter().map(|s| parse_install_spec(s)).collect());

        if let Some(entries) = &explicit {
            if !options.no_save {
                let field = if options.save_dev { "devDependencies" } else { "dependencies" };
                let obj = manifest.as_object_mut().expect("manifest is always an object");
                let deps = obj.entry(field).or_insert_with(|| Value::Object(Map::new()));
                if let Some(map) = deps.as_object_mut() {
                    for (name, range) in entries {
                        map.insert(name.clone(), Value::String(range.clone()));
                    }
                    manifest_dirty = true;
                }
            }
        }

        let (_existing_lockfile, lockfile_warnings) = self.read_existing_lockfile(options.force);
        warnings.extend(lockfile_warnings);

        let top_level: HashMap<String, String> = match &explicit {
            Some(entries) => entries.iter().cloned().collect(),
            None => manifest_dependency_set(&manifest, options.production),
        };

        if top_level.is_empty() {
            if manifest_dirty {
                if let Err(e) = self.write_manifest(&manifest) {
                    errors.push(e);
                }
            }
            return InstallResult { success: errors.is_empty(), installed: Vec::new(), warnings, errors, duration: start.elapsed() };
        }

        self.emit_progress(&options, Phase::Resolving, 0, top_level.len(), None, None);
        let resolve_options = ResolveOptions { peer: options.peer, max_depth: 50 };
        let outcome = match resolver::resolve(&top_level, resolve_options, &self.registry) {
            Ok(o) => o,
            Err(e) => {
                errors.push(e);
                return InstallResult { success: false, installed: Vec::new(), warnings, errors, duration: start.elapsed() };
            }
        };
        warnings.extend(outcome.warnings);
        self.emit_progress(&options, Phase::Resolving, top_level.len(), top_level.len(), None, None);

        let flat = hoist(&outcome.roots);
        let total = flat.len();
        let mut installed = Vec::new();

        let mut entries: Vec<&FlatDependency> = flat.values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        for (i, dep) in entries.iter().enumerate() {
            self.emit_progress(&options, Phase::Downloading, i, total, Some(dep.name.clone()), None);
            match self.materialize(dep) {
                Ok(()) => installed.push(InstalledPackage { name: dep.name.clone(), version: dep.version.clone(), path: dep.path.clone() }),
                Err(e) => {
                    log::log_error(&format!("install: failed to materialize {}@{}: {}", dep.name, dep.version, e));
                    errors.push(e);
                }
            }
        }
        self.emit_progress(&options, Phase::Downloading, total, total, None, None);

        let name = manifest.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let version = manifest.get("version").and_then(|v| v.as_str()).unwrap_or("0.0.0").to_string();
        let generated = lockfile::generate_lockfile(&name, &version, &flat);
        match lockfile::to_pretty_string(&generated) {
            Ok(pretty) => {
                if let Err(e) = self.fs.write_file(LOCKFILE_PATH, pretty.as_bytes()) {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(PmError::InvalidPackageJson { path: Some(LOCKFILE_PATH.to_string()), message: e.to_string() }),
        }

        if manifest_dirty {
            if let Err(e) = self.write_manifest(&manifest) {
                errors.push(e);
            }
        }

        if let Some(root) = self.config.project_root.to_str() {
            let node_modules = std::path::Path::new(root).join("node_modules");
            if let Err(e) = bin_links::rebuild_bin_links(&node_modules) {
                warnings.push(Warning::general(format!("bin linking incomplete: {}", e)));
            }
        }

        InstallResult { success: errors.is_empty(), installed, warnings, errors, duration: start.elapsed() }
    }

    fn materialize(&self, dep: &FlatDependency) -> Result<(), PmError> {
        let extracted = match self.cache.get(&dep.name, &dep.version) {
            Some(pkg) => pkg,
            None => {
                let bytes = self.registry.download_tarball(&dep.resolved.tarball_url)?;
                if !dep.integrity.is_empty() {
                    let ok = self.registry.verify_integrity(&bytes, &dep.integrity, self.config.strict_integrity)?;
                    if !ok {
                        log::log_error(&format!("{}@{}: integrity check failed (non-strict, continuing)", dep.name, dep.version));
                    }
                }
                let pkg = extract::extract(&bytes, &dep.name, &dep.version, &dep.resolved.tarball_url, &dep.integrity)?;
                self.cache.set(pkg.clone());
                pkg
            }
        };

        for (relative, contents) in &extracted.files {
            if !extract::include_in_filesystem(relative) {
                continue;
            }
            let dest = crate::fs::join_package_path(&dep.path, relative);
            self.fs.write_file(&dest, contents)?;
        }
        Ok(())
    }

    fn emit_progress(&self, options: &InstallOptions, phase: Phase, current: usize, total: usize, package: Option<String>, message: Option<String>) {
        if let Some(cb) = &options.on_progress {
            cb(ProgressEvent { phase, current, total, package, message });
        }
    }

    /// Removes `packages` from the manifest's dependency maps, deletes
    /// their `node_modules/<name>` directories, and reruns `install` with
    /// `no_save` to regenerate the lockfile against the shrunk manifest
    /// (spec §4.8).
    pub fn uninstall(&self, packages: &[String]) -> InstallResult {
        let start = Instant::now();
        let mut manifest = self.read_manifest();
        let mut errors = Vec::new();

        if let Some(obj) = manifest.as_object_mut() {
            for field in ["dependencies", "devDependencies"] {
                if let Some(deps) = obj.get_mut(field).and_then(|v| v.as_object_mut()) {
                    for name in packages {
                        deps.remove(name);
                    }
                }
            }
        }
        if let Err(e) = self.write_manifest(&manifest) {
            errors.push(e);
        }

        for name in packages {
            let path = format!("node_modules/{}", name);
            if let Err(e) = self.fs.rmdir(&path, true) {
                errors.push(e);
            }
        }

        let mut result = self.install(None, InstallOptions { no_save: true, ..InstallOptions::default() });
        result.errors.splice(0..0, errors);
        result.success = result.errors.is_empty();
        result.duration = start.elapsed();
        result
    }

    /// Walks `node_modules`, reading each package's manifest. Scoped
    /// packages (`@scope/...`) are enumerated one directory level deeper
    /// (spec §4.8).
    pub fn list(&self) -> Result<Vec<ListedPackage>, PmError> {
        let mut out = Vec::new();
        let top = match self.fs.readdir("node_modules") {
            Ok(names) => names,
            Err(_) => return Ok(out),
        };

        for name in top {
            if name == ".bin" || name.starts_with('.') {
                continue;
            }
            if let Some(scope) = name.strip_prefix('@') {
                let _ = scope;
                let scope_path = format!("node_modules/{}", name);
                if let Ok(children) = self.fs.readdir(&scope_path) {
                    for child in children {
                        let path = format!("{}/{}", scope_path, child);
                        if let Some(pkg) = self.read_listed_package(&path) {
                            out.push(pkg);
                        }
                    }
                }
                continue;
            }
            let path = format!("node_modules/{}", name);
            if let Some(pkg) = self.read_listed_package(&path) {
                out.push(pkg);
            }
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn read_listed_package(&self, path: &str) -> Option<ListedPackage> {
        let manifest_path = format!("{}/package.json", path);
        let bytes = self.fs.read_file(&manifest_path).ok()?;
        let manifest: Value = serde_json::from_slice(&bytes).ok()?;
        let name = manifest.get("name").and_then(|v| v.as_str())?.to_string();
        let version = manifest.get("version").and_then(|v| v.as_str()).unwrap_or("0.0.0").to_string();
        Some(ListedPackage { name, version, path: path.to_string() })
    }

    /// `run` is recorded only (spec §1/§4.8): the PM does not provide a
    /// shell. This confirms the script exists in the manifest and returns
    /// its recorded command string, or `ScriptError` if absent.
    pub fn run(&self, script_name: &str) -> Result<String, PmError> {
        let manifest = self.read_manifest();
        run::record_script_request(&manifest, script_name)
    }
}

fn default_manifest() -> Value {
    serde_json::json!({ "name": "project", "version": "1.0.0", "dependencies": {}, "devDependencies": {} })
}

fn manifest_dependency_set(manifest: &Value, production: bool) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(deps) = manifest.get("dependencies").and_then(|v| v.as_object()) {
        for (k, v) in deps {
            if let Some(s) = v.as_str() {
                out.insert(k.clone(), s.to_string());
            }
        }
    }
    if !production {
        if let Some(deps) = manifest.get("devDependencies").and_then(|v| v.as_object()) {
            for (k, v) in deps {
                if let Some(s) = v.as_str() {
                    out.insert(k.clone(), s.to_string());
                }
            }
        }
    }
    out
}

/// Parses an install argument `<name>@<rangeOrTag>` (default `latest`),
/// handling scoped names whose own leading `@` must not be mistaken for the
/// name/range separator (spec §4.8).
fn parse_install_spec(spec: &str) -> (String, String) {
    let (name_part, rest) = if let Some(stripped) = spec.strip_prefix('@') {
        match stripped.find('@') {
            Some(idx) => (&spec[..idx + 1], Some(&stripped[idx + 1..])),
            None => (spec, None),
        }
    } else {
        match spec.find('@') {
            Some(idx) => (&spec[..idx], Some(&spec[idx + 1..])),
            None => (spec, None),
        }
    };
    let range = rest.filter(|s| !s.is_empty()).unwrap_or("latest");
    (name_part.to_string(), range.to_string())
}

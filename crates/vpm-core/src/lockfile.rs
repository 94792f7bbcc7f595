//! Lockfile codec (C7): parse npm lockfile v2/v3 (plus a legacy v1 nested
//! fallback), generate v3, and a handful of auxiliary queries used by the
//! orchestrator and `doctor`-style tooling (spec §4.7).
//!
//! Grounded on the teacher's `lockfile.rs`, which read `package-lock.json`
//! off disk into plain `HashMap<String, String>`s for its own install
//! planner; here the parser keeps the full per-entry structure (`resolved`,
//! `integrity`, `dev`, `optional`, declared deps) the spec's lockfile data
//! model calls for, and a generator is added since the teacher never wrote
//! one (it shelled out to `npm install` for that).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Warning;
use crate::hoist::FlatDependency;

/// One entry in a lockfile's flat `packages` map (spec §3). The root entry
/// (path `""`) only ever has `version` (and implicitly no `resolved`/
/// `integrity`, since the root isn't a fetched tarball).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockfileEntry {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<HashMap<String, String>>,
    #[serde(rename = "peerDependencies", skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<HashMap<String, String>>,
}

/// A parsed or generated lockfile (spec §3). `packages[""]` is the project
/// root entry; every other key is a `node_modules/...` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lockfile {
    pub name: String,
    pub version: String,
    pub lockfile_version: u32,
    pub packages: HashMap<String, LockfileEntry>,
}

impl Lockfile {
    pub fn empty(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into(), lockfile_version: 3, packages: HashMap::new() }
    }
}

/// Parses a lockfile JSON value. Non-object input yields an empty lockfile
/// plus a warning; `strict` turns that into a hard failure instead (spec
/// §4.7/§7).
pub fn parse_lockfile(value: &Value, strict: bool) -> Result<(Lockfile, Vec<Warning>), Warning> {
    let mut warnings = Vec::new();

    let Some(obj) = value.as_object() else {
        let msg = "lockfile is not a JSON object".to_string();
        if strict {
            return Err(Warning::general(msg));
        }
        warnings.push(Warning::general(format!("{}; using an empty lockfile", msg)));
        return Ok((Lockfile::empty("", "0.0.0"), warnings));
    };

    let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let version = obj.get("version").and_then(|v| v.as_str()).unwrap_or("0.0.0").to_string();
    let lockfile_version = obj.get("lockfileVersion").and_then(|v| v.as_u64()).unwrap_or(3) as u32;

    let mut packages = HashMap::new();
    if let Some(pkgs) = obj.get("packages").and_then(|v| v.as_object()) {
        for (path, entry_value) in pkgs {
            packages.insert(path.clone(), parse_entry(entry_value, path, &mut warnings));
        }
    } else if let Some(deps) = obj.get("dependencies").and_then(|v| v.as_object()) {
        flatten_legacy_dependencies(deps, "", &mut packages, &mut warnings);
        packages.entry(String::new()).or_insert_with(|| LockfileEntry { version: version.clone(), ..Default::default() });
    } else {
        packages.insert(String::new(), LockfileEntry { version: version.clone(), ..Default::default() });
    }

    Ok((Lockfile { name, version, lockfile_version, packages }, warnings))
}

fn parse_entry(value: &Value, path: &str, warnings: &mut Vec<Warning>) -> LockfileEntry {
    let Some(obj) = value.as_object() else {
        warnings.push(Warning::general(format!("{}: entry is not an object, defaulting version", path)));
        return LockfileEntry { version: "0.0.0".to_string(), ..Default::default() };
    };

    let version = match obj.get("version").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => {
            warnings.push(Warning::general(format!("{}: missing version, defaulting to 0.0.0", path)));
            "0.0.0".to_string()
        }
    };

    LockfileEntry {
        version,
        resolved: obj.get("resolved").and_then(|v| v.as_str()).map(String::from),
        integrity: obj.get("integrity").and_then(|v| v.as_str()).map(String::from),
        dev: obj.get("dev").and_then(|v| v.as_bool()),
        optional: obj.get("optional").and_then(|v| v.as_bool()),
        dependencies: obj.get("dependencies").and_then(|v| v.as_object()).map(string_map),
        peer_dependencies: obj.get("peerDependencies").and_then(|v| v.as_object()).map(string_map),
    }
}

fn string_map(obj: &Map<String, Value>) -> HashMap<String, String> {
    obj.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

/// Flattens a v1 nested `dependencies` object into v3's flat `packages` map,
/// following the nesting rule `(parentPath ? parentPath +
/// "/node_modules/" + name : "node_modules/" + name)` (spec §4.7).
fn flatten_legacy_dependencies(
    deps: &Map<String, Value>,
    parent_path: &str,
    packages: &mut HashMap<String, LockfileEntry>,
    warnings: &mut Vec<Warning>,
) {
    for (name, entry_value) in deps {
        let path = if parent_path.is_empty() {
            format!("node_modules/{}", name)
        } else {
            format!("{}/node_modules/{}", parent_path, name)
        };
        packages.insert(path.clone(), parse_entry(entry_value, &path, warnings));
        if let Some(nested) = entry_value.get("dependencies").and_then(|v| v.as_object()) {
            flatten_legacy_dependencies(nested, &path, packages, warnings);
        }
    }
}

/// Generates a v3 lockfile from a project's name/version and a hoisted flat
/// dependency set. The root entry (`""`) carries the project's own
/// name/version; every other key is the flat map's path unchanged.
pub fn generate_lockfile(
    name: &str,
    version: &str,
    flat: &HashMap<String, FlatDependency>,
) -> Lockfile {
    let mut packages = HashMap::new();
    packages.insert(String::new(), LockfileEntry { version: version.to_string(), ..Default::default() });

    for (path, dep) in flat {
        let dependencies = if dep.resolved.dependencies.is_empty() {
            None
        } else {
            Some(dep.resolved.dependencies.clone())
        };
        let peer_dependencies = if dep.resolved.peer_dependencies.is_empty() {
            None
        } else {
            Some(dep.resolved.peer_dependencies.clone())
        };
        packages.insert(
            path.clone(),
            LockfileEntry {
                version: dep.version.clone(),
                resolved: Some(dep.resolved.tarball_url.clone()),
                integrity: if dep.integrity.is_empty() { None } else { Some(dep.integrity.clone()) },
                dev: None,
                optional: None,
                dependencies,
                peer_dependencies,
            },
        );
    }

    Lockfile { name: name.to_string(), version: version.to_string(), lockfile_version: 3, packages }
}

/// Serializes a `Lockfile` to its v3 JSON `Value`, in field order matching
/// npm's own generator (`name`, `version`, `lockfileVersion`, `packages`).
pub fn lockfile_to_json(lockfile: &Lockfile) -> Value {
    let mut packages = Map::new();
    let mut keys: Vec<&String> = lockfile.packages.keys().collect();
    keys.sort();
    for key in keys {
        let entry = &lockfile.packages[key];
        packages.insert(key.clone(), entry_to_json(entry));
    }

    serde_json::json!({
        "name": lockfile.name,
        "version": lockfile.version,
        "lockfileVersion": lockfile.lockfile_version,
        "packages": Value::Object(packages),
    })
}

fn entry_to_json(entry: &LockfileEntry) -> Value {
    let mut obj = Map::new();
    obj.insert("version".to_string(), Value::String(entry.version.clone()));
    if let Some(r) = &entry.resolved {
        obj.insert("resolved".to_string(), Value::String(r.clone()));
    }
    if let Some(i) = &entry.integrity {
        obj.insert("integrity".to_string(), Value::String(i.clone()));
    }
    if let Some(d) = entry.dev {
        obj.insert("dev".to_string(), Value::Bool(d));
    }
    if let Some(o) = entry.optional {
        obj.insert("optional".to_string(), Value::Bool(o));
    }
    if let Some(deps) = &entry.dependencies {
        obj.insert("dependencies".to_string(), string_map_to_json(deps));
    }
    if let Some(deps) = &entry.peer_dependencies {
        obj.insert("peerDependencies".to_string(), string_map_to_json(deps));
    }
    Value::Object(obj)
}

fn string_map_to_json(map: &HashMap<String, String>) -> Value {
    let mut obj = Map::new();
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    for key in keys {
        obj.insert(key.clone(), Value::String(map[key].clone()));
    }
    Value::Object(obj)
}

/// Stable 2-space-indented pretty-printed JSON for writing `package-lock.json`.
pub fn to_pretty_string(lockfile: &Lockfile) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&lockfile_to_json(lockfile))
}

/// Derives a package name from a `node_modules/...` path, per spec §4.7's
/// `node_modules/(@scope/name|name)$` extraction rule: the segment after
/// the last `node_modules/` occurrence.
pub fn package_name_from_path(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    path.rsplit("node_modules/").next().map(String::from).filter(|s| !s.is_empty())
}

/// The flat dependency set implied by a lockfile, keyed by path: derives
/// each entry's package name from its path (spec §4.7's auxiliary
/// operation).
pub fn extract_flat_dependencies(lockfile: &Lockfile) -> HashMap<String, (String, LockfileEntry)> {
    let mut out = HashMap::new();
    for (path, entry) in &lockfile.packages {
        if path.is_empty() {
            continue;
        }
        if let Some(name) = package_name_from_path(path) {
            out.insert(path.clone(), (name, entry.clone()));
        }
    }
    out
}

/// True if `lockfile` pins any path whose derived package name is `name`.
pub fn has_package(lockfile: &Lockfile, name: &str) -> bool {
    extract_flat_dependencies(lockfile).values().any(|(n, _)| n == name)
}

/// All versions of `name` pinned anywhere in `lockfile` (distinct, unsorted).
pub fn get_package_versions(lockfile: &Lockfile, name: &str) -> Vec<String> {
    let mut versions: Vec<String> = extract_flat_dependencies(lockfile)
        .values()
        .filter(|(n, _)| n == name)
        .map(|(_, e)| e.version.clone())
        .collect();
    versions.sort();
    versions.dedup();
    versions
}

/// Key-wise union of two lockfiles: `update`'s entries win on path
/// conflicts, and `lockfileVersion` is the max of the two (spec §4.7).
pub fn merge_lockfiles(base: &Lockfile, update: &Lockfile) -> Lockfile {
    let mut packages = base.packages.clone();
    for (path, entry) in &update.packages {
        packages.insert(path.clone(), entry.clone());
    }
    Lockfile {
        name: if update.name.is_empty() { base.name.clone() } else { update.name.clone() },
        version: if update.version.is_empty() { base.version.clone() } else { update.version.clone() },
        lockfile_version: base.lockfile_version.max(update.lockfile_version),
        packages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolvedPackage;

    fn flat_dep(name: &str, version: &str) -> FlatDependency {
        FlatDependency {
            name: name.to_string(),
            version: version.to_string(),
            resolved: ResolvedPackage {
                name: name.to_string(),
                version: version.to_string(),
                tarball_url: format!("https://registry.example/{}-{}.tgz", name, version),
                integrity: "sha256-x".to_string(),
                dependencies: HashMap::new(),
                peer_dependencies: HashMap::new(),
            },
            integrity: "sha256-x".to_string(),
            path: format!("node_modules/{}", name),
        }
    }

    #[test]
    fn generate_then_parse_round_trips() {
        let mut flat = HashMap::new();
        flat.insert("node_modules/left-pad".to_string(), flat_dep("left-pad", "1.3.0"));
        let generated = generate_lockfile("demo", "1.0.0", &flat);
        let json = lockfile_to_json(&generated);
        let (parsed, warnings) = parse_lockfile(&json, true).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(parsed.name, "demo");
        assert_eq!(parsed.lockfile_version, 3);
        assert_eq!(parsed.packages[""].version, "1.0.0");
        assert_eq!(parsed.packages["node_modules/left-pad"].version, "1.3.0");
    }

    #[test]
    fn non_object_input_is_a_warning_not_strict() {
        let (lockfile, warnings) = parse_lockfile(&Value::Null, false).unwrap();
        assert_eq!(lockfile.packages.len(), 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn non_object_input_is_fatal_in_strict_mode() {
        assert!(parse_lockfile(&Value::Null, true).is_err());
    }

    #[test]
    fn legacy_v1_nested_dependencies_flatten_to_v3_paths() {
        let json = serde_json::json!({
            "name": "p",
            "version": "1.0.0",
            "dependencies": {
                "x": {
                    "version": "1.2.3",
                    "dependencies": {
                        "y": { "version": "2.0.0" }
                    }
                }
            }
        });
        let (lockfile, _) = parse_lockfile(&json, true).unwrap();
        assert_eq!(lockfile.packages["node_modules/x"].version, "1.2.3");
        assert_eq!(lockfile.packages["node_modules/x/node_modules/y"].version, "2.0.0");
    }

    #[test]
    fn package_name_from_path_handles_scoped_and_nested() {
        assert_eq!(package_name_from_path("node_modules/left-pad"), Some("left-pad".to_string()));
        assert_eq!(package_name_from_path("node_modules/@scope/name"), Some("@scope/name".to_string()));
        assert_eq!(
            package_name_from_path("node_modules/a/node_modules/@scope/b"),
            Some("@scope/b".to_string())
        );
        assert_eq!(package_name_from_path(""), None);
    }

    #[test]
    fn merge_prefers_update_entries_on_conflict() {
        let mut flat_a = HashMap::new();
        flat_a.insert("node_modules/x".to_string(), flat_dep("x", "1.0.0"));
        let base = generate_lockfile("p", "1.0.0", &flat_a);

        let mut flat_b = HashMap::new();
        flat_b.insert("node_modules/x".to_string(), flat_dep("x", "2.0.0"));
        flat_b.insert("node_modules/y".to_string(), flat_dep("y", "1.0.0"));
        let update = generate_lockfile("p", "1.0.0", &flat_b);

        let merged = merge_lockfiles(&base, &update);
        assert_eq!(merged.packages["node_modules/x"].version, "2.0.0");
        assert_eq!(merged.packages["node_modules/y"].version, "1.0.0");
    }

    #[test]
    fn has_package_and_get_versions() {
        let mut flat = HashMap::new();
        flat.insert("node_modules/x".to_string(), flat_dep("x", "1.0.0"));
        flat.insert("node_modules/a/node_modules/x".to_string(), flat_dep("x", "2.0.0"));
        let lockfile = generate_lockfile("p", "1.0.0", &flat);

        assert!(has_package(&lockfile, "x"));
        assert!(!has_package(&lockfile, "missing"));
        assert_eq!(get_package_versions(&lockfile, "x"), vec!["1.0.0".to_string(), "2.0.0".to_string()]);
    }
}

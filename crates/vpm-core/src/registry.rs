//! Registry client (C2): metadata fetch with an in-memory TTL cache and
//! ETag-conditional refetch, tarball download, and SRI verification.
//! Generalizes the teacher's `registry.rs`, which did the same ETag dance
//! against a disk-backed packument cache and used the `semver` crate for
//! range resolution; here resolution goes through `crate::semver` instead,
//! since npm's range grammar needs hyphen ranges and `||` that
//! `semver::VersionReq` can't express.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cas::integrity;
use crate::config::Config;
use crate::error::PmError;
use crate::semver::{self, Range, Version};
use crate::transport::{ConditionalResponse, ResourceKind, Transport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dist {
    pub tarball: String,
    pub integrity: Option<String>,
    pub shasum: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub dist: Dist,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: HashMap<String, String>,
    #[serde(default)]
    pub bin: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    #[serde(default)]
    pub versions: HashMap<String, VersionInfo>,
}

struct CacheEntry {
    metadata: PackageMetadata,
    cached_at: Instant,
    etag: Option<String>,
}

/// Fetches package metadata and tarballs from an npm-compatible registry,
/// caching packuments in memory for `config.metadata_ttl`.
pub struct RegistryClient {
    config: Config,
    transport: Transport,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl RegistryClient {
    pub fn new(config: Config) -> Self {
        Self { config, transport: Transport::new(), cache: Mutex::new(HashMap::new()) }
    }

    fn url_for_package(&self, name: &str) -> String {
        let encoded = if let Some(rest) = name.strip_prefix('@') {
            format!("@{}", rest.replacen('/', "%2F", 1))
        } else {
            name.to_string()
        };
        format!("{}/{}", self.config.registry_url.trim_end_matches('/'), encoded)
    }

    /// Fetches `PackageMetadata` for `name`, serving a TTL-fresh cache hit
    /// from memory and otherwise conditionally refetching (spec §4.2).
    pub fn get_package_metadata(&self, name: &str) -> Result<PackageMetadata, PmError> {
        let fresh_cached = {
            let cache = self.cache.lock().unwrap();
            cache.get(name).and_then(|entry| {
                if entry.cached_at.elapsed() < self.config.metadata_ttl {
                    Some(entry.metadata.clone())
                } else {
                    None
                }
            })
        };
        if let Some(metadata) = fresh_cached {
            return Ok(metadata);
        }

        let url = self.url_for_package(name);
        let prior_etag = {
            let cache = self.cache.lock().unwrap();
            cache.get(name).and_then(|e| e.etag.clone())
        };

        let resp = self.transport.get_conditional(&url, prior_etag.as_deref(), self.config.auth_token.as_deref())?;

        match resp {
            ConditionalResponse::NotModified => {
                let mut cache = self.cache.lock().unwrap();
                if let Some(entry) = cache.get_mut(name) {
                    entry.cached_at = Instant::now();
                    Ok(entry.metadata.clone())
                } else {
                    Err(PmError::PackageNotFound { package: name.to_string() })
                }
            }
            ConditionalResponse::Fresh { body, etag } => {
                if body.is_empty() {
                    return Err(PmError::PackageNotFound { package: name.to_string() });
                }
                let metadata: PackageMetadata = serde_json::from_slice(&body).map_err(|e| PmError::InvalidPackageJson {
                    path: Some(url.clone()),
                    message: e.to_string(),
                })?;
                let mut cache = self.cache.lock().unwrap();
                cache.insert(
                    name.to_string(),
                    CacheEntry { metadata: metadata.clone(), cached_at: Instant::now(), etag },
                );
                Ok(metadata)
            }
        }
    }

    /// Resolves `version_or_tag` against `metadata`, trying dist-tags first
    /// and otherwise treating it as a SemVer range and picking the highest
    /// satisfying version.
    pub fn get_version_info<'a>(
        &self,
        metadata: &'a PackageMetadata,
        version_or_tag: &str,
    ) -> Result<&'a VersionInfo, PmError> {
        if let Some(v) = metadata.dist_tags.get(version_or_tag) {
            return metadata.versions.get(v).ok_or_else(|| PmError::VersionNotFound {
                package: metadata.name.clone(),
                range: version_or_tag.to_string(),
            });
        }

        let range = semver::parse_range(version_or_tag).map_err(|_| PmError::VersionNotFound {
            package: metadata.name.clone(),
            range: version_or_tag.to_string(),
        })?;
        if let Range::Tag(tag) = &range {
            if let Some(v) = metadata.dist_tags.get(tag) {
                return metadata.versions.get(v).ok_or_else(|| PmError::VersionNotFound {
                    package: metadata.name.clone(),
                    range: version_or_tag.to_string(),
                });
            }
            return Err(PmError::VersionNotFound { package: metadata.name.clone(), range: version_or_tag.to_string() });
        }

        let mut parsed: Vec<(Version, &str)> = Vec::new();
        for key in metadata.versions.keys() {
            if let Ok(v) = semver::parse_version(key) {
                parsed.push((v, key.as_str()));
            }
        }
        let versions: Vec<Version> = parsed.iter().map(|(v, _)| v.clone()).collect();
        let best = semver::max_satisfying(&versions, &range).ok_or_else(|| PmError::VersionNotFound {
            package: metadata.name.clone(),
            range: version_or_tag.to_string(),
        })?;
        let key = parsed.iter().find(|(v, _)| v == best).map(|(_, k)| *k).unwrap();
        metadata.versions.get(key).ok_or_else(|| PmError::VersionNotFound {
            package: metadata.name.clone(),
            range: version_or_tag.to_string(),
        })
    }

    /// Downloads a tarball's raw bytes.
    pub fn download_tarball(&self, url: &str) -> Result<Vec<u8>, PmError> {
        self.transport.get(url, ResourceKind::Tarball, Some("application/octet-stream"), self.config.auth_token.as_deref())
    }

    /// Verifies `bytes` against an `algo-base64` SRI string. Non-strict mode
    /// treats an unparsable integrity string or a hash mismatch as "skip and
    /// report true"; strict mode fails both (spec §6).
    pub fn verify_integrity(&self, bytes: &[u8], sri: &str, strict: bool) -> Result<bool, PmError> {
        match integrity::IntegrityHash::parse(sri) {
            Some(hash) => {
                let ok = hash.verify(bytes);
                if !ok && strict {
                    return Err(PmError::IntegrityError {
                        package: None,
                        message: format!("integrity mismatch against {}", sri),
                    });
                }
                Ok(ok)
            }
            None => {
                if strict {
                    Err(PmError::IntegrityError { package: None, message: format!("unparsable integrity string: {}", sri) })
                } else {
                    Ok(true)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> PackageMetadata {
        let mut versions = HashMap::new();
        versions.insert(
            "1.0.0".to_string(),
            VersionInfo {
                version: "1.0.0".to_string(),
                dist: Dist { tarball: "https://registry.example/left-pad/-/left-pad-1.0.0.tgz".to_string(), integrity: None, shasum: None },
                dependencies: HashMap::new(),
                peer_dependencies: HashMap::new(),
                bin: None,
            },
        );
        versions.insert(
            "1.4.0".to_string(),
            VersionInfo {
                version: "1.4.0".to_string(),
                dist: Dist { tarball: "https://registry.example/left-pad/-/left-pad-1.4.0.tgz".to_string(), integrity: None, shasum: None },
                dependencies: HashMap::new(),
                peer_dependencies: HashMap::new(),
                bin: None,
            },
        );
        versions.insert(
            "2.0.0-beta.1".to_string(),
            VersionInfo {
                version: "2.0.0-beta.1".to_string(),
                dist: Dist { tarball: "https://registry.example/left-pad/-/left-pad-2.0.0-beta.1.tgz".to_string(), integrity: None, shasum: None },
                dependencies: HashMap::new(),
                peer_dependencies: HashMap::new(),
                bin: None,
            },
        );
        let mut dist_tags = HashMap::new();
        dist_tags.insert("latest".to_string(), "1.4.0".to_string());
        dist_tags.insert("next".to_string(), "2.0.0-beta.1".to_string());
        PackageMetadata { name: "left-pad".to_string(), dist_tags, versions }
    }

    #[test]
    fn scoped_package_url_encodes_slash() {
        let client = RegistryClient::new(Config::default());
        assert_eq!(
            client.url_for_package("@scope/name"),
            "https://registry.npmjs.org/@scope%2Fname"
        );
    }

    #[test]
    fn tag_resolution_prefers_dist_tags() {
        let client = RegistryClient::new(Config::default());
        let metadata = sample_metadata();
        let info = client.get_version_info(&metadata, "latest").unwrap();
        assert_eq!(info.version, "1.4.0");
        let info2 = client.get_version_info(&metadata, "next").unwrap();
        assert_eq!(info2.version, "2.0.0-beta.1");
    }

    #[test]
    fn range_resolution_picks_highest_satisfying() {
        let client = RegistryClient::new(Config::default());
        let metadata = sample_metadata();
        let info = client.get_version_info(&metadata, "^1.0.0").unwrap();
        assert_eq!(info.version, "1.4.0");
    }

    #[test]
    fn unknown_tag_is_version_not_found() {
        let client = RegistryClient::new(Config::default());
        let metadata = sample_metadata();
        assert!(client.get_version_info(&metadata, "nightly").is_err());
    }

    #[test]
    fn integrity_strict_fails_on_mismatch_non_strict_skips() {
        let client = RegistryClient::new(Config::default());
        let content = b"hello";
        let good = integrity::compute_integrity(content);
        assert!(client.verify_integrity(content, &good, true).unwrap());

        let bad = "sha256-not-a-real-hash==";
        assert!(client.verify_integrity(content, bad, false).unwrap());
        assert!(client.verify_integrity(content, bad, true).is_err());
    }
}

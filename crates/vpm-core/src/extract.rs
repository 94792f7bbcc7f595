//! Tar+gzip extractor (C3): decompress an npm tarball into an in-memory file
//! map plus its parsed manifest. Built on the `tar`/`flate2` crates the
//! teacher's `registry::extract_tarball_to_dir` used to unpack onto disk;
//! here entries are collected into memory instead of written out, since the
//! spec's extractor feeds a cache rather than the filesystem directly.

use std::collections::HashMap;
use std::io::Read;
use std::time::Instant;

use flate2::read::GzDecoder;

use crate::error::PmError;

/// A fully extracted package: the in-memory file map, its parsed manifest,
/// and the cache bookkeeping fields (`cached_at`/`last_used`) the two-tier
/// cache (C4) stamps on insert and touches on access.
#[derive(Debug, Clone)]
pub struct ExtractedPackage {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
    pub integrity: String,
    pub files: HashMap<String, Vec<u8>>,
    pub manifest: serde_json::Value,
    pub total_size: u64,
    pub cached_at: Instant,
    pub last_used: Instant,
}

impl ExtractedPackage {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Strips npm's conventional `package/` tarball-root prefix from an archive
/// path, if present.
fn strip_package_prefix(path: &str) -> String {
    path.strip_prefix("package/").unwrap_or(path).to_string()
}

/// Decompresses and unpacks a gzipped tar archive, returning the file map
/// and parsed `package.json` manifest. Fails with `TarballError` on a
/// corrupt gzip/tar stream, `InvalidPackageJson` on a missing or unparsable
/// manifest.
pub fn extract(
    bytes: &[u8],
    name: &str,
    version: &str,
    tarball_url: &str,
    integrity: &str,
) -> Result<ExtractedPackage, PmError> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);

    let mut files: HashMap<String, Vec<u8>> = HashMap::new();
    let mut total_size: u64 = 0;

    let entries = archive.entries().map_err(|e| PmError::TarballError { message: e.to_string() })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| PmError::TarballError { message: e.to_string() })?;
        let header = entry.header();
        if header.entry_type().is_dir() {
            continue;
        }
        if !header.entry_type().is_file() {
            continue;
        }
        let path = entry.path().map_err(|e| PmError::TarballError { message: e.to_string() })?;
        let raw_path = path.to_string_lossy().replace('\\', "/");
        let relative = strip_package_prefix(&raw_path);
        if relative.is_empty() {
            continue;
        }

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(|e| PmError::TarballError { message: e.to_string() })?;
        total_size += buf.len() as u64;
        files.insert(relative, buf);
    }

    let manifest_bytes = files.get("package.json").ok_or_else(|| PmError::InvalidPackageJson {
        path: Some("package.json".to_string()),
        message: "tarball has no package.json at its root".to_string(),
    })?;
    let manifest: serde_json::Value = serde_json::from_slice(manifest_bytes).map_err(|e| PmError::InvalidPackageJson {
        path: Some("package.json".to_string()),
        message: e.to_string(),
    })?;

    let now = Instant::now();
    Ok(ExtractedPackage {
        name: name.to_string(),
        version: version.to_string(),
        tarball_url: tarball_url.to_string(),
        integrity: integrity.to_string(),
        files,
        manifest,
        total_size,
        cached_at: now,
        last_used: now,
    })
}

/// Excludes common irrelevant entries (VCS metadata, tests, lint configs,
/// source maps, docs) when materialising files to the filesystem. Policy
/// only: the cache always stores the full extracted set regardless of this
/// predicate (spec §4.3).
pub fn include_in_filesystem(relative_path: &str) -> bool {
    const EXCLUDED_DIRS: &[&str] = &[".git/", "test/", "tests/", "__tests__/", ".github/"];
    const EXCLUDED_NAMES: &[&str] = &[
        ".gitignore",
        ".eslintrc",
        ".eslintrc.json",
        ".eslintrc.js",
        ".npmignore",
        ".travis.yml",
        "README.md",
        "readme.md",
        "CHANGELOG.md",
        "changelog.md",
        "LICENSE",
        "LICENSE.md",
        "license",
    ];

    if EXCLUDED_DIRS.iter().any(|d| relative_path.starts_with(d) || relative_path.contains(&format!("/{}", d))) {
        return false;
    }
    if relative_path.ends_with(".map") {
        return false;
    }
    let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    if EXCLUDED_NAMES.contains(&file_name) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, format!("package/{}", path), *content).unwrap();
        }
        let gz = builder.into_inner().unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn extracts_files_and_manifest_stripping_package_prefix() {
        let manifest = br#"{"name":"foo","version":"1.0.0"}"#;
        let index = b"0123456789";
        let bytes = build_tarball(&[("package.json", manifest), ("index.js", index)]);

        let pkg = extract(&bytes, "foo", "1.0.0", "https://registry.example/foo.tgz", "sha256-x").unwrap();
        assert_eq!(pkg.file_count(), 2);
        assert_eq!(pkg.files.get("package.json").unwrap().as_slice(), manifest);
        assert_eq!(pkg.files.get("index.js").unwrap().as_slice(), index);
        assert_eq!(pkg.total_size, (manifest.len() + index.len()) as u64);
        assert_eq!(pkg.manifest["name"], "foo");
    }

    #[test]
    fn missing_manifest_is_invalid_package_json() {
        let bytes = build_tarball(&[("index.js", b"x")]);
        let err = extract(&bytes, "foo", "1.0.0", "url", "sri").unwrap_err();
        assert_eq!(err.code(), "INVALID_PACKAGE_JSON");
    }

    #[test]
    fn corrupt_gzip_stream_is_tarball_error() {
        let err = extract(b"not gzip data at all", "foo", "1.0.0", "url", "sri").unwrap_err();
        assert_eq!(err.code(), "TARBALL_ERROR");
    }

    #[test]
    fn include_predicate_excludes_vcs_and_docs() {
        assert!(!include_in_filesystem(".git/HEAD"));
        assert!(!include_in_filesystem("README.md"));
        assert!(!include_in_filesystem("dist/index.js.map"));
        assert!(include_in_filesystem("index.js"));
        assert!(include_in_filesystem("package.json"));
    }
}

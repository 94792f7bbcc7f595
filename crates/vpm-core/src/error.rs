//! Structured errors for vpm. One variant per error taxonomy code (spec §6/§7).
//!
//! Fatal errors (`PmError`) abort the operation that raised them. Per-dependency
//! failures that the spec treats as recoverable surface instead as a `Warning`
//! collected onto the caller's result record, never as a thrown error.

use std::fmt;

/// One error taxonomy code from spec §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PmError {
    PackageNotFound { package: String },
    VersionNotFound { package: String, range: String },
    NetworkError { url: String, message: String },
    TarballError { message: String },
    IntegrityError { package: Option<String>, message: String },
    InvalidPackageJson { path: Option<String>, message: String },
    ResolutionLimit { message: String },
    ScriptError { script: String, message: String },
}

impl PmError {
    /// The exact taxonomy code string from spec §6.
    pub fn code(&self) -> &'static str {
        match self {
            PmError::PackageNotFound { .. } => "PACKAGE_NOT_FOUND",
            PmError::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            PmError::NetworkError { .. } => "NETWORK_ERROR",
            PmError::TarballError { .. } => "TARBALL_ERROR",
            PmError::IntegrityError { .. } => "INTEGRITY_ERROR",
            PmError::InvalidPackageJson { .. } => "INVALID_PACKAGE_JSON",
            PmError::ResolutionLimit { .. } => "RESOLUTION_LIMIT",
            PmError::ScriptError { .. } => "SCRIPT_ERROR",
        }
    }
}

impl fmt::Display for PmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PmError::PackageNotFound { package } => {
                write!(f, "{}: package not found: {}", self.code(), package)
            }
            PmError::VersionNotFound { package, range } => {
                write!(f, "{}: no version of {} satisfies {}", self.code(), package, range)
            }
            PmError::NetworkError { url, message } => {
                write!(f, "{}: {} ({})", self.code(), message, url)
            }
            PmError::TarballError { message } => write!(f, "{}: {}", self.code(), message),
            PmError::IntegrityError { package, message } => {
                write!(f, "{}: {}", self.code(), message)?;
                if let Some(p) = package {
                    write!(f, " (package: {})", p)?;
                }
                Ok(())
            }
            PmError::InvalidPackageJson { path, message } => {
                write!(f, "{}: {}", self.code(), message)?;
                if let Some(p) = path {
                    write!(f, " (path: {})", p)?;
                }
                Ok(())
            }
            PmError::ResolutionLimit { message } => write!(f, "{}: {}", self.code(), message),
            PmError::ScriptError { script, message } => {
                write!(f, "{}: {} (script: {})", self.code(), message, script)
            }
        }
    }
}

impl std::error::Error for PmError {}

/// A recoverable, per-dependency failure. Collected onto an install result's
/// `warnings` list rather than aborting the operation (spec §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub package: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn new(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self { package: Some(package.into()), message: message.into() }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self { package: None, message: message.into() }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(p) => write!(f, "{}: {}", p, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

//! Crypto capability (spec §6): SRI integrity hashing and verification.

pub mod integrity;

pub use integrity::{
    compare_integrity, compute_integrity, compute_integrity_sha512, verify_integrity,
    verify_integrity_strict, HashAlgorithm, IntegrityHash,
};

//! SemVer 2.0.0 parsing, precedence, and npm's richer range syntax (C1).
//!
//! npm ranges go beyond what `semver::VersionReq` parses — hyphen ranges,
//! `||` alternatives, and dist-tags aren't expressible in that crate's
//! comparator grammar — so this module is hand-written rather than built on
//! the `semver` crate, matching the comparator-set model the registry
//! actually uses on the wire.

use std::cmp::Ordering;
use std::fmt;

use crate::error::PmError;

/// A parsed SemVer 2.0.0 version.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<Identifier>,
    pub build: Vec<String>,
}

/// A single dot-separated prerelease identifier: numeric identifiers compare
/// numerically, alphanumeric ones compare lexically (SemVer 2.0.0 §11).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Numeric(u64),
    Alphanumeric(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{}", n),
            Identifier::Alphanumeric(s) => write!(f, "{}", s),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            (Identifier::Alphanumeric(a), Identifier::Alphanumeric(b)) => a.cmp(b),
            (Identifier::Numeric(_), Identifier::Alphanumeric(_)) => Ordering::Less,
            (Identifier::Alphanumeric(_), Identifier::Numeric(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-")?;
            for (i, id) in self.prerelease.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{}", id)?;
            }
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                (true, true) => Ordering::Equal,
                // a version with a prerelease has LOWER precedence than one without
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.prerelease.cmp(&other.prerelease),
            })
    }
}

/// Parses a strict `major.minor.patch[-prerelease][+build]` version.
pub fn parse_version(input: &str) -> Result<Version, PmError> {
    let bad = || PmError::InvalidPackageJson {
        path: None,
        message: format!("not a valid semver version: {}", input),
    };

    let (core_and_pre, build) = match input.split_once('+') {
        Some((a, b)) => (a, Some(b.to_string())),
        None => (input, None),
    };
    let (core, pre) = match core_and_pre.split_once('-') {
        Some((a, b)) => (a, Some(b.to_string())),
        None => (core_and_pre, None),
    };

    let mut parts = core.split('.');
    let major = parts.next().ok_or_else(bad)?.parse::<u64>().map_err(|_| bad())?;
    let minor = parts.next().ok_or_else(bad)?.parse::<u64>().map_err(|_| bad())?;
    let patch = parts.next().ok_or_else(bad)?.parse::<u64>().map_err(|_| bad())?;
    if parts.next().is_some() {
        return Err(bad());
    }

    let prerelease = match pre {
        Some(p) if !p.is_empty() => p
            .split('.')
            .map(|id| {
                if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                    Identifier::Numeric(id.parse().unwrap_or(0))
                } else {
                    Identifier::Alphanumeric(id.to_string())
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let build = match build {
        Some(b) if !b.is_empty() => b.split('.').map(|s| s.to_string()).collect(),
        _ => Vec::new(),
    };

    Ok(Version { major, minor, patch, prerelease, build })
}

/// Compares two version strings, returning `None` if either fails to parse.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let va = parse_version(a).ok()?;
    let vb = parse_version(b).ok()?;
    Some(va.cmp(&vb))
}

/// One `op value` comparator, e.g. `>=1.2.3`.
#[derive(Debug, Clone)]
struct Comparator {
    op: Op,
    version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Exact,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    fn matches(&self, v: &Version) -> bool {
        let ord = v.cmp(&self.version);
        match self.op {
            Op::Exact => ord == Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Gte => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Lte => ord != Ordering::Greater,
        }
    }
}

/// A parsed npm version range: either a dist-tag (`latest`, `next`, ...) that
/// must be resolved against a packument's `dist-tags` map, or a set of
/// comparator groups joined by `||`, each group being an AND of comparators.
#[derive(Debug, Clone)]
pub enum Range {
    Tag(String),
    Sets(Vec<Vec<Comparator>>),
}

impl Range {
    /// True if a prerelease version should be excluded from this range unless
    /// the range itself references a prerelease on the same `major.minor.patch`
    /// triple (npm's prerelease-opt-in rule).
    fn allows_prerelease_of(&self, v: &Version) -> bool {
        if let Range::Sets(sets) = self {
            for set in sets {
                for c in set {
                    if !c.version.prerelease.is_empty()
                        && c.version.major == v.major
                        && c.version.minor == v.minor
                        && c.version.patch == v.patch
                    {
                        return true;
                    }
                }
            }
        }
        false
    }
}

fn split_numeric_prefix(s: &str) -> Option<(u64, &str)> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok().map(|n| (n, &s[digits.len()..]))
}

/// Parses one `major[.minor[.patch]]` token, returning the numeric parts that
/// were given plus whether any part was `x`/`X`/`*` or entirely absent.
struct PartialVersion {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    prerelease: Vec<Identifier>,
}

fn parse_partial(token: &str) -> Option<PartialVersion> {
    let token = token.trim();
    if token.is_empty() || token == "*" || token.eq_ignore_ascii_case("x") {
        return Some(PartialVersion { major: None, minor: None, patch: None, prerelease: vec![] });
    }
    let (core_and_pre, _build) = match token.split_once('+') {
        Some((a, b)) => (a, Some(b)),
        None => (token, None),
    };
    let (core, pre) = match core_and_pre.split_once('-') {
        Some((a, b)) => (a, Some(b)),
        None => (core_and_pre, None),
    };
    let mut parts = core.split('.');
    let major = match parts.next() {
        Some(p) if p.eq_ignore_ascii_case("x") || p == "*" => None,
        Some(p) => Some(p.parse::<u64>().ok()?),
        None => None,
    };
    let minor = match parts.next() {
        Some(p) if p.eq_ignore_ascii_case("x") || p == "*" => None,
        Some(p) => Some(p.parse::<u64>().ok()?),
        None => None,
    };
    let patch = match parts.next() {
        Some(p) if p.eq_ignore_ascii_case("x") || p == "*" => None,
        Some(p) => Some(p.parse::<u64>().ok()?),
        None => None,
    };
    let prerelease = match pre {
        Some(p) if !p.is_empty() => p
            .split('.')
            .map(|id| {
                if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                    Identifier::Numeric(id.parse().unwrap_or(0))
                } else {
                    Identifier::Alphanumeric(id.to_string())
                }
            })
            .collect(),
        _ => Vec::new(),
    };
    Some(PartialVersion { major, minor, patch, prerelease })
}

fn full_version(major: u64, minor: u64, patch: u64, prerelease: Vec<Identifier>) -> Version {
    Version { major, minor, patch, prerelease, build: Vec::new() }
}

/// Expands one space-separated AND group (already split on whitespace) into
/// comparators, handling `^`, `~`, hyphen ranges, x-ranges, and bare operators.
fn parse_and_group(group: &str) -> Option<Vec<Comparator>> {
    let group = group.trim();
    if group.is_empty() || group == "*" {
        return Some(vec![]);
    }

    // Hyphen range: "1.2.3 - 2.3.4"
    if let Some((lo, hi)) = split_hyphen_range(group) {
        let pv_lo = parse_partial(lo.trim())?;
        let pv_hi = parse_partial(hi.trim())?;
        let lo_version =
            full_version(pv_lo.major.unwrap_or(0), pv_lo.minor.unwrap_or(0), pv_lo.patch.unwrap_or(0), pv_lo.prerelease);
        let gte = Comparator { op: Op::Gte, version: lo_version };
        let lte = match (pv_hi.major, pv_hi.minor, pv_hi.patch) {
            (Some(ma), Some(mi), Some(pa)) => {
                Comparator { op: Op::Lte, version: full_version(ma, mi, pa, pv_hi.prerelease) }
            }
            (Some(ma), Some(mi), None) => {
                Comparator { op: Op::Lt, version: full_version(ma, mi + 1, 0, vec![]) }
            }
            (Some(ma), None, _) => Comparator { op: Op::Lt, version: full_version(ma + 1, 0, 0, vec![]) },
            _ => Comparator { op: Op::Gte, version: full_version(0, 0, 0, vec![]) },
        };
        return Some(vec![gte, lte]);
    }

    let mut comparators = Vec::new();
    for token in group.split_whitespace() {
        comparators.extend(parse_single_comparator(token)?);
    }
    Some(comparators)
}

fn split_hyphen_range(s: &str) -> Option<(&str, &str)> {
    // " - " with surrounding spaces distinguishes this from a bare "-" in a
    // prerelease tag like "1.0.0-alpha - 2.0.0".
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 2 < bytes.len() {
        if bytes[i] == b' ' && bytes[i + 1] == b'-' && bytes[i + 2] == b' ' {
            return Some((&s[..i], &s[i + 3..]));
        }
        i += 1;
    }
    None
}

fn parse_single_comparator(token: &str) -> Option<Vec<Comparator>> {
    let token = token.trim();
    if token.is_empty() {
        return Some(vec![]);
    }

    if let Some(rest) = token.strip_prefix("^") {
        let pv = parse_partial(rest)?;
        let major = pv.major.unwrap_or(0);
        let minor = pv.minor.unwrap_or(0);
        let patch = pv.patch.unwrap_or(0);
        let lo = full_version(major, minor, patch, pv.prerelease);
        let hi = if major > 0 {
            full_version(major + 1, 0, 0, vec![])
        } else if minor > 0 {
            full_version(0, minor + 1, 0, vec![])
        } else if pv.patch.is_some() {
            full_version(0, 0, patch + 1, vec![])
        } else if pv.minor.is_some() {
            full_version(0, 1, 0, vec![])
        } else {
            full_version(1, 0, 0, vec![])
        };
        return Some(vec![
            Comparator { op: Op::Gte, version: lo },
            Comparator { op: Op::Lt, version: hi },
        ]);
    }

    if let Some(rest) = token.strip_prefix("~") {
        let pv = parse_partial(rest)?;
        let major = pv.major.unwrap_or(0);
        let minor = pv.minor.unwrap_or(0);
        let patch = pv.patch.unwrap_or(0);
        let lo = full_version(major, minor, patch, pv.prerelease);
        let hi = if pv.minor.is_some() {
            full_version(major, minor + 1, 0, vec![])
        } else {
            full_version(major + 1, 0, 0, vec![])
        };
        return Some(vec![
            Comparator { op: Op::Gte, version: lo },
            Comparator { op: Op::Lt, version: hi },
        ]);
    }

    let (op, rest) = if let Some(r) = token.strip_prefix(">=") {
        (Op::Gte, r)
    } else if let Some(r) = token.strip_prefix("<=") {
        (Op::Lte, r)
    } else if let Some(r) = token.strip_prefix('>') {
        (Op::Gt, r)
    } else if let Some(r) = token.strip_prefix('<') {
        (Op::Lt, r)
    } else if let Some(r) = token.strip_prefix('=') {
        (Op::Exact, r)
    } else {
        (Op::Exact, token)
    };

    let pv = parse_partial(rest)?;
    match (pv.major, pv.minor, pv.patch) {
        (Some(ma), Some(mi), Some(pa)) => {
            Some(vec![Comparator { op, version: full_version(ma, mi, pa, pv.prerelease) }])
        }
        // x-range with an explicit operator or bare "1.2"/"1": treat as a
        // bounded interval at the stated precision.
        (Some(ma), Some(mi), None) => match op {
            Op::Exact => Some(vec![
                Comparator { op: Op::Gte, version: full_version(ma, mi, 0, vec![]) },
                Comparator { op: Op::Lt, version: full_version(ma, mi + 1, 0, vec![]) },
            ]),
            Op::Lt => Some(vec![Comparator { op: Op::Lt, version: full_version(ma, mi, 0, vec![]) }]),
            Op::Lte => Some(vec![Comparator { op: Op::Lt, version: full_version(ma, mi + 1, 0, vec![]) }]),
            Op::Gt => Some(vec![Comparator { op: Op::Gte, version: full_version(ma, mi + 1, 0, vec![]) }]),
            Op::Gte => Some(vec![Comparator { op: Op::Gte, version: full_version(ma, mi, 0, vec![]) }]),
        },
        (Some(ma), None, _) => match op {
            Op::Exact => Some(vec![
                Comparator { op: Op::Gte, version: full_version(ma, 0, 0, vec![]) },
                Comparator { op: Op::Lt, version: full_version(ma + 1, 0, 0, vec![]) },
            ]),
            Op::Lt => Some(vec![Comparator { op: Op::Lt, version: full_version(ma, 0, 0, vec![]) }]),
            Op::Lte => Some(vec![Comparator { op: Op::Lt, version: full_version(ma + 1, 0, 0, vec![]) }]),
            Op::Gt => Some(vec![Comparator { op: Op::Gte, version: full_version(ma + 1, 0, 0, vec![]) }]),
            Op::Gte => Some(vec![Comparator { op: Op::Gte, version: full_version(ma, 0, 0, vec![]) }]),
        },
        (None, _, _) => Some(vec![]),
    }
}

/// Parses an npm range expression: `||`-joined groups of space-separated
/// comparators, or a bare dist-tag like `latest`.
pub fn parse_range(input: &str) -> Result<Range, PmError> {
    let input = input.trim();
    let bad = || PmError::InvalidPackageJson {
        path: None,
        message: format!("not a valid semver range: {}", input),
    };

    if input.is_empty() || input == "*" {
        return Ok(Range::Sets(vec![vec![]]));
    }

    // A bare identifier with no version-like characters is a dist-tag.
    let looks_like_range = input.chars().next().map(|c| {
        c.is_ascii_digit() || "^~<>=*vV".contains(c)
    }).unwrap_or(false);
    if !looks_like_range {
        return Ok(Range::Tag(input.to_string()));
    }

    let mut sets = Vec::new();
    for part in input.split("||") {
        sets.push(parse_and_group(part).ok_or_else(bad)?);
    }
    Ok(Range::Sets(sets))
}

/// True if `version` satisfies `range`. Dist-tag ranges never match here —
/// the resolver resolves tags against the packument's `dist-tags` map first.
pub fn satisfies(version: &Version, range: &Range) -> bool {
    match range {
        Range::Tag(_) => false,
        Range::Sets(sets) => {
            let is_pre = !version.prerelease.is_empty();
            if is_pre && !range.allows_prerelease_of(version) {
                return false;
            }
            sets.iter().any(|set| set.iter().all(|c| c.matches(version)))
        }
    }
}

/// Returns the highest version in `versions` that satisfies `range`.
pub fn max_satisfying<'a>(versions: &'a [Version], range: &Range) -> Option<&'a Version> {
    versions.iter().filter(|v| satisfies(v, range)).max()
}

/// Returns the lowest version in `versions` that satisfies `range`.
pub fn min_satisfying<'a>(versions: &'a [Version], range: &Range) -> Option<&'a Version> {
    versions.iter().filter(|v| satisfies(v, range)).min()
}

/// Sorts versions ascending by SemVer precedence.
pub fn sort_versions(versions: &mut [Version]) {
    versions.sort();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn parses_core_version() {
        let ver = v("1.2.3");
        assert_eq!((ver.major, ver.minor, ver.patch), (1, 2, 3));
        assert!(ver.prerelease.is_empty());
    }

    #[test]
    fn parses_prerelease_and_build() {
        let ver = v("1.2.3-alpha.1+build.5");
        assert_eq!(ver.prerelease, vec![Identifier::Alphanumeric("alpha".into()), Identifier::Numeric(1)]);
        assert_eq!(ver.build, vec!["build".to_string(), "5".to_string()]);
    }

    #[test]
    fn precedence_orders_prerelease_below_release() {
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-alpha.beta"));
        assert!(v("1.0.0-beta") < v("1.0.0-beta.2"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.0.0-beta.11") < v("1.0.0-rc.1"));
    }

    #[test]
    fn caret_range_locks_leftmost_nonzero() {
        let r = parse_range("^1.2.3").unwrap();
        assert!(satisfies(&v("1.2.3"), &r));
        assert!(satisfies(&v("1.9.9"), &r));
        assert!(!satisfies(&v("2.0.0"), &r));
        assert!(!satisfies(&v("1.2.2"), &r));

        let r0 = parse_range("^0.2.3").unwrap();
        assert!(satisfies(&v("0.2.3"), &r0));
        assert!(satisfies(&v("0.2.9"), &r0));
        assert!(!satisfies(&v("0.3.0"), &r0));

        let r00 = parse_range("^0.0.3").unwrap();
        assert!(satisfies(&v("0.0.3"), &r00));
        assert!(!satisfies(&v("0.0.4"), &r00));
    }

    #[test]
    fn tilde_range_locks_minor() {
        let r = parse_range("~1.2.3").unwrap();
        assert!(satisfies(&v("1.2.3"), &r));
        assert!(satisfies(&v("1.2.9"), &r));
        assert!(!satisfies(&v("1.3.0"), &r));
    }

    #[test]
    fn hyphen_range_is_inclusive_bounds() {
        let r = parse_range("1.2.3 - 2.3.4").unwrap();
        assert!(satisfies(&v("1.2.3"), &r));
        assert!(satisfies(&v("2.3.4"), &r));
        assert!(!satisfies(&v("2.3.5"), &r));
        assert!(!satisfies(&v("1.2.2"), &r));
    }

    #[test]
    fn or_range_matches_either_set() {
        let r = parse_range("1.x || >=2.5.0 <3.0.0").unwrap();
        assert!(satisfies(&v("1.9.9"), &r));
        assert!(satisfies(&v("2.5.0"), &r));
        assert!(!satisfies(&v("2.4.0"), &r));
    }

    #[test]
    fn dist_tag_is_not_a_version_comparator() {
        let r = parse_range("latest").unwrap();
        assert!(matches!(r, Range::Tag(ref t) if t == "latest"));
        assert!(!satisfies(&v("1.0.0"), &r));
    }

    #[test]
    fn max_satisfying_picks_highest_match() {
        let versions = vec![v("1.0.0"), v("1.2.0"), v("1.5.0"), v("2.0.0")];
        let r = parse_range("^1.0.0").unwrap();
        assert_eq!(max_satisfying(&versions, &r), Some(&v("1.5.0")));
    }

    #[test]
    fn prerelease_excluded_unless_range_targets_same_triple() {
        let r = parse_range("^1.2.0").unwrap();
        assert!(!satisfies(&v("1.2.5-beta.1"), &r));
        let r2 = parse_range(">=1.2.5-alpha <1.3.0").unwrap();
        assert!(satisfies(&v("1.2.5-beta"), &r2));
    }
}

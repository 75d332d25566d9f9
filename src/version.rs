// src/version.rs

//! Package version grammar and ordering
//!
//! Versions follow the `number(.number)* [letter] (_suffix[num])* [-rNUM]`
//! grammar. Ordering is not lexicographic: numeric components compare as
//! numbers (or as strings when leading zeros make them fractional),
//! pre-release suffixes sort below the bare version, post-release suffixes
//! and build revisions sort above it.

use bitflags::bitflags;
use std::cmp::Ordering;

bitflags! {
    /// Comparison mask attached to a dependency.
    ///
    /// The bit values are stable; they appear verbatim in committed
    /// databases and must not be renumbered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Match: u32 {
        const LESS = 1;
        const EQUAL = 2;
        const GREATER = 4;
        const FUZZY = 8;
        const CONFLICT = 16;
    }
}

impl Match {
    /// No version constraint at all.
    pub const ANY: Match = Match::LESS.union(Match::EQUAL).union(Match::GREATER);

    /// The `><` operator: the version field holds a checksum, not a
    /// version, and is exempt from version validation.
    pub const CHECKSUM: Match = Match::LESS.union(Match::GREATER);

    /// Textual operator for this mask, ignoring the conflict bit.
    pub fn op_string(self) -> &'static str {
        let m = self.difference(Match::CONFLICT);
        if m == Match::LESS {
            "<"
        } else if m == Match::LESS | Match::EQUAL {
            "<="
        } else if m == Match::LESS | Match::EQUAL | Match::FUZZY {
            "<~"
        } else if m == Match::EQUAL | Match::FUZZY || m == Match::FUZZY {
            "~"
        } else if m == Match::EQUAL {
            "="
        } else if m == Match::GREATER | Match::EQUAL {
            ">="
        } else if m == Match::GREATER | Match::EQUAL | Match::FUZZY {
            ">~"
        } else if m == Match::GREATER {
            ">"
        } else if m == Match::CHECKSUM {
            "><"
        } else {
            "?"
        }
    }
}

/// Suffix names in rank order; the first four are pre-release.
const SUFFIXES: [&[u8]; 9] = [
    b"alpha", b"beta", b"pre", b"rc", b"cvs", b"svn", b"git", b"hg", b"p",
];
const PRE_RELEASE_SUFFIXES: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part<'a> {
    Num(&'a [u8]),
    Letter(u8),
    Suffix(u8),
    SuffixNum(&'a [u8]),
    Revision(&'a [u8]),
}

fn rank(p: Part<'_>) -> u8 {
    match p {
        Part::Num(_) => 0,
        Part::Letter(_) => 1,
        Part::Suffix(_) => 2,
        Part::SuffixNum(_) => 3,
        Part::Revision(_) => 4,
    }
}

fn is_pre_release(p: Part<'_>) -> bool {
    matches!(p, Part::Suffix(s) if s < PRE_RELEASE_SUFFIXES)
}

fn digits(v: &[u8], from: usize) -> usize {
    v[from..].iter().take_while(|c| c.is_ascii_digit()).count()
}

fn match_suffix(v: &[u8]) -> Option<(u8, usize)> {
    // Longest name wins so that "pre" is never read as "p".
    let mut best: Option<(u8, usize)> = None;
    for (i, name) in SUFFIXES.iter().enumerate() {
        if v.starts_with(name) && best.is_none_or(|(_, len)| name.len() > len) {
            best = Some((i as u8, name.len()));
        }
    }
    best
}

fn tokenize(v: &[u8]) -> Option<Vec<Part<'_>>> {
    let mut parts = Vec::new();
    let n = digits(v, 0);
    if n == 0 {
        return None;
    }
    parts.push(Part::Num(&v[..n]));
    let mut i = n;

    while i < v.len() {
        let prev = *parts.last()?;
        match v[i] {
            b'.' if matches!(prev, Part::Num(_)) => {
                let n = digits(v, i + 1);
                if n == 0 {
                    return None;
                }
                parts.push(Part::Num(&v[i + 1..i + 1 + n]));
                i += 1 + n;
            }
            c @ b'a'..=b'z' if matches!(prev, Part::Num(_)) => {
                parts.push(Part::Letter(c));
                i += 1;
            }
            b'_' if !matches!(prev, Part::Revision(_)) => {
                let (s, len) = match_suffix(&v[i + 1..])?;
                parts.push(Part::Suffix(s));
                i += 1 + len;
                let n = digits(v, i);
                if n > 0 {
                    parts.push(Part::SuffixNum(&v[i..i + n]));
                    i += n;
                }
            }
            b'-' if !matches!(prev, Part::Revision(_)) => {
                if v.get(i + 1) != Some(&b'r') {
                    return None;
                }
                let n = digits(v, i + 2);
                if n == 0 {
                    return None;
                }
                parts.push(Part::Revision(&v[i + 2..i + 2 + n]));
                i += 2 + n;
            }
            _ => return None,
        }
    }
    Some(parts)
}

/// Check that `v` is a well-formed version string.
pub fn validate(v: &[u8]) -> bool {
    tokenize(v).is_some()
}

/// Numeric component ordering: components with leading zeros compare as
/// strings (fraction-style), everything else as decimal numbers.
fn num_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let frac = (a.len() > 1 && a[0] == b'0') || (b.len() > 1 && b[0] == b'0');
    if frac {
        return a.cmp(b);
    }
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Ordering of two parts at the same position. When the kinds differ, a
/// pre-release suffix sorts below anything, and otherwise a higher-ranked
/// kind means the shorter side keeps going "further": end-of-version ranks
/// above a revision, which ranks above a suffix, and so on.
fn tail_cmp(a: Option<Part<'_>>, b: Option<Part<'_>>) -> Ordering {
    if let Some(p) = a
        && is_pre_release(p)
    {
        return Ordering::Less;
    }
    if let Some(p) = b
        && is_pre_release(p)
    {
        return Ordering::Greater;
    }
    let ra = a.map_or(5, rank);
    let rb = b.map_or(5, rank);
    rb.cmp(&ra)
}

fn part_cmp(a: Part<'_>, b: Part<'_>) -> Ordering {
    match (a, b) {
        (Part::Num(x), Part::Num(y)) => num_cmp(x, y),
        (Part::Letter(x), Part::Letter(y)) => x.cmp(&y),
        (Part::Suffix(x), Part::Suffix(y)) => x.cmp(&y),
        (Part::SuffixNum(x), Part::SuffixNum(y)) => num_cmp(x, y),
        (Part::Revision(x), Part::Revision(y)) => num_cmp(x, y),
        _ => tail_cmp(Some(a), Some(b)),
    }
}

/// Total order over version strings. Malformed inputs fall back to plain
/// byte order so the comparison stays total.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    compare_fuzzy(a, b, false)
}

/// Like [`compare`] but in fuzzy mode `b` is a prefix pattern: the result
/// is `Equal` as soon as `b` runs out of components while all earlier
/// components matched.
pub fn compare_fuzzy(a: &[u8], b: &[u8], fuzzy: bool) -> Ordering {
    let (ta, tb) = match (tokenize(a), tokenize(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return a.cmp(b),
    };
    let mut i = 0;
    loop {
        match (ta.get(i).copied(), tb.get(i).copied()) {
            (None, None) => return Ordering::Equal,
            (Some(x), Some(y)) => {
                let r = part_cmp(x, y);
                if r != Ordering::Equal {
                    return r;
                }
            }
            (x, y) => {
                if fuzzy && y.is_none() {
                    return Ordering::Equal;
                }
                return tail_cmp(x, y);
            }
        }
        i += 1;
    }
}

/// Evaluate `actual OP wanted` for the comparison bits of `mask`.
/// The conflict bit is the caller's business.
pub fn version_match(actual: &[u8], mask: Match, wanted: &[u8]) -> bool {
    let mask = if mask.intersection(Match::ANY | Match::FUZZY).is_empty() {
        Match::EQUAL
    } else {
        mask
    };
    match compare_fuzzy(actual, wanted, mask.contains(Match::FUZZY)) {
        Ordering::Less => mask.contains(Match::LESS),
        Ordering::Equal => mask.contains(Match::EQUAL),
        Ordering::Greater => mask.contains(Match::GREATER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &str, b: &str) -> Ordering {
        compare(a.as_bytes(), b.as_bytes())
    }

    #[test]
    fn test_numeric_components() {
        assert_eq!(cmp("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(cmp("1.2.3", "1.2.4"), Ordering::Less);
        assert_eq!(cmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(cmp("1.2", "1.2.1"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeros_compare_as_fractions() {
        assert_eq!(cmp("1.05", "1.1"), Ordering::Less);
        assert_eq!(cmp("1.010", "1.02"), Ordering::Less);
    }

    #[test]
    fn test_revision_sorts_above() {
        assert_eq!(cmp("1.2.3", "1.2.3-r1"), Ordering::Less);
        assert_eq!(cmp("1.2.3-r2", "1.2.3-r1"), Ordering::Greater);
    }

    #[test]
    fn test_pre_release_sorts_below() {
        assert_eq!(cmp("1.2_alpha1", "1.2"), Ordering::Less);
        assert_eq!(cmp("1.2_alpha", "1.2_beta"), Ordering::Less);
        assert_eq!(cmp("1.2_rc1", "1.2"), Ordering::Less);
    }

    #[test]
    fn test_post_release_sorts_above() {
        assert_eq!(cmp("1.2_git", "1.2"), Ordering::Greater);
        assert_eq!(cmp("1.2_p1", "1.2"), Ordering::Greater);
    }

    #[test]
    fn test_letter_component() {
        assert_eq!(cmp("1.2a", "1.2"), Ordering::Greater);
        assert_eq!(cmp("1.2a", "1.2b"), Ordering::Less);
    }

    #[test]
    fn test_suffix_number() {
        assert_eq!(cmp("1.2_alpha", "1.2_alpha1"), Ordering::Less);
        assert_eq!(cmp("1.2_alpha2", "1.2_alpha10"), Ordering::Less);
    }

    #[test]
    fn test_validate() {
        assert!(validate(b"1.2.3-r4"));
        assert!(validate(b"1.2_alpha1"));
        assert!(validate(b"0.9"));
        assert!(!validate(b""));
        assert!(!validate(b"abc"));
        assert!(!validate(b"1.2.3-4"));
        assert!(!validate(b"1._alpha"));
        assert!(!validate(b"1.2-r"));
    }

    #[test]
    fn test_fuzzy_prefix() {
        assert_eq!(
            compare_fuzzy(b"1.2.3", b"1.2", true),
            Ordering::Equal
        );
        assert_eq!(
            compare_fuzzy(b"1.25", b"1.2", true),
            Ordering::Greater
        );
        assert_eq!(compare_fuzzy(b"1.2", b"1.2", true), Ordering::Equal);
    }

    #[test]
    fn test_version_match() {
        assert!(version_match(b"1.2.3-r4", Match::GREATER | Match::EQUAL, b"1.2.3"));
        assert!(!version_match(b"1.2.2", Match::GREATER | Match::EQUAL, b"1.2.3"));
        assert!(version_match(b"2.0.5", Match::FUZZY | Match::EQUAL, b"2.0"));
        assert!(version_match(b"1.0", Match::EQUAL, b"1.0"));
    }

    #[test]
    fn test_missing_comparison_bits_mean_equal() {
        assert!(version_match(b"1.0", Match::empty(), b"1.0"));
        assert!(!version_match(b"1.1", Match::CONFLICT, b"1.0"));
    }

    #[test]
    fn test_op_strings() {
        assert_eq!((Match::GREATER | Match::EQUAL).op_string(), ">=");
        assert_eq!(Match::LESS.op_string(), "<");
        assert_eq!((Match::FUZZY | Match::EQUAL).op_string(), "~");
        assert_eq!(Match::EQUAL.op_string(), "=");
        assert_eq!(Match::CHECKSUM.op_string(), "><");
        assert_eq!(
            (Match::CONFLICT | Match::GREATER | Match::EQUAL).op_string(),
            ">="
        );
    }
}

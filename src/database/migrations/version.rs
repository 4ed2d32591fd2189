//! Dotted migration versions (`1`, `1.1`, `2_0_3`).
//!
//! Parts compare numerically and trailing zero parts are insignificant, so
//! `1.10 > 1.9` and `1.0 == 1`.

use super::{MigrationError, MigrationResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct MigrationVersion {
    parts: Vec<u64>,
}

impl MigrationVersion {
    /// Parse a version whose parts are separated by `.` or `_`
    pub fn parse(raw: &str) -> MigrationResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MigrationError::invalid_version(raw, "version is empty"));
        }

        let parts = trimmed
            .split(['.', '_'])
            .map(|part| {
                if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                    return Err(MigrationError::invalid_version(
                        raw,
                        "parts must be non-empty sequences of digits",
                    ));
                }
                part.parse::<u64>()
                    .map_err(|e| MigrationError::invalid_version(raw, e.to_string()))
            })
            .collect::<MigrationResult<Vec<_>>>()?;

        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    fn significant(&self) -> &[u64] {
        let len = self
            .parts
            .iter()
            .rposition(|part| *part != 0)
            .map_or(0, |idx| idx + 1);
        &self.parts[..len]
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for MigrationVersion {}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.significant().cmp(other.significant())
    }
}

impl FromStr for MigrationVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(raw: &str) -> MigrationVersion {
        MigrationVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("1.10") > v("1.9"));
        assert!(v("2") > v("1.999"));
        assert!(v("1.1") > v("1"));
        assert!(v("10") > v("9"));
    }

    #[test]
    fn test_trailing_zeros_are_insignificant() {
        assert_eq!(v("1.0"), v("1"));
        assert_eq!(v("1_0_0"), v("1"));
        assert_ne!(v("1.0.1"), v("1"));
    }

    #[test]
    fn test_underscore_separator_displays_as_dots() {
        assert_eq!(v("2_1_3").to_string(), "2.1.3");
        assert_eq!(v("2_1_3"), v("2.1.3"));
    }

    #[test]
    fn test_rejects_malformed_versions() {
        for raw in ["", "1..2", "a", "1.b", "1-2", ".1"] {
            assert!(
                MigrationVersion::parse(raw).is_err(),
                "expected '{raw}' to be rejected"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_display_round_trips_through_parse(parts in prop::collection::vec(0u64..10_000, 1..5)) {
            let raw = parts.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
            let parsed = v(&raw);
            prop_assert_eq!(parsed.to_string(), raw);
        }

        #[test]
        fn prop_ordering_matches_numeric_parts(a in prop::collection::vec(1u64..1_000, 1..4),
                                               b in prop::collection::vec(1u64..1_000, 1..4)) {
            let va = v(&a.iter().map(u64::to_string).collect::<Vec<_>>().join("."));
            let vb = v(&b.iter().map(u64::to_string).collect::<Vec<_>>().join("."));
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::keyspace_id::{KEYSPACE_ID_WIDTH, KeyspaceId};
use crate::core::{DbError, Result};

/// Half-open interval `[start, end)` of keyspace ids.
///
/// A missing bound is unbounded on that side; a range with neither bound
/// covers the whole keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Option<KeyspaceId>,
    pub end: Option<KeyspaceId>,
}

impl KeyRange {
    /// The range covering every keyspace id.
    pub fn full() -> Self {
        Self { start: None, end: None }
    }

    pub fn new(start: Option<KeyspaceId>, end: Option<KeyspaceId>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(DbError::ConfigurationError(format!(
                    "key range start {} must be below end {}",
                    start, end
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, kid: KeyspaceId) -> bool {
        self.start.is_none_or(|start| kid >= start) && self.end.is_none_or(|end| kid < end)
    }

    /// Parses shard range notation such as `-`, `40-80`, `-80` or `80-`.
    ///
    /// Each bound is a left-aligned hex prefix of the 8-byte token, so `80`
    /// means `0x8000000000000000`.
    pub fn parse(notation: &str) -> Result<Self> {
        let notation = notation.trim();
        let (start, end) = notation.split_once('-').ok_or_else(|| {
            DbError::FormatError(format!("key range '{}' must contain '-'", notation))
        })?;
        Self::new(parse_bound(start)?, parse_bound(end)?)
    }
}

fn parse_bound(bound: &str) -> Result<Option<KeyspaceId>> {
    if bound.is_empty() {
        return Ok(None);
    }
    if bound.len() % 2 != 0 || bound.len() > KEYSPACE_ID_WIDTH * 2 {
        return Err(DbError::FormatError(format!(
            "key range bound '{}' must be whole bytes of at most {} hex digits",
            bound,
            KEYSPACE_ID_WIDTH * 2
        )));
    }
    let padded = format!("{:0<width$}", bound, width = KEYSPACE_ID_WIDTH * 2);
    KeyspaceId::from_hex(&padded).map(Some)
}

fn format_bound(bound: Option<KeyspaceId>) -> String {
    match bound {
        None => String::new(),
        Some(kid) => {
            let hex = kid.to_string();
            let trimmed = hex.trim_end_matches("00");
            if trimmed.is_empty() {
                "00".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_bound(self.start), format_bound(self.end))
    }
}

impl FromStr for KeyRange {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_range_contains_everything() {
        let full = KeyRange::full();
        assert!(full.is_full());
        assert!(full.contains(KeyspaceId::MIN));
        assert!(full.contains(KeyspaceId::MAX));
    }

    #[test]
    fn test_parse_shard_notation() {
        assert_eq!(KeyRange::parse("-").unwrap(), KeyRange::full());

        let lower = KeyRange::parse("-80").unwrap();
        assert!(lower.contains(KeyspaceId::new(0x7fff_ffff_ffff_ffff)));
        assert!(!lower.contains(KeyspaceId::new(0x8000_0000_0000_0000)));

        let middle = KeyRange::parse("40-80").unwrap();
        assert_eq!(middle.start, Some(KeyspaceId::new(0x4000_0000_0000_0000)));
        assert_eq!(middle.to_string(), "40-80");
    }

    #[test]
    fn test_parse_rejects_malformed_bounds() {
        assert!(matches!(KeyRange::parse("4080"), Err(DbError::FormatError(_))));
        assert!(matches!(KeyRange::parse("4-80"), Err(DbError::FormatError(_))));
        assert!(matches!(
            KeyRange::parse("80-40"),
            Err(DbError::ConfigurationError(_))
        ));
    }
}

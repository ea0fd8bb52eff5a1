//! License key format.
//!
//! Keys issued by the authority are 32 hex characters split into five
//! hyphen-separated groups: `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.

use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, Result};

const GROUP_LENGTHS: [usize; 5] = [8, 4, 4, 4, 12];

/// A license key that passed the local format check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Parse a key, trimming surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if is_well_formed(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(LicenseError::InvalidKeyFormat)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key safe for logs and status output: first group plus the last four characters.
    pub fn masked(&self) -> String {
        mask(&self.0)
    }
}

impl std::fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LicenseKey {
    type Error = LicenseError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LicenseKey> for String {
    fn from(key: LicenseKey) -> Self {
        key.0
    }
}

/// Whether `candidate` has the hyphenated hex-group shape.
pub fn is_well_formed(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split('-').collect();
    groups.len() == GROUP_LENGTHS.len()
        && groups
            .iter()
            .zip(GROUP_LENGTHS)
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Mask an arbitrary key string for display.
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match key.split('-').next() {
        Some(first) if chars.len() > 12 && first.len() < key.len() => {
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{first}-…-{tail}")
        }
        _ => "****".to_string(),
    }
}

//! Supported product-version buckets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the fixed product-version classes the installer configures differently for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBucket {
    /// CC 2019 and older.
    Legacy,
    /// CC 2021.
    Mid,
    /// CC 2022 and newer.
    Latest,
}

impl VersionBucket {
    pub const ALL: [VersionBucket; 3] = [
        VersionBucket::Latest,
        VersionBucket::Mid,
        VersionBucket::Legacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionBucket::Latest => "latest",
            VersionBucket::Mid => "mid",
            VersionBucket::Legacy => "legacy",
        }
    }
}

impl fmt::Display for VersionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(VersionBucket::Latest),
            "mid" => Ok(VersionBucket::Mid),
            "legacy" => Ok(VersionBucket::Legacy),
            other => Err(format!(
                "unknown version bucket '{other}' (expected latest, mid or legacy)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_parse_and_display() {
        for bucket in VersionBucket::ALL {
            assert_eq!(bucket.as_str().parse::<VersionBucket>(), Ok(bucket));
        }
        assert_eq!(" Latest ".parse::<VersionBucket>(), Ok(VersionBucket::Latest));
        assert!("cc2020".parse::<VersionBucket>().is_err());
    }

    #[test]
    fn test_bucket_serde_lowercase() {
        let json = serde_json::to_string(&VersionBucket::Mid).unwrap();
        assert_eq!(json, "\"mid\"");
    }
}

//! Raw version token → bucket mapping.

use pfx_common::VersionBucket;
use pfx_config::VersionSettings;

/// Numeric thresholds for bucket mapping.
///
/// Tokens whose leading number is at least 2000 are release years; anything
/// smaller is a product major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketThresholds {
    pub latest_major: u32,
    pub mid_major: u32,
    pub latest_year: u32,
    pub mid_year: u32,
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self::from_settings(&VersionSettings::default())
    }
}

impl BucketThresholds {
    pub fn from_settings(settings: &VersionSettings) -> Self {
        Self {
            latest_major: settings.latest_major,
            mid_major: settings.mid_major,
            latest_year: settings.latest_year,
            mid_year: settings.mid_year,
        }
    }

    /// Bucket for a raw token such as `23.0`, `22.5.1`, `2021` or `CC 2022`.
    pub fn bucket_for(&self, raw: &str) -> Option<VersionBucket> {
        let number = leading_number(raw)?;
        let (latest, mid) = if number >= 2000 {
            (self.latest_year, self.mid_year)
        } else {
            (self.latest_major, self.mid_major)
        };
        Some(if number >= latest {
            VersionBucket::Latest
        } else if number >= mid {
            VersionBucket::Mid
        } else {
            VersionBucket::Legacy
        })
    }
}

/// First run of ASCII digits in `raw`.
fn leading_number(raw: &str) -> Option<u32> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let digits: String = raw[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_majors() {
        let t = BucketThresholds::default();
        assert_eq!(t.bucket_for("23.0"), Some(VersionBucket::Latest));
        assert_eq!(t.bucket_for("25.1.0"), Some(VersionBucket::Latest));
        assert_eq!(t.bucket_for("22.5.1"), Some(VersionBucket::Mid));
        assert_eq!(t.bucket_for("21.2"), Some(VersionBucket::Legacy));
    }

    #[test]
    fn test_years() {
        let t = BucketThresholds::default();
        assert_eq!(t.bucket_for("2022"), Some(VersionBucket::Latest));
        assert_eq!(t.bucket_for("CC 2021"), Some(VersionBucket::Mid));
        assert_eq!(t.bucket_for("2019"), Some(VersionBucket::Legacy));
    }

    #[test]
    fn test_no_number() {
        assert_eq!(BucketThresholds::default().bucket_for("unknown"), None);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = BucketThresholds {
            latest_major: 25,
            mid_major: 24,
            latest_year: 2024,
            mid_year: 2023,
        };
        assert_eq!(t.bucket_for("24.0"), Some(VersionBucket::Mid));
        assert_eq!(t.bucket_for("2022"), Some(VersionBucket::Legacy));
    }

    proptest! {
        #[test]
        fn prop_bucket_monotonic_in_major(a in 0u32..1999, b in 0u32..1999) {
            let t = BucketThresholds::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo_bucket = t.bucket_for(&format!("{}.0", lo)).unwrap();
            let hi_bucket = t.bucket_for(&format!("{}.0", hi)).unwrap();
            prop_assert!(lo_bucket <= hi_bucket);
        }
    }
}

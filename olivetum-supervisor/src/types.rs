//! Shared value types.

use std::fmt;

/// Hashrate measurement.
///
/// The miner reports kilohashes per second over its status API and the chart
/// plots megahashes per second; this type keeps the unit explicit between
/// the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct HashRate(pub u64); // hashes per second

impl HashRate {
    /// Create from kilohashes per second
    pub fn from_kilohashes(kh: u64) -> Self {
        Self(kh.saturating_mul(1_000))
    }

    fn as_kilohashes(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    fn as_megahashes(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    fn as_gigahashes(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Format as human-readable string with appropriate units.
    ///
    /// GPU rigs sit in the MH/s to GH/s range, so anything from 1 MH/s up to
    /// 1 GH/s is shown in MH/s with two decimals, matching the dashboard.
    pub fn to_human_readable(&self) -> String {
        if self.0 >= 1_000_000_000 {
            format!("{:.2} GH/s", self.as_gigahashes())
        } else if self.0 >= 1_000_000 {
            format!("{:.2} MH/s", self.as_megahashes())
        } else if self.0 >= 1_000 {
            format!("{:.2} kH/s", self.as_kilohashes())
        } else {
            format!("{} H/s", self.0)
        }
    }
}

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashrate_from_kilohashes() {
        let rate = HashRate::from_kilohashes(15_000);
        assert_eq!(rate, HashRate(15_000_000));
        assert_eq!(rate.to_human_readable(), "15.00 MH/s");
    }

    #[test]
    fn test_hashrate_units() {
        assert_eq!(HashRate(1_500_000_000).to_human_readable(), "1.50 GH/s");
        assert_eq!(HashRate::from_kilohashes(12).to_human_readable(), "12.00 kH/s");
        assert_eq!(HashRate(999).to_human_readable(), "999 H/s");
        assert_eq!(HashRate::from_kilohashes(u64::MAX), HashRate(u64::MAX));
    }
}

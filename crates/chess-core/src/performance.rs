use std::fmt;

use serde::{Deserialize, Serialize};

/// Qualitative win-rate bands, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PerformanceBand {
    Poor,
    BelowAverage,
    Average,
    Good,
    Excellent,
    Outstanding,
}

/// Inclusive upper bound of every band but the last.
const BAND_CEILINGS: [(f64, PerformanceBand); 5] = [
    (0.20, PerformanceBand::Poor),
    (0.35, PerformanceBand::BelowAverage),
    (0.65, PerformanceBand::Average),
    (0.80, PerformanceBand::Good),
    (0.95, PerformanceBand::Excellent),
];

impl PerformanceBand {
    pub const ALL: [PerformanceBand; 6] = [
        PerformanceBand::Poor,
        PerformanceBand::BelowAverage,
        PerformanceBand::Average,
        PerformanceBand::Good,
        PerformanceBand::Excellent,
        PerformanceBand::Outstanding,
    ];

    /// `win_rate` is a fraction in `0.0..=1.0`; NaN counts as no wins.
    pub fn from_win_rate(win_rate: f64) -> Self {
        if win_rate.is_nan() {
            return PerformanceBand::Poor;
        }
        BAND_CEILINGS
            .iter()
            .find(|(ceiling, _)| win_rate <= *ceiling)
            .map(|(_, band)| *band)
            .unwrap_or(PerformanceBand::Outstanding)
    }

    pub fn label(self) -> &'static str {
        match self {
            PerformanceBand::Poor => "poor",
            PerformanceBand::BelowAverage => "below average",
            PerformanceBand::Average => "average",
            PerformanceBand::Good => "good",
            PerformanceBand::Excellent => "excellent",
            PerformanceBand::Outstanding => "outstanding",
        }
    }
}

impl fmt::Display for PerformanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_belong_to_lower_band() {
        assert_eq!(PerformanceBand::from_win_rate(0.0), PerformanceBand::Poor);
        assert_eq!(PerformanceBand::from_win_rate(0.20), PerformanceBand::Poor);
        assert_eq!(PerformanceBand::from_win_rate(0.2001), PerformanceBand::BelowAverage);
        assert_eq!(PerformanceBand::from_win_rate(0.35), PerformanceBand::BelowAverage);
        assert_eq!(PerformanceBand::from_win_rate(0.65), PerformanceBand::Average);
        assert_eq!(PerformanceBand::from_win_rate(0.80), PerformanceBand::Good);
        assert_eq!(PerformanceBand::from_win_rate(0.95), PerformanceBand::Excellent);
        assert_eq!(PerformanceBand::from_win_rate(0.9501), PerformanceBand::Outstanding);
        assert_eq!(PerformanceBand::from_win_rate(1.0), PerformanceBand::Outstanding);
    }

    #[test]
    fn test_exact_fractions() {
        assert_eq!(PerformanceBand::from_win_rate(1.0 / 3.0), PerformanceBand::BelowAverage);
        assert_eq!(PerformanceBand::from_win_rate(7.0 / 20.0), PerformanceBand::BelowAverage);
        assert_eq!(PerformanceBand::from_win_rate(13.0 / 20.0), PerformanceBand::Average);
        assert_eq!(PerformanceBand::from_win_rate(19.0 / 20.0), PerformanceBand::Excellent);
    }

    #[test]
    fn test_monotonic() {
        let mut previous = PerformanceBand::Poor;
        for step in 0..=1000 {
            let band = PerformanceBand::from_win_rate(f64::from(step) / 1000.0);
            assert!(band >= previous);
            previous = band;
        }
        assert_eq!(previous, PerformanceBand::Outstanding);
        assert_eq!(PerformanceBand::from_win_rate(f64::NAN), PerformanceBand::Poor);
    }
}

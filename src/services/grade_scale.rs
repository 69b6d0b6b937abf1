use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GradeBand {
    /// Lowest percentage (inclusive) that earns this band.
    pub min_percentage: u32,
    pub grade: &'static str,
    pub description: &'static str,
}

/// An ordered list of letter-grade bands. The last band is the floor and
/// matches any percentage below the previous cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

const fn band(min_percentage: u32, grade: &'static str, description: &'static str) -> GradeBand {
    GradeBand {
        min_percentage,
        grade,
        description,
    }
}

const WAEC_BANDS: [GradeBand; 9] = [
    band(75, "A1", "Excellent"),
    band(70, "B2", "Very Good"),
    band(65, "B3", "Good"),
    band(60, "C4", "Credit"),
    band(55, "C5", "Credit"),
    band(50, "C6", "Credit"),
    band(45, "D7", "Pass"),
    band(40, "E8", "Pass"),
    band(0, "F9", "Fail"),
];

// Report cards use their own cutoffs; kept apart from the assessment scale.
const REPORT_CARD_BANDS: [GradeBand; 8] = [
    band(80, "A1", "Excellent"),
    band(70, "B2", "Very Good"),
    band(65, "B3", "Good"),
    band(60, "C4", "Credit"),
    band(55, "C5", "Credit"),
    band(50, "C6", "Credit"),
    band(45, "D7", "Pass"),
    band(0, "F9", "Fail"),
];

impl GradeScale {
    /// The 9-band scale used for assessment results.
    pub fn waec() -> Self {
        Self {
            bands: WAEC_BANDS.to_vec(),
        }
    }

    pub fn report_card() -> Self {
        Self {
            bands: REPORT_CARD_BANDS.to_vec(),
        }
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    pub fn classify(&self, percentage: Decimal) -> GradeBand {
        self.bands
            .iter()
            .find(|b| percentage >= Decimal::from(b.min_percentage))
            .or_else(|| self.bands.last())
            .copied()
            .unwrap_or(band(0, "F9", "Fail"))
    }
}

/// WAEC letter grade for a percentage.
pub fn waec_grade(percentage: Decimal) -> GradeBand {
    GradeScale::waec().classify(percentage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pct(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn boundaries_are_inclusive_lower_bounds() {
        assert_eq!(waec_grade(pct("75.0")).grade, "A1");
        assert_eq!(waec_grade(pct("74.999")).grade, "B2");
        assert_eq!(waec_grade(pct("50.0")).grade, "C6");
        assert_eq!(waec_grade(pct("49.999")).grade, "D7");
    }

    #[test]
    fn every_band_is_reachable() {
        let cases = [
            ("100", "A1", "Excellent"),
            ("72", "B2", "Very Good"),
            ("65", "B3", "Good"),
            ("64.5", "C4", "Credit"),
            ("55", "C5", "Credit"),
            ("51", "C6", "Credit"),
            ("45", "D7", "Pass"),
            ("40", "E8", "Pass"),
            ("39.99", "F9", "Fail"),
            ("0", "F9", "Fail"),
        ];
        for (p, grade, description) in cases {
            let b = waec_grade(pct(p));
            assert_eq!((b.grade, b.description), (grade, description), "at {p}%");
        }
    }

    #[test]
    fn negative_percentages_fall_to_the_floor() {
        assert_eq!(waec_grade(pct("-3")).grade, "F9");
    }

    #[test]
    fn grading_is_monotonic() {
        let scale = GradeScale::waec();
        let rank = |g: &str| scale.bands().iter().position(|b| b.grade == g).unwrap();
        let mut prev = rank("A1");
        for p in (0..=1000).rev() {
            let r = rank(scale.classify(Decimal::new(p, 1)).grade);
            assert!(r >= prev);
            prev = r;
        }
    }

    #[test]
    fn report_card_scale_is_independent() {
        let report = GradeScale::report_card();
        assert_eq!(report.bands().len(), 8);
        assert_eq!(report.classify(pct("78")).grade, "B2");
        assert_eq!(waec_grade(pct("78")).grade, "A1");
        assert_eq!(report.classify(pct("42")).grade, "F9");
    }
}

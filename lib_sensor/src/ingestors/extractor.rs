//! # Measurement Extractor
//!
//! Pulls pH, ORP and turbidity out of one free-form text line. Each field has
//! its own pattern and is looked up on its own, so a line may carry any subset.
//! A label that matches but whose number does not parse (for example an ORP
//! that overflows `i32`) counts as absent.

use regex::{Regex, RegexBuilder};

use crate::ingestors::decoder::strip_control;
use crate::models::reading::Measurements;

const PH_PATTERN: &str = r"pH[_\s]*value:?\s*(-?\d+\.?\d*)";
const ORP_PATTERN: &str = r"ORP:?\s*(-?\d+)";
const NTU_PATTERN: &str = r"(?:Turbidity|NTU):?\s*(-?\d+)";

/// # Measurement Extractor
///
/// Compiled, case-insensitive field patterns. Build once and reuse.
#[derive(Debug, Clone)]
pub struct MeasurementExtractor {
    ph: Regex,
    orp: Regex,
    ntu: Regex,
}

impl Default for MeasurementExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementExtractor {
    pub fn new() -> Self {
        Self {
            ph: compile(PH_PATTERN),
            orp: compile(ORP_PATTERN),
            ntu: compile(NTU_PATTERN),
        }
    }

    /// Extracts whichever fields `line` carries. Pure.
    pub fn extract(&self, line: &str) -> Measurements {
        if line.is_empty() {
            return Measurements::default();
        }
        let cleaned = strip_control(line);

        Measurements {
            acidity: capture(&self.ph, &cleaned).and_then(|s| s.parse::<f64>().ok()),
            redox: capture(&self.orp, &cleaned).and_then(|s| s.parse::<i32>().ok()),
            turbidity: capture(&self.ntu, &cleaned).and_then(|s| s.parse::<i32>().ok()),
        }
    }
}

fn compile(pattern: &str) -> Regex {
    // The patterns are constants covered by the tests below.
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn extract(line: &str) -> Measurements {
        MeasurementExtractor::new().extract(line)
    }

    #[test]
    fn all_three_fields() {
        let m = extract("pH value: 7.02 | ORP: 350 | Turbidity: 12");
        assert_eq!(m.acidity, Some(7.02));
        assert_eq!(m.redox, Some(350));
        assert_eq!(m.turbidity, Some(12));
    }

    #[test]
    fn fields_are_independent() {
        let m = extract("ORP: -45");
        assert_eq!(m, Measurements { acidity: None, redox: Some(-45), turbidity: None });

        let m = extract("NTU 3000");
        assert_eq!(m, Measurements { acidity: None, redox: None, turbidity: Some(3000) });
    }

    #[test]
    fn ph_label_variants() {
        assert_eq!(extract("pH_value:6.8").acidity, Some(6.8));
        assert_eq!(extract("PH VALUE 8").acidity, Some(8.0));
        assert_eq!(extract("ph value: -1.5").acidity, Some(-1.5));
        assert_eq!(extract("pH value: 7.").acidity, Some(7.0));
    }

    #[test]
    fn unparsable_number_is_absent() {
        let m = extract("ORP: 99999999999 NTU: 5");
        assert_eq!(m.redox, None);
        assert_eq!(m.turbidity, Some(5));
    }

    #[test]
    fn label_without_number_is_absent() {
        assert!(extract("pH value: n/a, ORP: --").is_empty());
    }

    #[test]
    fn control_chars_inside_label_are_ignored() {
        let m = extract("O\u{1}RP: 410");
        assert_eq!(m.redox, Some(410));
    }

    #[test]
    fn unrelated_text_extracts_nothing() {
        assert!(extract("sensor warming up").is_empty());
        assert!(extract("").is_empty());
    }

    proptest! {
        #[test]
        fn extracts_exactly_the_present_subset(
            ph in proptest::option::of(0u32..1400),
            orp in proptest::option::of(-2000i32..2000),
            ntu in proptest::option::of(0i32..4000),
        ) {
            let mut parts = Vec::new();
            if let Some(ph) = ph {
                parts.push(format!("pH value: {}.{:02}", ph / 100, ph % 100));
            }
            if let Some(orp) = orp {
                parts.push(format!("ORP: {}", orp));
            }
            if let Some(ntu) = ntu {
                parts.push(format!("Turbidity: {}", ntu));
            }
            let m = extract(&parts.join(", "));

            let expected_ph = ph.map(|v| format!("{}.{:02}", v / 100, v % 100).parse::<f64>().unwrap());
            prop_assert_eq!(m.acidity, expected_ph);
            prop_assert_eq!(m.redox, orp);
            prop_assert_eq!(m.turbidity, ntu);
        }
    }
}

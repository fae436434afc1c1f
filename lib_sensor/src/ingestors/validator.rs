//! # Range Validator
//!
//! Advisory checks on extracted values. Out-of-range values are reported and
//! still stored; the validator never edits or drops anything.

use crate::models::reading::Measurements;

/// Plausible pH range, inclusive.
pub const PH_RANGE: (f64, f64) = (0.0, 14.0);
/// Plausible ORP range in mV, inclusive.
pub const ORP_RANGE: (i32, i32) = (-2000, 2000);
/// Plausible turbidity range in NTU, inclusive.
pub const NTU_RANGE: (i32, i32) = (0, 4000);

/// Returns one warning per value outside its plausible range.
pub fn validate(m: &Measurements) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(ph) = m.acidity {
        if !(PH_RANGE.0..=PH_RANGE.1).contains(&ph) {
            warnings.push(format!(
                "pH value {:.2} outside expected range ({}-{})",
                ph, PH_RANGE.0, PH_RANGE.1
            ));
        }
    }

    if let Some(orp) = m.redox {
        if !(ORP_RANGE.0..=ORP_RANGE.1).contains(&orp) {
            warnings.push(format!(
                "ORP value {}mV outside expected range ({} to {})",
                orp, ORP_RANGE.0, ORP_RANGE.1
            ));
        }
    }

    if let Some(ntu) = m.turbidity {
        if !(NTU_RANGE.0..=NTU_RANGE.1).contains(&ntu) {
            warnings.push(format!(
                "NTU value {} outside expected range ({}-{})",
                ntu, NTU_RANGE.0, NTU_RANGE.1
            ));
        }
    }

    warnings
}

//! # Sensor Reading Model
//!
//! A `Reading` is the unit written to `sensor_readings`. Its status labels and
//! the water-quality flag are derived once, when the reading is captured, and
//! stored next to the raw values. Readers display the stored labels and never
//! derive them again, so historical rows keep the labels they were written with.

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this pH a sample is labelled acidic.
pub const ACIDIC_BELOW: f64 = 6.5;
/// Above this pH a sample is labelled alkaline.
pub const ALKALINE_ABOVE: f64 = 7.5;

/// Inclusive pH band for good water quality.
pub const GOOD_PH_RANGE: (f64, f64) = (6.5, 8.5);
/// Inclusive ORP band (mV) for good water quality.
pub const GOOD_ORP_RANGE: (i32, i32) = (200, 800);

/// # Measurements
///
/// The three independent values one text line can carry. Any subset may be present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Acidity index (pH).
    pub acidity: Option<f64>,
    /// Oxidation-reduction potential in millivolts.
    pub redox: Option<i32>,
    /// Turbidity in NTU.
    pub turbidity: Option<i32>,
}

impl Measurements {
    /// `true` when no field was extracted.
    pub fn is_empty(&self) -> bool {
        self.acidity.is_none() && self.redox.is_none() && self.turbidity.is_none()
    }
}

impl fmt::Display for Measurements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if let Some(ph) = self.acidity {
            parts.push(format!("pH: {:.2}", ph));
        }
        if let Some(orp) = self.redox {
            parts.push(format!("ORP: {}mV", orp));
        }
        if let Some(ntu) = self.turbidity {
            parts.push(format!("NTU: {}", ntu));
        }
        write!(f, "{}", parts.join(" | "))
    }
}

/// Categorical pH label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcidityStatus {
    Acidic,
    Neutral,
    Alkaline,
}

impl AcidityStatus {
    /// Labels a pH value: `< 6.5` acidic, `> 7.5` alkaline, otherwise neutral.
    pub fn classify(ph: f64) -> Self {
        if ph < ACIDIC_BELOW {
            AcidityStatus::Acidic
        } else if ph > ALKALINE_ABOVE {
            AcidityStatus::Alkaline
        } else {
            AcidityStatus::Neutral
        }
    }

    /// The text stored in `ph_status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AcidityStatus::Acidic => "acidic",
            AcidityStatus::Neutral => "neutral",
            AcidityStatus::Alkaline => "alkaline",
        }
    }
}

/// Categorical ORP label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedoxStatus {
    #[serde(rename = "strongly oxidizing")]
    StronglyOxidizing,
    #[serde(rename = "oxidizing")]
    Oxidizing,
    #[serde(rename = "weakly oxidizing")]
    WeaklyOxidizing,
    #[serde(rename = "reducing")]
    Reducing,
}

impl RedoxStatus {
    /// Labels an ORP value in millivolts.
    pub fn classify(orp: i32) -> Self {
        if orp > 650 {
            RedoxStatus::StronglyOxidizing
        } else if orp > 300 {
            RedoxStatus::Oxidizing
        } else if orp > 0 {
            RedoxStatus::WeaklyOxidizing
        } else {
            RedoxStatus::Reducing
        }
    }

    /// The text stored in `orp_status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RedoxStatus::StronglyOxidizing => "strongly oxidizing",
            RedoxStatus::Oxidizing => "oxidizing",
            RedoxStatus::WeaklyOxidizing => "weakly oxidizing",
            RedoxStatus::Reducing => "reducing",
        }
    }
}

/// Water quality is good when both pH and ORP sit inside their bands.
///
/// Returns `None` when either input is missing; a missing value is not a bad value.
pub fn quality_good(acidity: Option<f64>, redox: Option<i32>) -> Option<bool> {
    let (ph, orp) = (acidity?, redox?);
    Some(
        (GOOD_PH_RANGE.0..=GOOD_PH_RANGE.1).contains(&ph)
            && (GOOD_ORP_RANGE.0..=GOOD_ORP_RANGE.1).contains(&orp),
    )
}

/// # Reading
///
/// One persisted row. [`Reading::from_measurements`] refuses an all-empty
/// `Measurements`, and the write path only accepts `Measurements`, so a stored
/// row always carries at least one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Server clock at capture time. The device clock is never used.
    pub captured_at: NaiveDateTime,
    pub acidity: Option<f64>,
    pub redox: Option<i32>,
    pub turbidity: Option<i32>,
    pub acidity_status: Option<AcidityStatus>,
    pub redox_status: Option<RedoxStatus>,
    pub quality_good: Option<bool>,
}

impl Reading {
    /// Freezes the derived labels for `m` at `captured_at`.
    ///
    /// Returns `None` if `m` holds no value at all.
    pub fn from_measurements(m: Measurements, captured_at: NaiveDateTime) -> Option<Self> {
        if m.is_empty() {
            return None;
        }
        Some(Self {
            captured_at,
            acidity: m.acidity,
            redox: m.redox,
            turbidity: m.turbidity,
            acidity_status: m.acidity.map(AcidityStatus::classify),
            redox_status: m.redox.map(RedoxStatus::classify),
            quality_good: quality_good(m.acidity, m.redox),
        })
    }

    /// Same as [`Reading::from_measurements`] stamped with the local wall clock.
    pub fn capture(m: Measurements) -> Option<Self> {
        Self::from_measurements(m, Local::now().naive_local())
    }

    /// The raw values of this reading.
    pub fn measurements(&self) -> Measurements {
        Measurements {
            acidity: self.acidity,
            redox: self.redox,
            turbidity: self.turbidity,
        }
    }
}

/// # Latest Data
///
/// The read-side projection served over HTTP. Values are rendered as text the
/// way the store renders them, so `ph_value` keeps its two decimals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatestData {
    pub timestamp: Option<String>,
    pub ph_value: Option<String>,
    pub orp_value: Option<String>,
    pub ntu_value: Option<String>,
}

/// # Latest Snapshot
///
/// What the latest-reading cache holds: the newest row plus the time it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    pub latest_data: LatestData,
    pub last_updated: String,
}

impl LatestSnapshot {
    /// Wraps `latest_data` with the current local time as `last_updated`.
    pub fn fetched_now(latest_data: LatestData) -> Self {
        Self {
            latest_data,
            last_updated: iso_timestamp(Local::now().naive_local()),
        }
    }
}

/// ISO-8601 without zone; microseconds are printed only when non-zero.
pub fn iso_timestamp(ts: NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

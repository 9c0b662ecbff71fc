//! Disruption parameters and the availability class defaults table
//!
//! A PDB carries exactly one of `minAvailable` or `maxUnavailable`, each
//! either an absolute pod count or a percentage of the desired replicas.
//! Percentages are kept as percentages all the way to the written PDB; pod
//! counts are only derived when two parameters have to be compared.

use std::fmt;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use thiserror::Error;

use crate::crd::{AvailabilityClass, DisruptionOverrides};

/// Reasons a user-supplied disruption value is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidDisruptionValue {
    #[error("value is empty")]
    Empty,

    #[error("'{0}' is neither a pod count nor a percentage")]
    Unparseable(String),

    #[error("pod count {0} is negative")]
    NegativeCount(i64),

    #[error("percentage {0}% is outside 0-100")]
    PercentOutOfRange(i64),

    #[error("minAvailable and maxUnavailable are mutually exclusive")]
    Contradictory,
}

/// An absolute pod count or a percentage of desired replicas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DisruptionValue {
    Count(i32),
    Percent(u8),
}

impl DisruptionValue {
    /// Parse `"3"` or `"50%"`
    pub fn parse(raw: &str) -> Result<Self, InvalidDisruptionValue> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidDisruptionValue::Empty);
        }

        if let Some(percent) = raw.strip_suffix('%') {
            let value: i64 = percent
                .trim()
                .parse()
                .map_err(|_| InvalidDisruptionValue::Unparseable(raw.to_string()))?;
            if !(0..=100).contains(&value) {
                return Err(InvalidDisruptionValue::PercentOutOfRange(value));
            }
            return Ok(DisruptionValue::Percent(value as u8));
        }

        let value: i64 = raw
            .parse()
            .map_err(|_| InvalidDisruptionValue::Unparseable(raw.to_string()))?;
        Self::count(value)
    }

    pub fn from_int_or_string(value: &IntOrString) -> Result<Self, InvalidDisruptionValue> {
        match value {
            IntOrString::Int(n) => Self::count(i64::from(*n)),
            IntOrString::String(s) => Self::parse(s),
        }
    }

    fn count(value: i64) -> Result<Self, InvalidDisruptionValue> {
        if value < 0 {
            return Err(InvalidDisruptionValue::NegativeCount(value));
        }
        i32::try_from(value)
            .map(DisruptionValue::Count)
            .map_err(|_| InvalidDisruptionValue::Unparseable(value.to_string()))
    }

    pub fn to_int_or_string(self) -> IntOrString {
        match self {
            DisruptionValue::Count(n) => IntOrString::Int(n),
            DisruptionValue::Percent(p) => IntOrString::String(format!("{}%", p)),
        }
    }

    /// Number of pods this value stands for, rounding percentages up
    pub fn pods(self, replicas: i32) -> i32 {
        let replicas = replicas.max(0);
        match self {
            DisruptionValue::Count(n) => n.min(replicas),
            DisruptionValue::Percent(p) => {
                let scaled = i64::from(replicas) * i64::from(p);
                ((scaled + 99) / 100) as i32
            }
        }
    }
}

impl fmt::Display for DisruptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisruptionValue::Count(n) => write!(f, "{}", n),
            DisruptionValue::Percent(p) => write!(f, "{}%", p),
        }
    }
}

/// The single disruption parameter written to a PDB
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DisruptionParameter {
    MinAvailable(DisruptionValue),
    MaxUnavailable(DisruptionValue),
}

impl DisruptionParameter {
    /// Build from an optional pair, rejecting pairs that set both
    pub fn from_pair(
        min_available: Option<&IntOrString>,
        max_unavailable: Option<&IntOrString>,
    ) -> Result<Option<Self>, InvalidDisruptionValue> {
        match (min_available, max_unavailable) {
            (Some(_), Some(_)) => Err(InvalidDisruptionValue::Contradictory),
            (Some(min), None) => Ok(Some(DisruptionParameter::MinAvailable(
                DisruptionValue::from_int_or_string(min)?,
            ))),
            (None, Some(max)) => Ok(Some(DisruptionParameter::MaxUnavailable(
                DisruptionValue::from_int_or_string(max)?,
            ))),
            (None, None) => Ok(None),
        }
    }

    pub fn from_overrides(
        overrides: &DisruptionOverrides,
    ) -> Result<Option<Self>, InvalidDisruptionValue> {
        Self::from_pair(
            overrides.min_available.as_ref(),
            overrides.max_unavailable.as_ref(),
        )
    }

    /// Pods guaranteed to stay up during voluntary disruptions
    pub fn guaranteed_available(&self, replicas: i32) -> i32 {
        let replicas = replicas.max(0);
        match self {
            DisruptionParameter::MinAvailable(value) => value.pods(replicas),
            DisruptionParameter::MaxUnavailable(value) => {
                (replicas - value.pods(replicas)).max(0)
            }
        }
    }

    /// True when `self` keeps strictly more pods up than `other`
    pub fn is_more_restrictive_than(&self, other: &DisruptionParameter, replicas: i32) -> bool {
        self.guaranteed_available(replicas) > other.guaranteed_available(replicas)
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            DisruptionParameter::MinAvailable(_) => "minAvailable",
            DisruptionParameter::MaxUnavailable(_) => "maxUnavailable",
        }
    }

    pub fn value(&self) -> DisruptionValue {
        match self {
            DisruptionParameter::MinAvailable(v) | DisruptionParameter::MaxUnavailable(v) => *v,
        }
    }

    /// `(minAvailable, maxUnavailable)` as written into a PDB spec
    pub fn to_pdb_fields(&self) -> (Option<IntOrString>, Option<IntOrString>) {
        match self {
            DisruptionParameter::MinAvailable(v) => (Some(v.to_int_or_string()), None),
            DisruptionParameter::MaxUnavailable(v) => (None, Some(v.to_int_or_string())),
        }
    }
}

impl fmt::Display for DisruptionParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field_name(), self.value())
    }
}

/// Replicas a class needs before it materializes as-is
pub fn class_min_replicas(class: AvailabilityClass) -> i32 {
    match class {
        AvailabilityClass::NonCritical => 1,
        AvailabilityClass::Standard => 2,
        AvailabilityClass::HighAvailability => 2,
        AvailabilityClass::MissionCritical => 3,
    }
}

/// Built-in defaults table
///
/// | class             | default                   |
/// |-------------------|---------------------------|
/// | non-critical      | minAvailable 0%           |
/// | standard          | minAvailable 50%          |
/// | high-availability | minAvailable 75%          |
/// | mission-critical  | minAvailable replicas - 1 |
pub fn class_default(class: AvailabilityClass, replicas: i32) -> DisruptionParameter {
    match class {
        AvailabilityClass::NonCritical => {
            DisruptionParameter::MinAvailable(DisruptionValue::Percent(0))
        }
        AvailabilityClass::Standard => {
            DisruptionParameter::MinAvailable(DisruptionValue::Percent(50))
        }
        AvailabilityClass::HighAvailability => {
            DisruptionParameter::MinAvailable(DisruptionValue::Percent(75))
        }
        AvailabilityClass::MissionCritical => {
            DisruptionParameter::MinAvailable(DisruptionValue::Count((replicas - 1).max(0)))
        }
    }
}

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryRecord {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRecord {
    pub name: String,
    pub network: String,
    pub open_date: String,
    pub connectors: Vec<String>,
    pub pricing: String,
    pub level: ChargingLevel,
    pub location: Point<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRecord {
    pub region: String,
    pub year: i32,
    pub coverage_pct: f64,
    pub readiness_tier: ReadinessTier,
    pub stations_per_million: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsRecord {
    pub year: i32,
    pub total_stations: u64,
    pub dc_fast_stations: u64,
    pub states_covered: u32,
}

/// Ordinal maturity category of a region's charging infrastructure.
///
/// Anything outside the known vocabulary is kept as `Unknown` so a single odd
/// row never sinks a whole dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReadinessTier {
    Nascent,
    Emerging,
    Developing,
    Established,
    Leading,
    Unknown(String),
}

impl ReadinessTier {
    /// Position on the readiness scale, `None` for unknown tiers.
    pub fn ordinal(&self) -> Option<usize> {
        match self {
            Self::Nascent => Some(0),
            Self::Emerging => Some(1),
            Self::Developing => Some(2),
            Self::Established => Some(3),
            Self::Leading => Some(4),
            Self::Unknown(_) => None,
        }
    }
}

impl From<String> for ReadinessTier {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nascent" => Self::Nascent,
            "emerging" => Self::Emerging,
            "developing" => Self::Developing,
            "established" => Self::Established,
            "leading" => Self::Leading,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<ReadinessTier> for String {
    fn from(tier: ReadinessTier) -> Self {
        tier.to_string()
    }
}

impl fmt::Display for ReadinessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nascent => f.write_str("nascent"),
            Self::Emerging => f.write_str("emerging"),
            Self::Developing => f.write_str("developing"),
            Self::Established => f.write_str("established"),
            Self::Leading => f.write_str("leading"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Charging level as published by the station feed ("Level 2", "DC Fast").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChargingLevel {
    Level1,
    Level2,
    DcFast,
    Unknown(String),
}

impl From<String> for ChargingLevel {
    fn from(raw: String) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "level1" | "l1" => Self::Level1,
            "level2" | "l2" => Self::Level2,
            "dcfast" | "dcfc" | "level3" | "l3" => Self::DcFast,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<ChargingLevel> for String {
    fn from(level: ChargingLevel) -> Self {
        match level {
            ChargingLevel::Level1 => "Level 1".to_string(),
            ChargingLevel::Level2 => "Level 2".to_string(),
            ChargingLevel::DcFast => "DC Fast".to_string(),
            ChargingLevel::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            longitude: -98.5,
            latitude: 39.8,
            zoom: 3.5,
            pitch: 0.0,
            bearing: 0.0,
        }
    }
}

/// Reference to a rendered feature by its position in the composed arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum FeatureRef {
    Station(usize),
    Region(usize),
}

impl FromStr for FeatureRef {
    type Err = String;

    /// Parses `station:3` or `region:0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<index>, got {s:?}"))?;
        let index: usize = index
            .trim()
            .parse()
            .map_err(|_| format!("invalid feature index in {s:?}"))?;
        match kind.trim() {
            "station" => Ok(Self::Station(index)),
            "region" => Ok(Self::Region(index)),
            other => Err(format!("unknown feature kind {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub camera: Camera,
    /// Coverage year to show; the latest year in the data when absent.
    pub year: Option<i32>,
    pub selection: Option<FeatureRef>,
}

use crate::error::DataError;
use crate::types::{BoundaryRecord, CoverageRecord, ReadinessTier, StationRecord, TotalsRecord};
use geo::{Geometry, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson};
use serde::Deserialize;
use std::collections::HashSet;

/// A dataset kind and the decoder for its document.
pub trait Dataset: Send + Sync + 'static {
    type Records: Send + Sync + 'static;

    /// Short name used in logs.
    const NAME: &'static str;

    fn decode(identifier: &str, body: &[u8]) -> Result<Self::Records, DataError>;
}

pub struct Boundaries;
pub struct Stations;
pub struct Coverage;
pub struct Totals;

impl Dataset for Boundaries {
    type Records = Vec<BoundaryRecord>;
    const NAME: &'static str = "boundaries";

    fn decode(identifier: &str, body: &[u8]) -> Result<Self::Records, DataError> {
        let collection = feature_collection(identifier, body)?;
        collection
            .features
            .into_iter()
            .enumerate()
            .map(|(i, feature)| boundary(identifier, i, feature))
            .collect()
    }
}

impl Dataset for Stations {
    type Records = Vec<StationRecord>;
    const NAME: &'static str = "stations";

    fn decode(identifier: &str, body: &[u8]) -> Result<Self::Records, DataError> {
        let collection = feature_collection(identifier, body)?;
        collection
            .features
            .into_iter()
            .enumerate()
            .map(|(i, feature)| station(identifier, i, feature))
            .collect()
    }
}

impl Dataset for Coverage {
    type Records = Vec<CoverageRecord>;
    const NAME: &'static str = "coverage";

    fn decode(identifier: &str, body: &[u8]) -> Result<Self::Records, DataError> {
        let rows: Vec<CoverageRow> =
            serde_json::from_slice(body).map_err(|e| DataError::parse(identifier, e))?;

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if !(0.0..=100.0).contains(&row.coverage_pct) {
                return Err(DataError::parse(
                    identifier,
                    format!(
                        "coverage for {} in {} is {}, outside 0-100",
                        row.state, row.year, row.coverage_pct
                    ),
                ));
            }
            if !seen.insert((row.state.clone(), row.year)) {
                return Err(DataError::parse(
                    identifier,
                    format!("duplicate coverage row for {} in {}", row.state, row.year),
                ));
            }
            records.push(CoverageRecord {
                region: row.state,
                year: row.year,
                coverage_pct: row.coverage_pct,
                readiness_tier: row.readiness_tier,
                stations_per_million: row.stations_per_million,
            });
        }
        Ok(records)
    }
}

impl Dataset for Totals {
    type Records = TotalsRecord;
    const NAME: &'static str = "totals";

    fn decode(identifier: &str, body: &[u8]) -> Result<Self::Records, DataError> {
        let totals: TotalsRecord =
            serde_json::from_slice(body).map_err(|e| DataError::parse(identifier, e))?;
        if totals.dc_fast_stations > totals.total_stations {
            return Err(DataError::parse(
                identifier,
                format!(
                    "{} fast-charging stations exceed the total of {}",
                    totals.dc_fast_stations, totals.total_stations
                ),
            ));
        }
        Ok(totals)
    }
}

#[derive(Deserialize)]
struct CoverageRow {
    state: String,
    year: i32,
    coverage_pct: f64,
    readiness_tier: ReadinessTier,
    stations_per_million: f64,
}

#[derive(Deserialize)]
struct StationProperties {
    name: String,
    #[serde(default)]
    network: String,
    #[serde(default)]
    open_date: String,
    #[serde(default)]
    connectors: String,
    #[serde(default)]
    pricing: String,
    #[serde(default)]
    level: String,
}

fn feature_collection(identifier: &str, body: &[u8]) -> Result<FeatureCollection, DataError> {
    let text = std::str::from_utf8(body).map_err(|e| DataError::parse(identifier, e))?;
    let geojson: GeoJson = text.parse().map_err(|e| DataError::parse(identifier, e))?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(DataError::parse(identifier, "GeoJSON must be a FeatureCollection")),
    }
}

fn geometry(identifier: &str, index: usize, feature: &Feature) -> Result<Geometry<f64>, DataError> {
    let value = feature
        .geometry
        .as_ref()
        .map(|g| g.value.clone())
        .ok_or_else(|| DataError::parse(identifier, format!("feature {index} has no geometry")))?;
    value.try_into().map_err(|e: geojson::Error| {
        DataError::parse(identifier, format!("feature {index}: {e}"))
    })
}

fn boundary(identifier: &str, index: usize, feature: Feature) -> Result<BoundaryRecord, DataError> {
    let name = match feature.property("name") {
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => {
            return Err(DataError::parse(
                identifier,
                format!("feature {index} has no string `name` property"),
            ))
        }
    };

    let geometry = match geometry(identifier, index, &feature)? {
        Geometry::MultiPolygon(mp) => mp,
        Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
        _ => {
            return Err(DataError::parse(
                identifier,
                format!("region {name} is not a polygon or multipolygon"),
            ))
        }
    };

    Ok(BoundaryRecord { name, geometry })
}

fn station(identifier: &str, index: usize, feature: Feature) -> Result<StationRecord, DataError> {
    let location: Point<f64> = match geometry(identifier, index, &feature)? {
        Geometry::Point(p) => p,
        _ => {
            return Err(DataError::parse(
                identifier,
                format!("station {index} is not a point"),
            ))
        }
    };

    let properties = serde_json::Value::Object(feature.properties.unwrap_or_default());
    let props: StationProperties = serde_json::from_value(properties)
        .map_err(|e| DataError::parse(identifier, format!("station {index}: {e}")))?;

    let connectors = props
        .connectors
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    Ok(StationRecord {
        name: props.name,
        network: props.network,
        open_date: props.open_date,
        connectors,
        pricing: props.pricing,
        level: props.level.into(),
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChargingLevel;

    const STATES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "CA"},
             "geometry": {"type": "Polygon", "coordinates": [[[-124,32],[-114,32],[-114,42],[-124,42],[-124,32]]]}},
            {"type": "Feature", "properties": {"name": "HI"},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[-160,19],[-155,19],[-155,22],[-160,19]]]]}}
        ]
    }"#;

    const STATIONS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-118.2, 34.0]},
             "properties": {"name": "LA Hub", "network": "EVgo", "open_date": "2021-05-01",
                            "connectors": "CCS, CHAdeMO", "pricing": "per kWh", "level": "DC Fast"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-122.4, 37.8]},
             "properties": {"name": "SF Garage", "level": "Level 2"}}
        ]
    }"#;

    #[test]
    fn decodes_boundaries_as_multipolygons() {
        let records = Boundaries::decode("states", STATES.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "CA");
        assert_eq!(records[0].geometry.0.len(), 1);
        assert_eq!(records[1].name, "HI");
    }

    #[test]
    fn boundary_without_name_is_rejected() {
        let body = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;
        let err = Boundaries::decode("states", body.as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Parse { .. }));
    }

    #[test]
    fn decodes_stations_and_splits_connectors() {
        let records = Stations::decode("stations", STATIONS.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].connectors, vec!["CCS", "CHAdeMO"]);
        assert_eq!(records[0].level, ChargingLevel::DcFast);
        assert_eq!(records[0].location, Point::new(-118.2, 34.0));
        assert!(records[1].connectors.is_empty());
        assert_eq!(records[1].network, "");
    }

    #[test]
    fn station_must_be_a_point() {
        let err = Stations::decode("stations", STATES.as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Parse { .. }));
    }

    #[test]
    fn not_a_feature_collection() {
        let body = r#"{"type": "Point", "coordinates": [0, 0]}"#;
        assert!(Stations::decode("stations", body.as_bytes()).is_err());
        assert!(Stations::decode("stations", b"<html>").is_err());
    }

    #[test]
    fn coverage_keeps_unknown_tiers() {
        let body = r#"[
            {"state": "CA", "year": 2024, "coverage_pct": 62.5, "readiness_tier": "emerging", "stations_per_million": 3.1},
            {"state": "NV", "year": 2024, "coverage_pct": 10, "readiness_tier": "UNKNOWN_TIER", "stations_per_million": 0.4}
        ]"#;
        let records = Coverage::decode("coverage", body.as_bytes()).unwrap();
        assert_eq!(records[0].readiness_tier, ReadinessTier::Emerging);
        assert_eq!(
            records[1].readiness_tier,
            ReadinessTier::Unknown("UNKNOWN_TIER".to_string())
        );
    }

    #[test]
    fn coverage_rejects_out_of_range_and_duplicates() {
        let out_of_range = r#"[{"state": "CA", "year": 2024, "coverage_pct": 100.5,
            "readiness_tier": "leading", "stations_per_million": 1}]"#;
        assert!(Coverage::decode("coverage", out_of_range.as_bytes()).is_err());

        let duplicate = r#"[
            {"state": "CA", "year": 2024, "coverage_pct": 1, "readiness_tier": "nascent", "stations_per_million": 1},
            {"state": "CA", "year": 2024, "coverage_pct": 2, "readiness_tier": "nascent", "stations_per_million": 1}
        ]"#;
        assert!(Coverage::decode("coverage", duplicate.as_bytes()).is_err());
    }

    #[test]
    fn totals_enforce_fast_not_above_total() {
        let ok = r#"{"year": 2024, "totalStations": 100, "dcFastStations": 20, "statesCovered": 50}"#;
        let totals = Totals::decode("totals", ok.as_bytes()).unwrap();
        assert_eq!(totals.total_stations, 100);

        let bad = r#"{"year": 2024, "totalStations": 10, "dcFastStations": 20, "statesCovered": 50}"#;
        assert!(Totals::decode("totals", bad.as_bytes()).is_err());
    }
}

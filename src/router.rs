use crate::compose::{LayerId, MapData};
use crate::types::{BoundaryRecord, CoverageRecord, FeatureRef, StationRecord, ViewState};
use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickKind {
    #[default]
    Hover,
    Click,
}

/// A raw pointer interaction from the canvas. `index` is absent when the
/// pointer is over empty map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickEvent {
    pub layer: LayerId,
    pub index: Option<usize>,
    #[serde(default)]
    pub kind: PickKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainRef {
    Station {
        index: usize,
        record: StationRecord,
    },
    Region {
        index: usize,
        record: BoundaryRecord,
        coverage: Option<CoverageRecord>,
    },
}

impl DomainRef {
    pub fn feature_ref(&self) -> FeatureRef {
        match self {
            Self::Station { index, .. } => FeatureRef::Station(*index),
            Self::Region { index, .. } => FeatureRef::Region(*index),
        }
    }
}

/// What the presentation layer should do with a pick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum Interaction {
    Hover(Option<DomainRef>),
    Select(DomainRef),
    Clear,
}

impl ViewState {
    /// Applies a click to the active selection. Hovering leaves it alone.
    pub fn apply(&mut self, interaction: &Interaction) {
        match interaction {
            Interaction::Hover(_) => {}
            Interaction::Select(target) => self.selection = Some(target.feature_ref()),
            Interaction::Clear => self.selection = None,
        }
    }
}

struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Resolves picks against the records most recently handed to the composer.
///
/// Build a new router every time the composer receives new records, from the
/// same [`MapData`], so feature indices keep lining up.
pub struct InteractionRouter {
    data: MapData,
    year: Option<i32>,
    regions: RTree<RegionEnvelope>,
}

impl InteractionRouter {
    pub fn new(data: MapData, view: &ViewState) -> Self {
        let envelopes = data
            .boundaries
            .iter()
            .enumerate()
            .filter_map(|(index, region)| {
                let rect = region.geometry.bounding_rect()?;
                Some(RegionEnvelope {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Self {
            year: data.coverage_year(view),
            regions: RTree::bulk_load(envelopes),
            data,
        }
    }

    /// Position-based lookup. Out-of-range indices and background picks give
    /// `None`.
    pub fn resolve(&self, pick: &PickEvent) -> Option<DomainRef> {
        let index = pick.index?;
        match pick.layer {
            LayerId::Stations => self.station(index),
            LayerId::Boundaries | LayerId::Coverage => self.region(index),
            LayerId::Highlight => None,
        }
    }

    pub fn dispatch(&self, pick: &PickEvent) -> Interaction {
        let target = self.resolve(pick);
        match (pick.kind, target) {
            (PickKind::Hover, target) => Interaction::Hover(target),
            (PickKind::Click, Some(target)) => Interaction::Select(target),
            (PickKind::Click, None) => Interaction::Clear,
        }
    }

    /// Region containing the given coordinate, for canvases that report
    /// positions instead of feature indices.
    pub fn resolve_coordinate(&self, lon: f64, lat: f64) -> Option<DomainRef> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);
        let mut candidates: Vec<usize> = self
            .regions
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .collect();
        // Lowest index wins when regions overlap, independent of tree layout.
        candidates.sort_unstable();

        candidates
            .into_iter()
            .find(|&i| self.data.boundaries[i].geometry.contains(&point))
            .and_then(|i| self.region(i))
    }

    fn station(&self, index: usize) -> Option<DomainRef> {
        let record = self.data.stations.get(index)?.clone();
        Some(DomainRef::Station { index, record })
    }

    fn region(&self, index: usize) -> Option<DomainRef> {
        let record = self.data.boundaries.get(index)?.clone();
        let coverage = self
            .year
            .and_then(|year| self.data.coverage_for(&record.name, year))
            .cloned();
        Some(DomainRef::Region {
            index,
            record,
            coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::{california, coverage, nevada, scenario, station};
    use crate::compose::{compose, GeometrySource};
    use crate::types::ChargingLevel;
    use std::sync::Arc;

    fn pick(layer: LayerId, index: Option<usize>, kind: PickKind) -> PickEvent {
        PickEvent { layer, index, kind }
    }

    #[test]
    fn station_index_matches_composed_position() {
        let data = scenario();
        let view = ViewState::default();
        let layers = compose(&data, &view);
        let router = InteractionRouter::new(data.clone(), &view);

        let GeometrySource::Points(points) = &layers[2].geometry else {
            panic!("stations layer should hold points");
        };
        for (i, point) in points.iter().enumerate() {
            match router.resolve(&pick(LayerId::Stations, Some(i), PickKind::Hover)) {
                Some(DomainRef::Station { index, record }) => {
                    assert_eq!(index, i);
                    assert_eq!(&record, &data.stations[i]);
                    assert_eq!(&record.location, point);
                }
                other => panic!("unexpected pick result {other:?}"),
            }
        }
    }

    #[test]
    fn out_of_range_and_background_are_absent() {
        let data = scenario();
        let router = InteractionRouter::new(data, &ViewState::default());

        assert!(router.resolve(&pick(LayerId::Stations, Some(2), PickKind::Click)).is_none());
        assert!(router.resolve(&pick(LayerId::Coverage, Some(1), PickKind::Click)).is_none());
        assert!(router.resolve(&pick(LayerId::Stations, None, PickKind::Click)).is_none());
        assert!(router.resolve(&pick(LayerId::Highlight, Some(0), PickKind::Click)).is_none());
    }

    #[test]
    fn region_picks_carry_coverage_for_the_year() {
        let data = scenario();
        let router = InteractionRouter::new(data, &ViewState::default());

        match router.resolve(&pick(LayerId::Coverage, Some(0), PickKind::Hover)) {
            Some(DomainRef::Region {
                index,
                record,
                coverage,
            }) => {
                assert_eq!(index, 0);
                assert_eq!(record.name, "CA");
                assert_eq!(coverage.unwrap().coverage_pct, 62.5);
            }
            other => panic!("unexpected pick result {other:?}"),
        }
    }

    #[test]
    fn dispatch_and_apply_update_selection() {
        let data = scenario();
        let mut view = ViewState::default();
        let router = InteractionRouter::new(data, &view);

        let hover = router.dispatch(&pick(LayerId::Stations, Some(1), PickKind::Hover));
        assert!(matches!(hover, Interaction::Hover(Some(_))));
        view.apply(&hover);
        assert_eq!(view.selection, None);

        let click = router.dispatch(&pick(LayerId::Stations, Some(1), PickKind::Click));
        view.apply(&click);
        assert_eq!(view.selection, Some(FeatureRef::Station(1)));

        let background = router.dispatch(&pick(LayerId::Stations, None, PickKind::Click));
        assert_eq!(background, Interaction::Clear);
        view.apply(&background);
        assert_eq!(view.selection, None);
    }

    #[test]
    fn coordinate_lookup_finds_containing_region() {
        let data = MapData {
            boundaries: Arc::new(vec![california(), nevada()]),
            stations: Arc::new(vec![station("Reno", -119.8, 39.5, ChargingLevel::Level2)]),
            coverage: Arc::new(vec![coverage("NV", 2024, 20.0, "nascent")]),
        };
        let router = InteractionRouter::new(data, &ViewState::default());

        match router.resolve_coordinate(-117.0, 33.0) {
            Some(DomainRef::Region { record, .. }) => assert_eq!(record.name, "CA"),
            other => panic!("unexpected lookup result {other:?}"),
        }
        // Inside both envelopes; the lower index wins.
        match router.resolve_coordinate(-117.0, 38.0) {
            Some(DomainRef::Region { index, .. }) => assert_eq!(index, 0),
            other => panic!("unexpected lookup result {other:?}"),
        }
        assert!(router.resolve_coordinate(0.0, 0.0).is_none());
    }

    #[test]
    fn pick_event_deserializes_with_default_kind() {
        let pick: PickEvent = serde_json::from_str(r#"{"layer": "stations", "index": 4}"#).unwrap();
        assert_eq!(pick.kind, PickKind::Hover);
        assert_eq!(pick.index, Some(4));
    }
}

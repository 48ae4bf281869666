use crate::style::{zoom_scale, Rgba, Style, TRANSPARENT};
use crate::types::{BoundaryRecord, CoverageRecord, FeatureRef, StationRecord, ViewState};
use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Records from every dataset the map view depends on.
#[derive(Debug, Clone)]
pub struct MapData {
    pub boundaries: Arc<Vec<BoundaryRecord>>,
    pub stations: Arc<Vec<StationRecord>>,
    pub coverage: Arc<Vec<CoverageRecord>>,
}

impl MapData {
    /// The requested year, or the most recent one with coverage data.
    pub fn coverage_year(&self, view: &ViewState) -> Option<i32> {
        view.year
            .or_else(|| self.coverage.iter().map(|c| c.year).max())
    }

    pub fn coverage_for(&self, region: &str, year: i32) -> Option<&CoverageRecord> {
        self.coverage
            .iter()
            .find(|c| c.year == year && c.region == region)
    }

    fn coverage_by_region(&self, year: Option<i32>) -> HashMap<&str, &CoverageRecord> {
        let Some(year) = year else {
            return HashMap::new();
        };
        self.coverage
            .iter()
            .filter(|c| c.year == year)
            .map(|c| (c.region.as_str(), c))
            .collect()
    }
}

/// Layers in bottom-to-top drawing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerId {
    Boundaries,
    Coverage,
    Stations,
    Highlight,
}

impl LayerId {
    pub const ORDER: [LayerId; 4] = [
        LayerId::Boundaries,
        LayerId::Coverage,
        LayerId::Stations,
        LayerId::Highlight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boundaries => "boundaries",
            Self::Coverage => "coverage",
            Self::Stations => "stations",
            Self::Highlight => "highlight",
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown layer: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "features", rename_all = "snake_case")]
pub enum GeometrySource {
    Polygons(Vec<MultiPolygon<f64>>),
    Points(Vec<Point<f64>>),
}

impl GeometrySource {
    pub fn len(&self) -> usize {
        match self {
            Self::Polygons(p) => p.len(),
            Self::Points(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Visual attributes of one feature, parallel to the geometry array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureStyle {
    pub fill: Rgba,
    pub line: Rgba,
    /// Pixel radius for points, zero for polygons.
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InteractionFlags {
    pub hoverable: bool,
    pub clickable: bool,
}

impl InteractionFlags {
    const PICKABLE: Self = Self {
        hoverable: true,
        clickable: true,
    };
    const INERT: Self = Self {
        hoverable: false,
        clickable: false,
    };
}

/// A renderable layer, independent of any rendering library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerDescriptor {
    pub id: LayerId,
    pub geometry: GeometrySource,
    pub styles: Vec<FeatureStyle>,
    pub line_width: f64,
    pub interaction: InteractionFlags,
}

pub fn compose(data: &MapData, view: &ViewState) -> Vec<LayerDescriptor> {
    compose_with(&Style::default(), data, view)
}

pub fn compose_with(style: &Style, data: &MapData, view: &ViewState) -> Vec<LayerDescriptor> {
    let year = data.coverage_year(view);
    let coverage = data.coverage_by_region(year);

    let mut layers = vec![
        boundaries_layer(style, data, &coverage),
        coverage_layer(style, data, &coverage),
        stations_layer(style, data, view),
    ];
    if let Some(highlight) = highlight_layer(style, data, view) {
        layers.push(highlight);
    }

    debug!(
        year = ?year,
        regions = data.boundaries.len(),
        stations = data.stations.len(),
        layers = layers.len(),
        "Composed map layers"
    );
    layers
}

fn polygons(boundaries: &[BoundaryRecord]) -> GeometrySource {
    GeometrySource::Polygons(boundaries.iter().map(|b| b.geometry.clone()).collect())
}

fn boundaries_layer(
    style: &Style,
    data: &MapData,
    coverage: &HashMap<&str, &CoverageRecord>,
) -> LayerDescriptor {
    let styles = data
        .boundaries
        .iter()
        .map(|b| FeatureStyle {
            fill: TRANSPARENT,
            line: coverage
                .get(b.name.as_str())
                .map_or(style.unknown, |c| style.tier_color(&c.readiness_tier)),
            radius: 0.0,
        })
        .collect();

    LayerDescriptor {
        id: LayerId::Boundaries,
        geometry: polygons(&data.boundaries),
        styles,
        line_width: 1.5,
        interaction: InteractionFlags::PICKABLE,
    }
}

fn coverage_layer(
    style: &Style,
    data: &MapData,
    coverage: &HashMap<&str, &CoverageRecord>,
) -> LayerDescriptor {
    let styles = data
        .boundaries
        .iter()
        .map(|b| {
            let fill = match coverage.get(b.name.as_str()) {
                Some(c) => style.coverage_color(c.coverage_pct),
                None => style.unknown,
            };
            FeatureStyle {
                fill: Style::with_alpha(fill, style.fill_alpha),
                line: TRANSPARENT,
                radius: 0.0,
            }
        })
        .collect();

    LayerDescriptor {
        id: LayerId::Coverage,
        geometry: polygons(&data.boundaries),
        styles,
        line_width: 0.0,
        interaction: InteractionFlags::PICKABLE,
    }
}

fn stations_layer(style: &Style, data: &MapData, view: &ViewState) -> LayerDescriptor {
    let scale = zoom_scale(view.camera.zoom);
    let styles = data
        .stations
        .iter()
        .map(|s| {
            let marker = style.marker(&s.level);
            FeatureStyle {
                fill: marker.color,
                line: TRANSPARENT,
                radius: marker.radius * scale,
            }
        })
        .collect();

    LayerDescriptor {
        id: LayerId::Stations,
        geometry: GeometrySource::Points(data.stations.iter().map(|s| s.location).collect()),
        styles,
        line_width: 0.0,
        interaction: InteractionFlags::PICKABLE,
    }
}

/// Outline of the selected feature, drawn above everything else. Selections
/// that no longer point at a record are ignored.
fn highlight_layer(style: &Style, data: &MapData, view: &ViewState) -> Option<LayerDescriptor> {
    let (geometry, styles) = match view.selection? {
        FeatureRef::Station(i) => {
            let station = data.stations.get(i)?;
            let marker = style.marker(&station.level);
            (
                GeometrySource::Points(vec![station.location]),
                FeatureStyle {
                    fill: TRANSPARENT,
                    line: style.highlight,
                    radius: marker.radius * zoom_scale(view.camera.zoom) * 1.5,
                },
            )
        }
        FeatureRef::Region(i) => {
            let region = data.boundaries.get(i)?;
            (
                GeometrySource::Polygons(vec![region.geometry.clone()]),
                FeatureStyle {
                    fill: TRANSPARENT,
                    line: style.highlight,
                    radius: 0.0,
                },
            )
        }
    };

    Some(LayerDescriptor {
        id: LayerId::Highlight,
        geometry,
        styles: vec![styles],
        line_width: 3.0,
        interaction: InteractionFlags::INERT,
    })
}

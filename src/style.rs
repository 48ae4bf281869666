use crate::types::{ChargingLevel, ReadinessTier};
use serde::Serialize;

pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

pub fn hex_to_rgba(hex: &str) -> Option<Rgba> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 && hex.len() != 8 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Some([channel(0)?, channel(2)?, channel(4)?, alpha])
}

/// Piecewise linear color scale over 0-100.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<(f64, Rgba)>,
}

impl ColorRamp {
    /// Stops must be sorted by position; an empty ramp samples as transparent.
    pub fn new(stops: Vec<(f64, Rgba)>) -> Self {
        Self { stops }
    }

    pub fn stop(&self, index: usize) -> Option<Rgba> {
        self.stops.get(index).map(|(_, color)| *color)
    }

    /// Color at `value`, clamped to the first and last stops. NaN samples the
    /// first stop.
    pub fn sample(&self, value: f64) -> Rgba {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return TRANSPARENT;
        };
        if value.is_nan() || value <= first.0 {
            return first.1;
        }
        if value >= last.0 {
            return last.1;
        }
        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if value <= hi.0 {
                let t = (value - lo.0) / (hi.0 - lo.0);
                return lerp(lo.1, hi.1, t);
            }
        }
        last.1
    }
}

fn lerp(a: Rgba, b: Rgba, t: f64) -> Rgba {
    let mut out = [0; 4];
    for i in 0..4 {
        let v = a[i] as f64 + (b[i] as f64 - a[i] as f64) * t;
        out[i] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Marker {
    pub color: Rgba,
    pub radius: f64,
}

/// The full set of encoding rules the composer applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub ramp: ColorRamp,
    /// Used for any category or value that has no mapping.
    pub unknown: Rgba,
    pub level1: Marker,
    pub level2: Marker,
    pub dc_fast: Marker,
    pub unknown_level: Marker,
    pub highlight: Rgba,
    /// Alpha applied to choropleth fills.
    pub fill_alpha: u8,
}

impl Default for Style {
    fn default() -> Self {
        let color = |hex: &str| hex_to_rgba(hex).unwrap_or(TRANSPARENT);
        Self {
            ramp: ColorRamp::new(vec![
                (0.0, color("#1B2735")),
                (25.0, color("#5B2A86")),
                (50.0, color("#BD00FF")),
                (75.0, color("#6A5CFF")),
                (100.0, color("#00CFFF")),
            ]),
            unknown: color("#808080"),
            level1: Marker {
                color: color("#7DD3FC"),
                radius: 3.0,
            },
            level2: Marker {
                color: color("#00CFFF"),
                radius: 5.0,
            },
            dc_fast: Marker {
                color: color("#BD00FF"),
                radius: 8.0,
            },
            unknown_level: Marker {
                color: color("#808080"),
                radius: 4.0,
            },
            highlight: color("#FFFFFF"),
            fill_alpha: 180,
        }
    }
}

impl Style {
    /// Tiers sit on the ramp stops in order; unknown tiers are grey.
    pub fn tier_color(&self, tier: &ReadinessTier) -> Rgba {
        tier.ordinal()
            .and_then(|i| self.ramp.stop(i))
            .unwrap_or(self.unknown)
    }

    pub fn coverage_color(&self, coverage_pct: f64) -> Rgba {
        self.ramp.sample(coverage_pct)
    }

    pub fn marker(&self, level: &ChargingLevel) -> Marker {
        match level {
            ChargingLevel::Level1 => self.level1,
            ChargingLevel::Level2 => self.level2,
            ChargingLevel::DcFast => self.dc_fast,
            ChargingLevel::Unknown(_) => self.unknown_level,
        }
    }

    pub fn with_alpha(color: Rgba, alpha: u8) -> Rgba {
        [color[0], color[1], color[2], alpha]
    }
}

/// Marker size multiplier for a camera zoom, doubling every two zoom levels
/// from zoom 4.
pub fn zoom_scale(zoom: f64) -> f64 {
    if !zoom.is_finite() {
        return 1.0;
    }
    2f64.powf((zoom - 4.0) / 2.0).clamp(0.5, 3.0)
}

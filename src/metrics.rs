//! Pure conversions from raw register values to display-ready metrics
//!
//! Nothing in here holds state: every function is a plain mapping so that the
//! snapshot can recompute derived values on each access.

/// Sixteen-point compass, clockwise from north
const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// EPA PM2.5 breakpoints: (low_conc, high_conc, low_aqi, high_aqi)
///
/// The last entry is also used to extrapolate readings beyond 500.4 µg/m³.
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 6] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 500.4, 301.0, 500.0),
];

/// Convert a raw register to physical units using the sensor's fixed divisor
pub fn scale(raw: u16, divisor: f64) -> f64 {
    raw as f64 / divisor
}

/// Wind direction in whole degrees from the vane's first and third registers
///
/// Both registers carry tenths of a degree; their mean is used. Readings that
/// land outside 0..=360 are treated as missing rather than clamped.
pub fn wind_direction_degrees(first: u16, third: u16) -> Option<i64> {
    let average = (first as f64 + third as f64) / 2.0;
    let degrees = (average / 10.0).round_ties_even() as i64;
    (0..=360).contains(&degrees).then_some(degrees)
}

/// Map degrees to a 16-point compass name, or "Unknown" when undefined
pub fn cardinal(degrees: Option<f64>) -> &'static str {
    match degrees {
        Some(d) if (0.0..=360.0).contains(&d) => {
            let index = (d / 22.5).round_ties_even() as usize % COMPASS_POINTS.len();
            COMPASS_POINTS[index]
        }
        _ => "Unknown",
    }
}

/// US EPA air quality index for a PM2.5 concentration (µg/m³)
///
/// Linear interpolation inside the matching breakpoint band. Values falling in
/// the 0.1 gaps between bands are assigned to the next band up.
pub fn aqi_from_pm25(pm2_5: Option<f64>) -> Option<f64> {
    let value = pm2_5.filter(|v| v.is_finite())?;

    let (low_conc, high_conc, low_aqi, high_aqi) = PM25_BREAKPOINTS
        .iter()
        .copied()
        .find(|(_, high_conc, _, _)| value <= *high_conc)
        .unwrap_or(PM25_BREAKPOINTS[PM25_BREAKPOINTS.len() - 1]);

    Some(low_aqi + (value - low_conc) / (high_conc - low_conc) * (high_aqi - low_aqi))
}

/// A classification label with the color token presentation should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub label: &'static str,
    pub color: &'static str,
}

impl Band {
    const fn new(label: &'static str, color: &'static str) -> Self {
        Band { label, color }
    }
}

pub const NOT_AVAILABLE: Band = Band::new("N/A", "#FFFFFF");

// Each table lists inclusive upper bounds in ascending order. A value sitting
// exactly on a boundary belongs to both neighbours; the first (lower) band wins.
const AQI_BANDS: [(f64, Band); 5] = [
    (50.0, Band::new("GOOD", "#39FF14")),
    (100.0, Band::new("MODERATE", "#FFFF00")),
    (150.0, Band::new("UNHEALTHY", "#FF7E00")),
    (200.0, Band::new("UNHEALTHY", "#FF0000")),
    (300.0, Band::new("VERY UNHEALTHY", "#8F3F97")),
];
const AQI_ABOVE: Band = Band::new("HAZARDOUS", "#7E0023");

const UV_BANDS: [(f64, Band); 4] = [
    (2.0, Band::new("LOW", "#39FF14")),
    (5.0, Band::new("MODERATE", "#FFFF00")),
    (7.0, Band::new("HIGH", "#FF7E00")),
    (10.0, Band::new("VERY HIGH", "#FF0000")),
];
const UV_ABOVE: Band = Band::new("EXTREME", "#8F3F97");

const HUMIDITY_BANDS: [(f64, Band); 4] = [
    (30.0, Band::new("LOW", "#3EC1EC")),
    (50.0, Band::new("NORMAL", "#39FF14")),
    (60.0, Band::new("SLIGHTLY HIGH", "#FFFF00")),
    (70.0, Band::new("HIGH", "#FF7E00")),
];
const HUMIDITY_ABOVE: Band = Band::new("VERY HIGH", "#FF0000");

fn classify(value: Option<f64>, bands: &[(f64, Band)], above: Band) -> Band {
    match value {
        Some(v) if v >= 0.0 => bands
            .iter()
            .find(|(upper, _)| v <= *upper)
            .map(|(_, band)| *band)
            .unwrap_or(above),
        // Missing, negative or NaN
        _ => NOT_AVAILABLE,
    }
}

pub fn aqi_band(aqi: Option<f64>) -> Band {
    classify(aqi, &AQI_BANDS, AQI_ABOVE)
}

pub fn uv_band(uv_index: Option<f64>) -> Band {
    classify(uv_index, &UV_BANDS, UV_ABOVE)
}

pub fn humidity_band(humidity: Option<f64>) -> Band {
    classify(humidity, &HUMIDITY_BANDS, HUMIDITY_ABOVE)
}

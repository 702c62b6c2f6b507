//! Display-ready text for each on-screen field.
//!
//! Formatting and classification are resolved per field from the current
//! snapshot, so anything that paints a screen only needs a `StationHandle`.

use log::{debug, info};
use std::fmt;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::metrics::{aqi_band, humidity_band, uv_band, Band};
use crate::models::{Metric, Snapshot};
use crate::state::{RunFlag, StationHandle};

/// Shown in place of a value the snapshot does not hold
const ABSENT: &str = "--";

const KMH_PER_MS: f64 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayField {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
    WindDirection,
    Rain,
    Uv,
    Aqi,
}

impl DisplayField {
    pub const ALL: [DisplayField; 8] = [
        DisplayField::Temperature,
        DisplayField::Humidity,
        DisplayField::Pressure,
        DisplayField::WindSpeed,
        DisplayField::WindDirection,
        DisplayField::Rain,
        DisplayField::Uv,
        DisplayField::Aqi,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DisplayField::Temperature => "Temperature (°C)",
            DisplayField::Humidity => "Humidity",
            DisplayField::Pressure => "Pressure (hPa)",
            DisplayField::WindSpeed => "Wind (km/h)",
            DisplayField::WindDirection => "Direction",
            DisplayField::Rain => "Rain (mm)",
            DisplayField::Uv => "UV Index",
            DisplayField::Aqi => "AQI",
        }
    }

    /// Numeric value behind the field. AQI is derived on every call.
    pub fn value(self, snapshot: &Snapshot) -> Option<f64> {
        match self {
            DisplayField::Temperature => snapshot.number(Metric::Temperature),
            DisplayField::Humidity => snapshot.number(Metric::Humidity),
            DisplayField::Pressure => snapshot.number(Metric::Pressure),
            DisplayField::WindSpeed => snapshot.number(Metric::WindSpeed),
            DisplayField::WindDirection => snapshot.number(Metric::WindDirDegrees),
            DisplayField::Rain => snapshot.number(Metric::Rainfall),
            DisplayField::Uv => snapshot.number(Metric::UvIndex),
            DisplayField::Aqi => snapshot.aqi(),
        }
    }

    pub fn format(self, value: Option<f64>) -> String {
        let Some(value) = value else {
            return ABSENT.to_string();
        };

        match self {
            DisplayField::Temperature | DisplayField::Pressure | DisplayField::Rain => {
                format!("{:.1}", value)
            }
            DisplayField::Humidity => format!("{:.1}%", value),
            DisplayField::WindSpeed => format!("{:.1}", value * KMH_PER_MS),
            DisplayField::WindDirection => format!("{}°", value.round() as i64),
            DisplayField::Uv => format!("{:.2}", value),
            DisplayField::Aqi => format!("{:.0}", value),
        }
    }

    /// Band for fields that carry one; the rest are unclassified
    pub fn classify(self, value: Option<f64>) -> Option<Band> {
        match self {
            DisplayField::Humidity => Some(humidity_band(value)),
            DisplayField::Uv => Some(uv_band(value)),
            DisplayField::Aqi => Some(aqi_band(value)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedField {
    pub field: DisplayField,
    pub text: String,
    pub band: Option<Band>,
}

impl fmt::Display for RenderedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.label(), self.text)?;
        if let Some(band) = self.band {
            write!(f, " [{} {}]", band.label, band.color)?;
        }
        Ok(())
    }
}

pub fn render(snapshot: &Snapshot) -> Vec<RenderedField> {
    DisplayField::ALL
        .iter()
        .map(|&field| {
            let value = field.value(snapshot);
            let mut text = field.format(value);
            if field == DisplayField::WindDirection && value.is_some() {
                if let Some(point) = snapshot.text(Metric::WindDirCardinal) {
                    text = format!("{} {}", text, point);
                }
            }
            RenderedField {
                field,
                text,
                band: field.classify(value),
            }
        })
        .collect()
}

/// Re-render the current snapshot every `period` until shutdown
pub async fn refresh_loop(handle: StationHandle, running: Arc<RunFlag>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while running.is_running() {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = running.stopped() => break,
        }

        let line = render(&handle.current())
            .iter()
            .map(RenderedField::to_string)
            .collect::<Vec<_>>()
            .join(" | ");
        debug!("{}", line);
    }

    info!("Display refresh stopped");
}

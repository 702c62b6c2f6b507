/// Daily rainfall accumulation from the gauge's cumulative counter
use log::{info, warn};
use time::Date;

use crate::utils::date_stamp;

/// Accumulator state for the day currently being tracked
#[derive(Debug, Clone, PartialEq)]
pub struct RainfallState {
    pub last_raw_value: f64,
    pub daily_total: f64,
    pub reset_day: Date,
}

/// A finished day's rainfall, emitted once at the day boundary
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub date: Date,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RainfallUpdate {
    /// Running total for `today`
    pub total: f64,
    /// Set on the first reading of a new day when a previous day was tracked
    pub completed_day: Option<DailyTotal>,
}

/// Turns the gauge's ever-increasing counter into a per-day total.
///
/// The first reading of each day only establishes the baseline, so a counter
/// that kept running overnight does not show up as a spike. A counter that
/// goes backwards (sensor reset or rollover) is resynchronised without
/// subtracting anything from the day's total.
#[derive(Debug, Default)]
pub struct RainfallAccumulator {
    state: Option<RainfallState>,
}

impl RainfallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw counter reading (mm) taken on `today`
    pub fn update(&mut self, raw: f64, today: Date) -> RainfallUpdate {
        let mut completed_day = None;

        let state = match self.state.take() {
            Some(state) if state.reset_day == today => state,
            previous => {
                if let Some(previous) = previous {
                    info!(
                        "Rainfall reset at midnight. Stored: {:.1} mm for {}",
                        previous.daily_total,
                        date_stamp(previous.reset_day)
                    );
                    completed_day = Some(DailyTotal {
                        date: previous.reset_day,
                        total: previous.daily_total,
                    });
                }
                RainfallState {
                    last_raw_value: raw,
                    daily_total: 0.0,
                    reset_day: today,
                }
            }
        };
        let state = self.state.insert(state);

        let delta = raw - state.last_raw_value;
        if delta >= 0.0 {
            state.daily_total += delta;
        } else {
            warn!(
                "Rain sensor reset or error. Current: {}, Last: {}",
                raw, state.last_raw_value
            );
        }
        state.last_raw_value = raw;

        RainfallUpdate {
            total: state.daily_total,
            completed_day,
        }
    }
}

pub mod tracker;

use serde::{Deserialize, Serialize};

pub use tracker::{DEFAULT_MAX_ACCURACY_M, ProgressTracker};

fn default_provider() -> String {
    "gps".to_string()
}

/// One raw position sample delivered by the location source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Fix {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Time the fix was taken, epoch milliseconds
    pub timestamp_ms: i64,
    /// Horizontal accuracy radius in meters
    #[serde(default)]
    pub accuracy_m: Option<f32>,
    #[serde(default)]
    pub speed_mps: Option<f32>,
    #[serde(default)]
    pub bearing_deg: Option<f32>,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    #[serde(default = "default_provider")]
    pub provider: String,
}

impl Default for Fix {
    fn default() -> Self {
        Self {
            latitude: 0.,
            longitude: 0.,
            timestamp_ms: 0,
            accuracy_m: None,
            speed_mps: None,
            bearing_deg: None,
            altitude_m: None,
            provider: default_provider(),
        }
    }
}

/// Progress of one participant along the route
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    /// Meters travelled along the route, never decreases within a session
    pub distance_m: u64,
    /// Average speed since the race start
    pub average_speed_kmh: f64,
    /// Index of the checkpoint starting the last matched segment
    pub cursor: usize,
    /// Race start in epoch milliseconds
    pub race_start_ms: i64,
}

impl ProgressState {
    pub fn new(race_start_ms: i64) -> Self {
        Self {
            distance_m: 0,
            average_speed_kmh: 0.,
            cursor: 0,
            race_start_ms,
        }
    }
}

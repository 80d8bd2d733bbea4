// Core data structures for race routes

use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::RacewalkError;

/// Fixed textual timestamp format shared by race descriptions and events
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Parse a `yyyy-MM-dd HH:mm:ss ±HHmm` timestamp into epoch milliseconds
pub fn parse_timestamp(value: &str) -> Result<i64, RacewalkError> {
    chrono::DateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|t| t.timestamp_millis())
        .map_err(|e| RacewalkError::InvalidTimestamp {
            value: value.to_string(),
            source: e,
        })
}

/// A known waypoint on the race route
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Checkpoint {
    /// Server assigned identifier, also the route order
    #[serde(rename = "checkid")]
    pub id: u64,
    /// Distance from the start line in meters
    #[serde(rename = "meters")]
    pub cumulative_meters: u64,
    pub latitude: f64,
    pub longitude: f64,
}

impl Checkpoint {
    pub fn new(id: u64, cumulative_meters: u64, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            cumulative_meters,
            latitude,
            longitude,
        }
    }
}

/// Ordered, immutable list of checkpoints for one race
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointTable {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointTable {
    /// Sort the checkpoints by id and validate the route.
    ///
    /// A table needs at least one segment, unique ids and a cumulative distance
    /// that never decreases along the id order.
    pub fn new(checkpoints: Vec<Checkpoint>) -> Result<Self, RacewalkError> {
        let checkpoints: Vec<Checkpoint> = checkpoints
            .into_iter()
            .sorted_by_key(|c| c.id)
            .collect();

        if checkpoints.len() < 2 {
            return Err(RacewalkError::InvalidCheckpointTable {
                reason: format!(
                    "at least 2 checkpoints are required, got {}",
                    checkpoints.len()
                ),
            });
        }

        for (prev, next) in checkpoints.iter().tuple_windows() {
            if prev.id == next.id {
                return Err(RacewalkError::InvalidCheckpointTable {
                    reason: format!("duplicate checkpoint id {}", prev.id),
                });
            }
            if next.cumulative_meters < prev.cumulative_meters {
                return Err(RacewalkError::InvalidCheckpointTable {
                    reason: format!(
                        "checkpoint {} at {}m comes after checkpoint {} at {}m",
                        next.id, next.cumulative_meters, prev.id, prev.cumulative_meters
                    ),
                });
            }
        }

        Ok(Self { checkpoints })
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn get(&self, index: usize) -> Option<&Checkpoint> {
        self.checkpoints.get(index)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Always false for a validated table, kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Length of the whole route in meters
    pub fn total_meters(&self) -> u64 {
        self.checkpoints
            .last()
            .map(|c| c.cumulative_meters)
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RaceDescriptionFile {
    race_id: u64,
    #[serde(default)]
    name: Option<String>,
    start: String,
    checkpoints: Vec<Checkpoint>,
}

/// A downloaded race: identifier, start time and checkpoint table
#[derive(Clone, Debug, PartialEq)]
pub struct RaceDescription {
    pub race_id: u64,
    pub name: Option<String>,
    /// Race start in epoch milliseconds
    pub start_ms: i64,
    pub table: CheckpointTable,
}

impl RaceDescription {
    /// Parse and validate a race description document
    pub fn from_json(content: &str) -> Result<Self, RacewalkError> {
        let file: RaceDescriptionFile = serde_json::from_str(content)
            .map_err(|e| RacewalkError::MalformedRaceData { source: e })?;

        let start_ms = parse_timestamp(&file.start)?;
        let table = CheckpointTable::new(file.checkpoints)?;

        Ok(Self {
            race_id: file.race_id,
            name: file.name,
            start_ms,
            table,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, RacewalkError> {
        let content = std::fs::read_to_string(path).map_err(|e| RacewalkError::RaceDataIO {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content)
    }
}

// Race route management
// Loads race descriptions and provides the checkpoint table used for progress projection

pub mod geo;
pub mod types;

// Re-export commonly used types
pub use geo::haversine_distance;
pub use types::{Checkpoint, CheckpointTable, RaceDescription, TIMESTAMP_FORMAT, parse_timestamp};

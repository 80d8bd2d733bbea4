// Error types for racewalk

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum RacewalkError {
    // Race description errors
    #[snafu(display("Malformed race description"))]
    MalformedRaceData { source: serde_json::Error },
    #[snafu(display("Unable to read race description {path}"))]
    RaceDataIO { path: String, source: io::Error },
    #[snafu(display("Invalid checkpoint table: {reason}"))]
    InvalidCheckpointTable { reason: String },
    #[snafu(display("Invalid timestamp '{value}'"))]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },

    // Upload errors
    #[snafu(display("Error sending event batch to {url}"))]
    Transport {
        url: String,
        source: Box<ureq::Error>,
    },
    #[snafu(display("Server rejected event batch with status {status}"))]
    UploadRejected { status: u16 },
    #[snafu(display("Could not parse server acknowledgement"))]
    MalformedAcknowledgement { source: io::Error },
    #[snafu(display("Error serializing event"))]
    EventSerialization { source: serde_json::Error },

    // Event spool errors
    #[snafu(display("Error accessing event spool {path}"))]
    SpoolIO { path: String, source: io::Error },

    // Location input errors
    #[snafu(display("Error reading location fixes from {path}"))]
    FixInput { path: String, source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error accessing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

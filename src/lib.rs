// Library interface for racewalk
// This allows integration tests to access internal modules

pub mod config;
pub mod errors;
pub mod progress;
pub mod route;
pub mod session;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::RacewalkError;
pub use progress::{Fix, ProgressState, ProgressTracker};
pub use route::{Checkpoint, CheckpointTable, RaceDescription};
pub use session::RaceSession;
pub use telemetry::{Event, EventPayload, EventQueue, EventType, UploadOutcome, Uploader};

pub mod battery;
pub mod event;
pub mod queue;
pub mod transport;
pub mod uploader;

pub use battery::{BatteryReading, BatterySource, BatteryState, FixedBattery, SysfsBattery};
pub use event::{Event, EventFactory, EventPayload, EventType, SequenceCounter};
pub use queue::EventQueue;
pub use transport::{EventTransport, HttpTransport};
pub use uploader::{UploadOutcome, UploadScheduler, UploadWorker, Uploader};

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};

use crate::errors::RacewalkError;
use crate::progress::{Fix, ProgressState};
use crate::route::TIMESTAMP_FORMAT;

use super::battery::{BatteryReading, BatterySource, BatteryState};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    Login,
    StartRace,
    StopRace,
    LocationUpdate,
    Checkpoint,
    UserRefresh,
    Error,
    Warning,
    Log,
}

/// Event data, one shape per event type.
///
/// On the wire the variant name becomes the `type` field and the fields become
/// the `data` mapping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    Login {
        user: String,
    },
    StartRace {
        race_id: u64,
    },
    StopRace {
        race_id: u64,
        distance_m: u64,
    },
    LocationUpdate {
        latitude: f64,
        longitude: f64,
        accuracy_m: Option<f32>,
        speed_mps: Option<f32>,
        bearing_deg: Option<f32>,
        altitude_m: Option<f64>,
        provider: String,
        fix_time_ms: i64,
        distance_m: u64,
        average_speed_kmh: f64,
    },
    Checkpoint {
        checkpoint_id: u64,
        distance_m: u64,
    },
    UserRefresh {},
    Error {
        message: String,
    },
    Warning {
        message: String,
    },
    Log {
        message: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Login { .. } => EventType::Login,
            Self::StartRace { .. } => EventType::StartRace,
            Self::StopRace { .. } => EventType::StopRace,
            Self::LocationUpdate { .. } => EventType::LocationUpdate,
            Self::Checkpoint { .. } => EventType::Checkpoint,
            Self::UserRefresh {} => EventType::UserRefresh,
            Self::Error { .. } => EventType::Error,
            Self::Warning { .. } => EventType::Warning,
            Self::Log { .. } => EventType::Log,
        }
    }

    /// Location report for a fix and the progress computed from it
    pub fn location(fix: &Fix, progress: &ProgressState) -> Self {
        Self::LocationUpdate {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy_m: fix.accuracy_m,
            speed_mps: fix.speed_mps,
            bearing_deg: fix.bearing_deg,
            altitude_m: fix.altitude_m,
            provider: fix.provider.clone(),
            fix_time_ms: fix.timestamp_ms,
            distance_m: progress.distance_m,
            average_speed_kmh: progress.average_speed_kmh,
        }
    }
}

// `batL` is -1 when the battery could not be read
mod battery_level_wire {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(level: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(level.map(i16::from).unwrap_or(-1))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        let level = i16::deserialize(deserializer)?;
        Ok(u8::try_from(level).ok().filter(|l| *l <= 100))
    }
}

/// One telemetry fact with the device context at the time it was recorded
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "eventId")]
    sequence_id: u64,
    #[serde(flatten)]
    payload: EventPayload,
    #[serde(rename = "batL", with = "battery_level_wire")]
    battery_level: Option<u8>,
    #[serde(rename = "batS")]
    battery_state: BatteryState,
    time: String,
}

impl Event {
    pub fn new(
        sequence_id: u64,
        payload: EventPayload,
        battery: BatteryReading,
        time: &DateTime<FixedOffset>,
    ) -> Self {
        Self {
            sequence_id,
            payload,
            battery_level: battery.level_percent,
            battery_state: battery.state,
            time: time.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn battery(&self) -> BatteryReading {
        BatteryReading::new(self.battery_level, self.battery_state)
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    /// Wire record: `eventId`, `type`, `data`, `batL`, `batS`, `time`
    pub fn to_record(&self) -> Result<serde_json::Value, RacewalkError> {
        serde_json::to_value(self).map_err(|e| RacewalkError::EventSerialization { source: e })
    }

    pub fn from_record(record: serde_json::Value) -> Result<Self, RacewalkError> {
        serde_json::from_value(record).map_err(|e| RacewalkError::EventSerialization { source: e })
    }
}

/// Shared source of event sequence ids.
///
/// Ids start at 0 and are never handed out twice by clones of the same counter.
#[derive(Clone, Debug, Default)]
pub struct SequenceCounter {
    next: Arc<AtomicU64>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Id the next call to `next` will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Make sure ids already in use (e.g. restored from a spool) are not reissued
    pub fn advance_past(&self, used: u64) {
        self.next.fetch_max(used.saturating_add(1), Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }
}

/// Builds events stamped with the next sequence id, the battery and local time
pub struct EventFactory {
    counter: SequenceCounter,
    battery: Box<dyn BatterySource>,
}

impl EventFactory {
    pub fn new(counter: SequenceCounter, battery: impl BatterySource + 'static) -> Self {
        Self {
            counter,
            battery: Box::new(battery),
        }
    }

    pub fn create(&self, payload: EventPayload) -> Event {
        Event::new(
            self.counter.next(),
            payload,
            self.battery.read(),
            &Local::now().fixed_offset(),
        )
    }

    pub fn counter(&self) -> &SequenceCounter {
        &self.counter
    }
}

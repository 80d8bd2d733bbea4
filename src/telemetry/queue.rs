use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::errors::RacewalkError;

use super::event::Event;

/// Events waiting for a server acknowledgement.
///
/// Producers append from any thread; the lock is only held for in-memory work
/// so appending never waits on the network. The queue is unbounded: events are
/// produced at human pace (one per location fix), so no eviction is applied.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<Vec<Event>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: Event) {
        self.events.lock().push(event);
    }

    /// Drop the first queued event for each acknowledged id.
    ///
    /// Unknown ids are ignored, so acknowledging the same ids twice is harmless.
    /// Returns the number of events removed.
    pub fn remove_acknowledged(&self, ids: &[u64]) -> usize {
        let mut events = self.events.lock();
        let mut removed = 0;
        for id in ids {
            if let Some(position) = events.iter().position(|e| e.sequence_id() == *id) {
                events.remove(position);
                removed += 1;
            }
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Point-in-time copy of the queued events, in insertion order
    pub fn serialize_all(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn max_sequence_id(&self) -> Option<u64> {
        self.events.lock().iter().map(Event::sequence_id).max()
    }

    /// Write the queued events to a JSON lines spool file
    pub fn persist(&self, path: &Path) -> Result<(), RacewalkError> {
        let snapshot = self.serialize_all();
        let spool_error = |e| RacewalkError::SpoolIO {
            path: path.display().to_string(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(spool_error)?;
        }
        // write next to the spool and swap so a crash never leaves half a file
        let staging = path.with_extension("staging");
        serde_jsonlines::write_json_lines(&staging, &snapshot).map_err(spool_error)?;
        fs::rename(&staging, path).map_err(spool_error)?;

        debug!("Persisted {} events to {:?}", snapshot.len(), path);
        Ok(())
    }

    /// Load a queue from a spool file; a missing file is an empty queue
    pub fn restore(path: &Path) -> Result<Self, RacewalkError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let spool_error = |e| RacewalkError::SpoolIO {
            path: path.display().to_string(),
            source: e,
        };
        let events = serde_jsonlines::json_lines::<Event, _>(path)
            .map_err(spool_error)?
            .collect::<Result<Vec<Event>, _>>()
            .map_err(spool_error)?;

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(events.len());
        for event in events {
            if seen.insert(event.sequence_id()) {
                unique.push(event);
            } else {
                warn!(
                    "Skipping duplicate event {} in spool {:?}",
                    event.sequence_id(),
                    path
                );
            }
        }

        debug!("Restored {} events from {:?}", unique.len(), path);
        Ok(Self {
            events: Mutex::new(unique),
        })
    }
}

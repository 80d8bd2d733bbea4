use itertools::Itertools;
use log::{debug, trace};

use crate::route::{Checkpoint, CheckpointTable, haversine_distance};

use super::{Fix, ProgressState};

/// Fixes with a worse horizontal accuracy than this are ignored
pub const DEFAULT_MAX_ACCURACY_M: f32 = 200.0;

const MPS_TO_KMH: f64 = 3.6;

/// Projects raw fixes onto the race route.
///
/// The route is only known at its checkpoints, so a fix is placed on the first
/// segment (from the current cursor forward) whose endpoints are both farther
/// apart than the fix is from either of them, and the distance is linearly
/// interpolated between the two checkpoints. Progress only ever moves forward:
/// a projection that does not beat the current distance is dropped.
pub struct ProgressTracker {
    table: CheckpointTable,
    state: ProgressState,
    max_accuracy_m: f32,
}

impl ProgressTracker {
    pub fn new(table: CheckpointTable, race_start_ms: i64) -> Self {
        Self {
            table,
            state: ProgressState::new(race_start_ms),
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
        }
    }

    pub fn with_max_accuracy(mut self, max_accuracy_m: f32) -> Self {
        self.max_accuracy_m = max_accuracy_m;
        self
    }

    /// Feed a new fix and return the resulting state.
    ///
    /// Inaccurate fixes, fixes that do not fall on any segment ahead of the
    /// cursor, and fixes that would move the participant backwards all leave
    /// the distance untouched.
    pub fn update(&mut self, fix: &Fix) -> ProgressState {
        match fix.accuracy_m {
            Some(accuracy) if accuracy <= self.max_accuracy_m => {}
            _ => {
                trace!(
                    "Ignoring fix with accuracy {:?}, limit is {}m",
                    fix.accuracy_m, self.max_accuracy_m
                );
                return self.state;
            }
        }

        let Some((index, candidate_m)) = self.project(fix) else {
            trace!(
                "Fix ({}, {}) is not on any segment after checkpoint index {}",
                fix.latitude, fix.longitude, self.state.cursor
            );
            return self.state;
        };

        self.state.cursor = index;
        if candidate_m <= self.state.distance_m {
            trace!(
                "Ignoring regressive projection {}m, current distance {}m",
                candidate_m, self.state.distance_m
            );
            return self.state;
        }

        self.state.distance_m = candidate_m;
        // a difference that does not fit in i64 keeps the previous speed
        let elapsed_s = fix
            .timestamp_ms
            .checked_sub(self.state.race_start_ms)
            .map(|elapsed_ms| elapsed_ms as f64 / 1000.)
            .filter(|elapsed_s| *elapsed_s > 0.);
        if let Some(elapsed_s) = elapsed_s {
            self.state.average_speed_kmh = candidate_m as f64 / elapsed_s * MPS_TO_KMH;
        }

        debug!(
            "Progress {}m at {:.2}km/h, segment starting at checkpoint index {}",
            self.state.distance_m, self.state.average_speed_kmh, self.state.cursor
        );
        self.state
    }

    /// Find the first segment from the cursor forward that contains the fix and
    /// return its start index with the interpolated route distance.
    fn project(&self, fix: &Fix) -> Option<(usize, u64)> {
        self.table
            .checkpoints()
            .iter()
            .enumerate()
            .skip(self.state.cursor)
            .tuple_windows()
            .find_map(|((index, last), (_, next))| {
                interpolate(last, next, fix).map(|distance_m| (index, distance_m))
            })
    }

    /// Start a new session on the same route
    pub fn reset(&mut self, race_start_ms: i64) {
        self.state = ProgressState::new(race_start_ms);
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn distance_m(&self) -> u64 {
        self.state.distance_m
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.state.average_speed_kmh
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn table(&self) -> &CheckpointTable {
        &self.table
    }
}

fn interpolate(last: &Checkpoint, next: &Checkpoint, fix: &Fix) -> Option<u64> {
    let dist_last = haversine_distance(last.latitude, last.longitude, fix.latitude, fix.longitude);
    let dist_next = haversine_distance(fix.latitude, fix.longitude, next.latitude, next.longitude);
    let dist_segment =
        haversine_distance(last.latitude, last.longitude, next.latitude, next.longitude);

    if !(dist_last < dist_segment && dist_next < dist_segment) {
        return None;
    }

    let fraction = dist_last / (dist_last + dist_next);
    let span_m = (next.cumulative_meters - last.cumulative_meters) as f64;
    Some(last.cumulative_meters + (fraction * span_m).round() as u64)
}

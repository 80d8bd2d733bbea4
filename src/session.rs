use std::sync::Arc;

use log::{debug, info};

use crate::progress::{Fix, ProgressState, ProgressTracker};
use crate::route::RaceDescription;
use crate::telemetry::{EventFactory, EventPayload, EventQueue, UploadScheduler};

/// One participant's active race.
///
/// Routes fixes into the progress tracker, turns everything worth reporting
/// into events and asks the scheduler to push them to the server.
pub struct RaceSession<S: UploadScheduler> {
    race_id: u64,
    tracker: ProgressTracker,
    factory: EventFactory,
    queue: Arc<EventQueue>,
    scheduler: S,
}

impl<S: UploadScheduler> RaceSession<S> {
    pub fn new(
        race: RaceDescription,
        factory: EventFactory,
        queue: Arc<EventQueue>,
        scheduler: S,
    ) -> Self {
        Self {
            race_id: race.race_id,
            tracker: ProgressTracker::new(race.table, race.start_ms),
            factory,
            queue,
            scheduler,
        }
    }

    pub fn with_max_accuracy(mut self, max_accuracy_m: f32) -> Self {
        self.tracker = self.tracker.with_max_accuracy(max_accuracy_m);
        self
    }

    /// Queue an event without asking for an upload; returns its sequence id
    pub fn report(&self, payload: EventPayload) -> u64 {
        let event = self.factory.create(payload);
        let sequence_id = event.sequence_id();
        debug!("Queued {:?} event {}", event.event_type(), sequence_id);
        self.queue.append(event);
        sequence_id
    }

    pub fn login(&self, user: &str) {
        self.report(EventPayload::Login {
            user: user.to_string(),
        });
        self.scheduler.request_upload();
    }

    pub fn start(&self) {
        info!("Starting race {}", self.race_id);
        self.report(EventPayload::StartRace {
            race_id: self.race_id,
        });
        self.scheduler.request_upload();
    }

    pub fn stop(&self) {
        info!(
            "Stopping race {} at {}m",
            self.race_id,
            self.tracker.distance_m()
        );
        self.report(EventPayload::StopRace {
            race_id: self.race_id,
            distance_m: self.tracker.distance_m(),
        });
        self.scheduler.request_upload();
    }

    pub fn refresh(&self) {
        self.report(EventPayload::UserRefresh {});
        self.scheduler.request_upload();
    }

    /// Feed a fix from the location source.
    ///
    /// Every fix is reported as a location update carrying the resulting
    /// progress; each checkpoint the cursor moved past is reported too. The
    /// cursor stops at the start of the last segment, so the finish itself is
    /// only reported by [`RaceSession::stop`].
    pub fn handle_fix(&mut self, fix: &Fix) -> ProgressState {
        let previous = self.tracker.state();
        let state = self.tracker.update(fix);

        self.report(EventPayload::location(fix, &state));
        for index in previous.cursor + 1..=state.cursor {
            if let Some(checkpoint) = self.tracker.table().get(index) {
                info!(
                    "Passed checkpoint {} at {}m",
                    checkpoint.id, checkpoint.cumulative_meters
                );
                self.report(EventPayload::Checkpoint {
                    checkpoint_id: checkpoint.id,
                    distance_m: checkpoint.cumulative_meters,
                });
            }
        }

        self.scheduler.request_upload();
        state
    }

    pub fn race_id(&self) -> u64 {
        self.race_id
    }

    pub fn state(&self) -> ProgressState {
        self.tracker.state()
    }

    pub fn distance_m(&self) -> u64 {
        self.tracker.distance_m()
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.tracker.average_speed_kmh()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.size()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> S {
        self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::geo::EARTH_RADIUS_M;
    use crate::route::{Checkpoint, CheckpointTable};
    use crate::telemetry::{
        BatteryReading, BatteryState, EventType, FixedBattery, SequenceCounter,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingScheduler {
        requests: AtomicUsize,
    }

    impl UploadScheduler for CountingScheduler {
        fn request_upload(&self) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn lat_at(meters: f64) -> f64 {
        45.0 + (meters / EARTH_RADIUS_M).to_degrees()
    }

    fn race() -> RaceDescription {
        RaceDescription {
            race_id: 8,
            name: None,
            start_ms: 0,
            table: CheckpointTable::new(vec![
                Checkpoint::new(1, 0, lat_at(0.), 9.0),
                Checkpoint::new(2, 1000, lat_at(1000.), 9.0),
                Checkpoint::new(3, 2000, lat_at(2000.), 9.0),
                Checkpoint::new(4, 3000, lat_at(3000.), 9.0),
            ])
            .unwrap(),
        }
    }

    fn session() -> (RaceSession<CountingScheduler>, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::new());
        let factory = EventFactory::new(
            SequenceCounter::new(),
            FixedBattery::new(BatteryReading::new(Some(75), BatteryState::NotCharging)),
        );
        let session = RaceSession::new(
            race(),
            factory,
            Arc::clone(&queue),
            CountingScheduler::default(),
        );
        (session, queue)
    }

    fn fix_at(meters: f64, timestamp_ms: i64) -> Fix {
        Fix {
            latitude: lat_at(meters),
            longitude: 9.0,
            timestamp_ms,
            accuracy_m: Some(8.),
            ..Fix::default()
        }
    }

    fn queued_types(queue: &EventQueue) -> Vec<EventType> {
        queue
            .serialize_all()
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    #[test]
    fn test_fix_produces_location_update_and_upload_request() {
        let (mut session, queue) = session();

        let state = session.handle_fix(&fix_at(400., 300_000));

        assert_eq!(state.distance_m, 400);
        assert_eq!(queued_types(&queue), vec![EventType::LocationUpdate]);
        assert_eq!(session.scheduler().requests.load(Ordering::SeqCst), 1);
        match queue.serialize_all()[0].payload() {
            EventPayload::LocationUpdate { distance_m, .. } => assert_eq!(*distance_m, 400),
            other => panic!("Expected LocationUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_rejected_fix_still_reported() {
        let (mut session, queue) = session();
        let fix = Fix {
            accuracy_m: None,
            ..fix_at(400., 300_000)
        };

        let state = session.handle_fix(&fix);

        assert_eq!(state.distance_m, 0);
        assert_eq!(session.pending_events(), 1);
        assert_eq!(queued_types(&queue), vec![EventType::LocationUpdate]);
    }

    #[test]
    fn test_passed_checkpoints_reported() {
        let (mut session, queue) = session();
        session.handle_fix(&fix_at(400., 300_000));

        // jumps over checkpoints 2 and 3
        session.handle_fix(&fix_at(2500., 1_800_000));

        let events = queue.serialize_all();
        let checkpoints: Vec<u64> = events
            .iter()
            .filter_map(|e| match e.payload() {
                EventPayload::Checkpoint { checkpoint_id, .. } => Some(*checkpoint_id),
                _ => None,
            })
            .collect();
        assert_eq!(checkpoints, vec![2, 3]);
        assert_eq!(session.distance_m(), 2500);
        assert!((session.average_speed_kmh() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_lifecycle_events() {
        let (session, queue) = session();

        session.login("walker");
        session.start();
        session.refresh();
        session.stop();

        assert_eq!(
            queued_types(&queue),
            vec![
                EventType::Login,
                EventType::StartRace,
                EventType::UserRefresh,
                EventType::StopRace
            ]
        );
        let ids: Vec<u64> = queue.serialize_all().iter().map(|e| e.sequence_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(session.into_scheduler().requests.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_report_does_not_request_upload() {
        let (session, queue) = session();

        let id = session.report(EventPayload::Warning {
            message: "low signal".to_string(),
        });

        assert_eq!(id, 0);
        assert_eq!(queue.size(), 1);
        assert_eq!(session.scheduler().requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_finish_reported_through_stop_race() {
        let (mut session, queue) = session();
        session.handle_fix(&fix_at(1500., 900_000));
        session.handle_fix(&fix_at(2999., 1_800_000));
        // past the finish no segment matches
        session.handle_fix(&fix_at(3050., 1_900_000));

        session.stop();

        let events = queue.serialize_all();
        let checkpoints: Vec<u64> = events
            .iter()
            .filter_map(|e| match e.payload() {
                EventPayload::Checkpoint { checkpoint_id, .. } => Some(*checkpoint_id),
                _ => None,
            })
            .collect();
        assert_eq!(checkpoints, vec![2, 3]);
        assert_eq!(session.state().cursor, 2);
        assert_eq!(
            events.last().unwrap().payload(),
            &EventPayload::StopRace {
                race_id: 8,
                distance_m: 2999
            }
        );
    }

    #[test]
    fn test_stop_reports_distance() {
        let (mut session, queue) = session();
        session.handle_fix(&fix_at(1500., 900_000));

        session.stop();

        let events = queue.serialize_all();
        assert_eq!(
            events.last().unwrap().payload(),
            &EventPayload::StopRace {
                race_id: 8,
                distance_m: 1500
            }
        );
    }
}

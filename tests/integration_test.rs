// Integration tests replaying the sample race through a full session
//
// 1. Load the race description and recorded fixes from samples/
// 2. Feed every fix through a RaceSession
// 3. Upload through a scripted server
// 4. Verify progress and that every event reached the server

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use racewalk::telemetry::{
    BatteryReading, BatteryState, Event, EventFactory, EventPayload, EventQueue, EventTransport,
    EventType, FixedBattery, SequenceCounter, UploadOutcome, UploadScheduler, Uploader,
};
use racewalk::{Fix, RaceDescription, RaceSession, RacewalkError};

const RACE_FILE: &str = "samples/race.json";
const FIXES_FILE: &str = "samples/fixes.jsonl";

/// Accepts everything except on the scripted failing calls
#[derive(Clone, Default)]
struct RecordingServer {
    failures: Arc<Mutex<VecDeque<bool>>>,
    received: Arc<Mutex<Vec<Vec<u64>>>>,
}

impl RecordingServer {
    fn failing_on(pattern: Vec<bool>) -> Self {
        Self {
            failures: Arc::new(Mutex::new(pattern.into())),
            received: Arc::default(),
        }
    }

    fn delivered_ids(&self) -> Vec<u64> {
        self.received.lock().iter().flatten().copied().collect()
    }
}

impl EventTransport for RecordingServer {
    fn post_batch(&self, batch: &[Event]) -> Result<Vec<u64>, RacewalkError> {
        if self.failures.lock().pop_front().unwrap_or(false) {
            return Err(RacewalkError::UploadRejected { status: 502 });
        }
        let ids: Vec<u64> = batch.iter().map(Event::sequence_id).collect();
        self.received.lock().push(ids.clone());
        Ok(ids)
    }
}

fn load_fixes() -> Vec<Fix> {
    serde_jsonlines::json_lines::<Fix, _>(FIXES_FILE)
        .expect("Failed to open sample fixes")
        .collect::<Result<Vec<Fix>, _>>()
        .expect("Failed to parse sample fixes")
}

fn sample_session(
    server: RecordingServer,
) -> (RaceSession<Arc<Uploader>>, Arc<EventQueue>, Arc<Uploader>) {
    let race = RaceDescription::from_file(std::path::Path::new(RACE_FILE))
        .expect("Failed to load sample race");
    let queue = Arc::new(EventQueue::new());
    let uploader = Arc::new(Uploader::new(Arc::clone(&queue), server));
    let factory = EventFactory::new(
        SequenceCounter::new(),
        FixedBattery::new(BatteryReading::new(Some(55), BatteryState::NotCharging)),
    );
    let session = RaceSession::new(race, factory, Arc::clone(&queue), Arc::clone(&uploader));
    (session, queue, uploader)
}

fn walk<S: UploadScheduler>(session: &mut RaceSession<S>) {
    session.start();
    for fix in load_fixes() {
        session.handle_fix(&fix);
    }
    session.stop();
}

#[test]
fn test_sample_race_progress() {
    let (mut session, _queue, _uploader) = sample_session(RecordingServer::default());

    let mut distances = Vec::new();
    for fix in load_fixes() {
        distances.push(session.handle_fix(&fix).distance_m);
    }

    // inaccurate, regressive and off-route fixes keep the previous distance
    assert_eq!(
        distances,
        vec![500, 980, 980, 1900, 1900, 1900, 3100, 3900]
    );
    // 3900m in 40 minutes
    assert!((session.average_speed_kmh() - 5.85).abs() < 1e-6);
    assert_eq!(session.state().cursor, 3);
}

#[test]
fn test_sample_race_delivers_every_event() {
    let server = RecordingServer::default();
    let (mut session, queue, _uploader) = sample_session(server.clone());

    walk(&mut session);

    assert!(queue.is_empty());
    assert_eq!(session.pending_events(), 0);
    // start, 8 location updates, 3 checkpoints, stop
    let delivered = server.delivered_ids();
    assert_eq!(delivered, (0..13).collect::<Vec<u64>>());
}

#[test]
fn test_sample_race_checkpoint_events() {
    let (mut session, queue, _uploader) =
        sample_session(RecordingServer::failing_on(vec![true; 64]));

    walk(&mut session);

    let checkpoints: Vec<u64> = queue
        .serialize_all()
        .iter()
        .filter_map(|e| match e.payload() {
            EventPayload::Checkpoint { checkpoint_id, .. } => Some(*checkpoint_id),
            _ => None,
        })
        .collect();
    assert_eq!(checkpoints, vec![2, 3, 4]);
}

#[test]
fn test_unreachable_server_keeps_everything_queued() {
    let (mut session, queue, _uploader) =
        sample_session(RecordingServer::failing_on(vec![true; 64]));

    walk(&mut session);

    assert_eq!(queue.size(), 13);
    let types: Vec<EventType> = queue.serialize_all().iter().map(Event::event_type).collect();
    assert_eq!(types.first(), Some(&EventType::StartRace));
    assert_eq!(types.last(), Some(&EventType::StopRace));
}

#[test]
fn test_flaky_server_delivers_at_least_once() {
    let pattern = (0..64).map(|i| i % 2 == 0).collect();
    let server = RecordingServer::failing_on(pattern);
    let (mut session, queue, uploader) = sample_session(server.clone());

    walk(&mut session);
    for _ in 0..10 {
        if queue.is_empty() {
            break;
        }
        let _ = uploader.upload();
    }

    assert!(queue.is_empty());
    let delivered: BTreeSet<u64> = server.delivered_ids().into_iter().collect();
    assert_eq!(delivered, (0..13).collect::<BTreeSet<u64>>());
}

#[test]
fn test_recovery_after_outage() {
    // the first five attempts fail, then the server comes back
    let mut pattern = vec![true; 5];
    pattern.extend(vec![false; 64]);
    let server = RecordingServer::failing_on(pattern);
    let (mut session, queue, uploader) = sample_session(server.clone());

    walk(&mut session);

    assert!(queue.is_empty());
    assert_eq!(uploader.upload().unwrap(), UploadOutcome::Idle);
    // the sixth request carried everything queued during the outage
    assert_eq!(server.received.lock()[0], (0..7).collect::<Vec<u64>>());
}

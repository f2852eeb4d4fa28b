//! Fast-travel scenarios
//!
//! Drives the travel controller against a shared map state with tokio's
//! paused clock, so journey timing is exact:
//! - instant hops, timed journeys and the duration cap
//! - cancellation mid-journey
//! - mutual exclusion between concurrent requests
//! - monotonic progress reporting
//! - arrival when the destination message has left the log

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;
use wayfarer_core::state::{lock_state, SharedMapState};
use wayfarer_core::{
    InMemoryLog, MapState, MessageLog, TravelController, TravelError, TravelStart, TravelWarning,
    WayfarerConfig, WaypointId,
};

const NAMES: &[&str] = &[
    "Ashford", "Brightport", "Cinderfall", "Dunmoor", "Elmstead", "Foxhaven", "Greywood",
    "Hollowdale", "Ironcrest", "Jadeport",
];

/// Build a map with one waypoint per position, standing at message 0.
///
/// Every waypoint within range of message 0 is revealed, as is each
/// position listed in `known`; the rest stay hidden.
fn world(positions: &[i64], known: &[i64]) -> (SharedMapState, Vec<WaypointId>) {
    let mut map = MapState::new(&WayfarerConfig::default());
    map.set_fog_enabled(false);
    for (name, position) in NAMES.iter().zip(positions) {
        map.ingest_message(*position, &format!("Word came from {name}."));
    }
    map.set_fog_enabled(true);
    map.arrive(0);

    let ids: Vec<WaypointId> = NAMES
        .iter()
        .take(positions.len())
        .map(|name| map.store().find_by_name(name).unwrap().id())
        .collect();
    for (id, position) in ids.iter().zip(positions) {
        if known.contains(position) {
            map.reveal(*id);
        }
    }
    (map.into_shared(), ids)
}

fn chat_log(len: usize) -> Arc<InMemoryLog> {
    Arc::new(InMemoryLog::from_messages(
        (0..len).map(|i| format!("message {i}")),
    ))
}

fn controller() -> TravelController {
    TravelController::new(WayfarerConfig::default().travel, (320.0, 400.0))
}

fn position(state: &SharedMapState) -> i64 {
    lock_state(state).current_position()
}

fn discovered_positions(state: &SharedMapState) -> Vec<i64> {
    let map = lock_state(state);
    let mut positions: Vec<i64> = map
        .discovery()
        .discovered_ids()
        .iter()
        .map(|id| map.store().get(*id).unwrap().position_index())
        .collect();
    positions.sort();
    positions
}

#[tokio::test(start_paused = true)]
async fn short_hop_arrives_instantly() {
    let (state, ids) = world(&[2], &[]);
    let log: Arc<dyn MessageLog> = chat_log(20);

    let start = controller().request_travel(&state, log, ids[0]).unwrap();
    let TravelStart::Arrived(arrival) = start else {
        panic!("expected an instant arrival");
    };
    assert_eq!(arrival.position_index, 2);
    assert_eq!(arrival.warning, None);
    assert_eq!(position(&state), 2);
}

#[tokio::test(start_paused = true)]
async fn timed_journey_reveals_around_destination() {
    let (state, ids) = world(&[4, 5, 10, 15, 16], &[10]);
    let log: Arc<dyn MessageLog> = chat_log(20);
    assert_eq!(discovered_positions(&state), vec![4, 5, 10]);

    let travel = controller();
    let journey = travel
        .request_travel(&state, log, ids[2])
        .unwrap()
        .into_journey()
        .unwrap();
    assert_eq!(journey.duration(), Duration::from_millis(1000));

    let started = Instant::now();
    let arrival = journey.finish().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(position(&state), 10);
    assert_eq!(discovered_positions(&state), vec![4, 5, 10, 15]);
    assert_eq!(arrival.revealed, vec![ids[3]]);
    assert!(travel.phase().is_idle());
}

#[tokio::test(start_paused = true)]
async fn long_journey_is_capped() {
    let (state, ids) = world(&[100], &[100]);
    let log: Arc<dyn MessageLog> = chat_log(120);

    let journey = controller()
        .request_travel(&state, log, ids[0])
        .unwrap()
        .into_journey()
        .unwrap();
    assert_eq!(journey.duration(), Duration::from_millis(8000));
    journey.finish().await.unwrap();
    assert_eq!(position(&state), 100);
}

#[tokio::test(start_paused = true)]
async fn cancelled_journey_leaves_position() {
    let (state, ids) = world(&[10, 14], &[10]);
    let log: Arc<dyn MessageLog> = chat_log(20);
    let before = discovered_positions(&state);

    let travel = controller();
    let journey = travel
        .request_travel(&state, log, ids[0])
        .unwrap()
        .into_journey()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(journey.progress().fraction > 0.0);
    assert!(journey.cancel());
    assert!(travel.phase().is_idle());

    assert_eq!(journey.finish().await, Err(TravelError::Cancelled));
    assert_eq!(position(&state), 0);
    assert_eq!(discovered_positions(&state), before);
}

#[tokio::test(start_paused = true)]
async fn second_request_is_busy() {
    let (state, ids) = world(&[10, 20], &[10, 20]);
    let log: Arc<dyn MessageLog> = chat_log(30);
    let travel = controller();

    let first = travel
        .request_travel(&state, Arc::clone(&log), ids[0])
        .unwrap();
    let second = travel.request_travel(&state, Arc::clone(&log), ids[1]);
    assert!(matches!(second, Err(TravelError::Busy)));
    assert_eq!(position(&state), 0);

    first.finish().await.unwrap();
    assert_eq!(position(&state), 10);

    // Idle again, so a new request is accepted.
    travel
        .request_travel(&state, log, ids[1])
        .unwrap()
        .finish()
        .await
        .unwrap();
    assert_eq!(position(&state), 20);
}

#[tokio::test(start_paused = true)]
async fn undiscovered_target_is_unreachable() {
    let (state, ids) = world(&[40], &[]);
    let log: Arc<dyn MessageLog> = chat_log(50);

    let err = controller().request_travel(&state, log, ids[0]).unwrap_err();
    assert!(matches!(err, TravelError::Unreachable { ref name } if name == "Ashford"));
    assert_eq!(position(&state), 0);
}

#[tokio::test(start_paused = true)]
async fn progress_is_monotonic_and_completes_at_deadline() {
    let (state, ids) = world(&[30], &[30]);
    let log: Arc<dyn MessageLog> = chat_log(40);

    let journey = controller()
        .request_travel(&state, log, ids[0])
        .unwrap()
        .into_journey()
        .unwrap();
    let duration = journey.duration();
    let mut progress = journey.subscribe();
    let started = Instant::now();

    let mut fractions = vec![progress.borrow().fraction];
    while progress.changed().await.is_ok() {
        let report = *progress.borrow_and_update();
        if report.is_complete() {
            assert!(started.elapsed() >= duration);
        }
        fractions.push(report.fraction);
        if report.is_complete() {
            break;
        }
    }

    assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "{fractions:?}");
    assert_eq!(fractions.last().copied(), Some(1.0));
    assert!(fractions[..fractions.len() - 1].iter().all(|f| *f < 1.0));
    journey.finish().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn truncated_log_still_arrives_with_warning() {
    let (state, ids) = world(&[12], &[12]);
    let log = chat_log(20);
    let dyn_log: Arc<dyn MessageLog> = Arc::clone(&log) as Arc<dyn MessageLog>;

    let journey = controller()
        .request_travel(&state, dyn_log, ids[0])
        .unwrap()
        .into_journey()
        .unwrap();
    log.truncate(5);

    let arrival = journey.finish().await.unwrap();
    assert_eq!(position(&state), 12);
    assert_eq!(
        arrival.warning,
        Some(TravelWarning::DestinationUnresolvable {
            name: "Ashford".to_string(),
            position: 12,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn user_pan_during_journey_is_kept() {
    let (state, ids) = world(&[25], &[25]);
    let log: Arc<dyn MessageLog> = chat_log(30);

    let journey = controller()
        .request_travel(&state, log, ids[0])
        .unwrap()
        .into_journey()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let held = {
        let mut map = lock_state(&state);
        map.viewport_mut().pan_by(400.0, 0.0);
        map.viewport().pan()
    };

    journey.finish().await.unwrap();
    assert_eq!(lock_state(&state).viewport().pan(), held);
    assert_eq!(position(&state), 25);
}

#[tokio::test(start_paused = true)]
async fn journey_camera_centres_destination() {
    let (state, ids) = world(&[25], &[25]);
    let log: Arc<dyn MessageLog> = chat_log(30);
    let target = lock_state(&state).store().get(ids[0]).unwrap().coordinates();

    controller()
        .request_travel(&state, log, ids[0])
        .unwrap()
        .finish()
        .await
        .unwrap();

    let map = lock_state(&state);
    let centre = map.viewport().world_to_screen(target);
    assert!((centre.x - 160.0).abs() < 1e-9);
    assert!((centre.y - 200.0).abs() < 1e-9);
}

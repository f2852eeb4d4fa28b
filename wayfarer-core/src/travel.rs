//! Fast travel
//!
//! `Idle -> Traveling -> Idle`. At most one journey is in flight per
//! controller; requests made meanwhile are rejected with
//! [`TravelError::Busy`] and change nothing.
//!
//! Short hops (distance at or below the instant threshold) arrive
//! synchronously. Longer ones run as a spawned task that ticks progress over
//! a `watch` channel and arrives at the deadline unless cancelled first.
//!
//! # Locking
//! `active` is always taken before the map state, never after. The journey
//! task only holds the map state briefly per tick, so panning, zooming and
//! message ingestion proceed while travelling.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::TravelConfig;
use crate::error::{TravelError, TravelWarning};
use crate::host::MessageLog;
use crate::state::{lock_state, SharedMapState};
use crate::types::{Category, PositionIndex, Waypoint, WaypointId};
use crate::viewport::JourneyCamera;

/// Largest fraction reported before the deadline.
const BELOW_ONE: f64 = 1.0 - f64::EPSILON;

// =============================================================================
// PROGRESS
// =============================================================================

/// Narrative stage of a journey, derived from progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelStage {
    Departing,
    Traversing(Category),
    Arriving,
}

impl TravelStage {
    pub fn at(fraction: f64, terrain: Category) -> Self {
        if fraction < 0.3 {
            TravelStage::Departing
        } else if fraction < 0.7 {
            TravelStage::Traversing(terrain)
        } else {
            TravelStage::Arriving
        }
    }
}

impl fmt::Display for TravelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TravelStage::Departing => f.write_str("Departing"),
            TravelStage::Traversing(terrain) => write!(f, "Traversing {terrain}"),
            TravelStage::Arriving => f.write_str("Arriving"),
        }
    }
}

/// One progress report. `fraction` never decreases across reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelProgress {
    pub fraction: f64,
    pub stage: TravelStage,
    pub elapsed: Duration,
}

impl TravelProgress {
    fn start(terrain: Category) -> Self {
        Self {
            fraction: 0.0,
            stage: TravelStage::at(0.0, terrain),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// A completed arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub target: WaypointId,
    pub name: String,
    pub position_index: PositionIndex,
    /// Waypoints revealed by the arrival sweep
    pub revealed: Vec<WaypointId>,
    pub warning: Option<TravelWarning>,
}

/// What an accepted travel request started.
#[derive(Debug)]
pub enum TravelStart {
    /// Short hop, already applied.
    Arrived(Arrival),
    /// Timed journey now in flight.
    Journey(Journey),
}

impl TravelStart {
    pub fn into_journey(self) -> Option<Journey> {
        match self {
            TravelStart::Journey(journey) => Some(journey),
            TravelStart::Arrived(_) => None,
        }
    }

    /// Wait for the arrival regardless of how travel started.
    pub async fn finish(self) -> Result<Arrival, TravelError> {
        match self {
            TravelStart::Arrived(arrival) => Ok(arrival),
            TravelStart::Journey(journey) => journey.finish().await,
        }
    }
}

/// Controller phase as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelPhase {
    Idle,
    Traveling {
        target: WaypointId,
        duration: Duration,
    },
}

impl TravelPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, TravelPhase::Idle)
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

struct ActiveJourney {
    token: u64,
    target: WaypointId,
    duration: Duration,
    cancel: watch::Sender<bool>,
}

type ActiveSlot = Arc<Mutex<Option<ActiveJourney>>>;

fn lock_active(active: &ActiveSlot) -> MutexGuard<'_, Option<ActiveJourney>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Called with every successful arrival, instant or timed.
pub type ArrivalHook = Arc<dyn Fn(&Arrival) + Send + Sync>;

pub struct TravelController {
    config: TravelConfig,
    canvas: (f64, f64),
    active: ActiveSlot,
    next_token: AtomicU64,
    on_arrival: Option<ArrivalHook>,
}

impl fmt::Debug for TravelController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TravelController")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl TravelController {
    /// `canvas` is the map size used to centre the journey camera.
    pub fn new(config: TravelConfig, canvas: (f64, f64)) -> Self {
        Self {
            config,
            canvas,
            active: Arc::new(Mutex::new(None)),
            next_token: AtomicU64::new(1),
            on_arrival: None,
        }
    }

    pub fn with_arrival_hook(mut self, hook: ArrivalHook) -> Self {
        self.on_arrival = Some(hook);
        self
    }

    pub fn config(&self) -> &TravelConfig {
        &self.config
    }

    pub fn phase(&self) -> TravelPhase {
        match lock_active(&self.active).as_ref() {
            Some(active) => TravelPhase::Traveling {
                target: active.target,
                duration: active.duration,
            },
            None => TravelPhase::Idle,
        }
    }

    /// Cancel the in-flight journey, if any. The position is left untouched.
    pub fn cancel(&self) -> bool {
        cancel_active(&self.active, None)
    }

    /// Request travel to `target`.
    ///
    /// Rejections leave every piece of state as it was. Timed journeys need
    /// a tokio runtime; without one they are rejected with
    /// [`TravelError::NoRuntime`].
    pub fn request_travel(
        &self,
        state: &SharedMapState,
        log: Arc<dyn MessageLog>,
        target: WaypointId,
    ) -> Result<TravelStart, TravelError> {
        let mut active = lock_active(&self.active);
        if active.is_some() {
            debug!("Travel to {} rejected: already traveling", target);
            return Err(TravelError::Busy);
        }

        let mut map = lock_state(state);
        let destination = map
            .store()
            .get(target)
            .cloned()
            .ok_or(TravelError::UnknownWaypoint(target))?;
        if !map.is_discovered(&destination) {
            return Err(TravelError::Unreachable {
                name: destination.name().to_string(),
            });
        }

        let distance = destination.distance_from(map.current_position());
        let Some(duration) = self.config.duration_for(distance) else {
            let sweep = map.arrive(destination.position_index());
            drop(map);
            drop(active);
            info!(
                "Arrived at {} (message {})",
                destination.name(),
                destination.position_index()
            );
            let arrival = finish_arrival(&destination, sweep.revealed, log.as_ref());
            self.notify(&arrival);
            return Ok(TravelStart::Arrived(arrival));
        };
        let Ok(runtime) = Handle::try_current() else {
            return Err(TravelError::NoRuntime);
        };

        let camera = self.config.animate_viewport.then(|| {
            JourneyCamera::toward(map.viewport(), destination.coordinates(), self.canvas)
        });
        drop(map);

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(TravelProgress::start(destination.category()));
        *active = Some(ActiveJourney {
            token,
            target,
            duration,
            cancel: cancel_tx,
        });
        drop(active);

        info!(
            "Traveling to {} ({} messages, {} ms)",
            destination.name(),
            distance,
            duration.as_millis()
        );

        let run = JourneyRun {
            token,
            destination,
            duration,
            tick: self.config.tick(),
            camera,
            state: Arc::clone(state),
            active: Arc::clone(&self.active),
            log,
            on_arrival: self.on_arrival.clone(),
        };
        let task = runtime.spawn(run.drive(cancel_rx, progress_tx));

        Ok(TravelStart::Journey(Journey {
            target,
            duration,
            progress: progress_rx,
            handle: CancelHandle {
                token,
                active: Arc::clone(&self.active),
            },
            task,
        }))
    }

    fn notify(&self, arrival: &Arrival) {
        if let Some(hook) = &self.on_arrival {
            hook(arrival);
        }
    }
}

/// Take the active journey and signal it. With `token`, only that journey.
fn cancel_active(active: &ActiveSlot, token: Option<u64>) -> bool {
    let mut slot = lock_active(active);
    let matches = slot
        .as_ref()
        .is_some_and(|a| token.map_or(true, |t| a.token == t));
    if !matches {
        return false;
    }
    if let Some(journey) = slot.take() {
        journey.cancel.send_replace(true);
        info!("Journey to {} cancelled", journey.target);
    }
    true
}

fn finish_arrival(destination: &Waypoint, revealed: Vec<WaypointId>, log: &dyn MessageLog) -> Arrival {
    let position = destination.position_index();
    let warning = if log.message_at_position(position).is_none() {
        warn!(
            "Location '{}' (message {}) not found in chat history",
            destination.name(),
            position
        );
        Some(TravelWarning::DestinationUnresolvable {
            name: destination.name().to_string(),
            position,
        })
    } else {
        None
    };
    Arrival {
        target: destination.id(),
        name: destination.name().to_string(),
        position_index: position,
        revealed,
        warning,
    }
}

// =============================================================================
// JOURNEY TASK
// =============================================================================

struct JourneyRun {
    token: u64,
    destination: Waypoint,
    duration: Duration,
    tick: Duration,
    camera: Option<JourneyCamera>,
    state: SharedMapState,
    active: ActiveSlot,
    log: Arc<dyn MessageLog>,
    on_arrival: Option<ArrivalHook>,
}

/// Clears the active slot if the task ends without arriving (abort, panic).
struct ActiveGuard {
    token: u64,
    active: ActiveSlot,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut slot = lock_active(&self.active);
        if slot.as_ref().is_some_and(|a| a.token == self.token) {
            *slot = None;
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl JourneyRun {
    async fn drive(
        self,
        mut cancel: watch::Receiver<bool>,
        progress: watch::Sender<TravelProgress>,
    ) -> Result<Arrival, TravelError> {
        let _guard = ActiveGuard {
            token: self.token,
            active: Arc::clone(&self.active),
        };
        let terrain = self.destination.category();
        let start = Instant::now();
        let deadline = start + self.duration;
        let mut last = 0.0_f64;
        let mut camera = self.camera;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let next = (now + self.tick).min(deadline);
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return Err(TravelError::Cancelled),
                _ = sleep_until(next) => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= self.duration {
                break;
            }
            let fraction = (elapsed.as_secs_f64() / self.duration.as_secs_f64())
                .min(BELOW_ONE)
                .max(last);
            last = fraction;
            progress.send_replace(TravelProgress {
                fraction,
                stage: TravelStage::at(fraction, terrain),
                elapsed,
            });
            if let Some(cam) = camera.as_mut() {
                if !cam.step(lock_state(&self.state).viewport_mut(), fraction) {
                    debug!("Viewport moved during travel; camera released");
                    camera = None;
                }
            }
        }

        let revealed = {
            let mut active = lock_active(&self.active);
            if !active.as_ref().is_some_and(|a| a.token == self.token) {
                return Err(TravelError::Cancelled);
            }
            let mut map = lock_state(&self.state);
            if let Some(cam) = camera.as_mut() {
                cam.step(map.viewport_mut(), 1.0);
            }
            let sweep = map.arrive(self.destination.position_index());
            *active = None;
            sweep.revealed
        };

        progress.send_replace(TravelProgress {
            fraction: 1.0,
            stage: TravelStage::Arriving,
            elapsed: start.elapsed(),
        });
        info!(
            "Arrived at {} (message {})",
            self.destination.name(),
            self.destination.position_index()
        );

        let arrival = finish_arrival(&self.destination, revealed, self.log.as_ref());
        if let Some(hook) = &self.on_arrival {
            hook(&arrival);
        }
        Ok(arrival)
    }
}

// =============================================================================
// JOURNEY HANDLE
// =============================================================================

/// Cancels one specific journey; a no-op once it has ended.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: u64,
    active: ActiveSlot,
}

impl CancelHandle {
    pub fn cancel(&self) -> bool {
        cancel_active(&self.active, Some(self.token))
    }
}

/// Handle to a journey in flight. Dropping it does not cancel the journey.
#[derive(Debug)]
pub struct Journey {
    target: WaypointId,
    duration: Duration,
    progress: watch::Receiver<TravelProgress>,
    handle: CancelHandle,
    task: JoinHandle<Result<Arrival, TravelError>>,
}

impl Journey {
    pub fn target(&self) -> WaypointId {
        self.target
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Latest progress report.
    pub fn progress(&self) -> TravelProgress {
        *self.progress.borrow()
    }

    /// Receiver for every progress update.
    pub fn subscribe(&self) -> watch::Receiver<TravelProgress> {
        self.progress.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Cancel this journey. Returns `false` if it already ended.
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// Wait for the journey to arrive or be cancelled.
    pub async fn finish(self) -> Result<Arrival, TravelError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(TravelError::Cancelled),
        }
    }
}

impl fmt::Debug for ActiveJourney {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveJourney")
            .field("token", &self.token)
            .field("target", &self.target)
            .field("duration", &self.duration)
            .finish()
    }
}

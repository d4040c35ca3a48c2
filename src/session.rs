//! # Walk Session
//!
//! The live walk state machine. [`WalkSessionManager`] owns the single
//! session slot, the location subscription and the recorder.
//!
//! ## States
//!
//! ```text
//! Idle --start--> Tracking --pause--> Paused --resume--> Tracking
//!   ^                |                   |
//!   +------stop------+-------stop--------+
//! ```
//!
//! Position updates are pushed by the platform into a bounded channel and
//! applied by [`WalkSessionManager::process_pending_updates`]. Distance is
//! accumulated incrementally from the last trail point. On resume a fresh fix
//! is appended as an anchor without adding distance, so displacement while
//! paused never counts.

use std::fmt;
use std::sync::mpsc::{sync_channel, Receiver};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::error::OptionExt;
use crate::geo_utils::{format_distance, haversine_distance};
use crate::location::{LocationFeed, SubscriptionId, WatchOptions};
use crate::recorder::WalkRecorder;
use crate::storage::WalkStore;
use crate::{Coordinate, PetRef, Result, Walk, WalkError};

// ============================================================================
// Configuration
// ============================================================================

/// How distance is handled across a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ResumePolicy {
    /// Append the resume fix as an anchor without adding distance.
    /// Movement while paused is excluded from the total.
    #[default]
    Anchor,
    /// No anchor: the first update after resume accrues distance from the
    /// last pre-pause point, so movement while paused is counted.
    Bridge,
}

/// Configuration for live walk tracking.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackingConfig {
    /// Minimum time between platform updates in milliseconds.
    /// Default: 3000
    pub min_interval_ms: u32,

    /// Minimum movement before the platform delivers an update.
    /// Default: 1.0 meters
    pub min_distance_meters: f64,

    /// Updates closer than this to the last trail point are discarded as
    /// GPS jitter. Default: 0.0 (accept everything the platform delivers)
    pub noise_threshold_meters: f64,

    /// Distance policy across pause/resume. Default: Anchor
    pub resume_policy: ResumePolicy,

    /// Capacity of the update channel between platform and session.
    /// Default: 64
    pub channel_capacity: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 3000,
            min_distance_meters: 1.0,
            noise_threshold_meters: 0.0,
            resume_policy: ResumePolicy::Anchor,
            channel_capacity: 64,
        }
    }
}

impl TrackingConfig {
    /// Settings of the first tracker build: 5 s / 10 m sampling with a 5 m
    /// jitter filter, distance bridged across pauses.
    pub fn legacy() -> Self {
        Self {
            min_interval_ms: 5000,
            min_distance_meters: 10.0,
            noise_threshold_meters: 5.0,
            resume_policy: ResumePolicy::Bridge,
            ..Self::default()
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            min_interval_ms: self.min_interval_ms,
            min_distance_meters: self.min_distance_meters,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_interval_ms == 0 {
            return Err(config_error("min_interval_ms must be positive"));
        }
        if !self.min_distance_meters.is_finite() || self.min_distance_meters < 0.0 {
            return Err(config_error("min_distance_meters must be a non-negative number"));
        }
        if !self.noise_threshold_meters.is_finite() || self.noise_threshold_meters < 0.0 {
            return Err(config_error(
                "noise_threshold_meters must be a non-negative number",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(config_error("channel_capacity must be positive"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> WalkError {
    WalkError::ConfigError {
        message: message.to_string(),
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Coarse session state, derived from the session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum SessionState {
    Idle,
    Tracking,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Tracking => write!(f, "tracking"),
            SessionState::Paused => write!(f, "paused"),
        }
    }
}

/// What happened to a single position update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOutcome {
    /// Appended to the trail, `delta_meters` added to the distance
    Accepted { delta_meters: f64 },
    /// Closer than the noise threshold to the last point; discarded
    Jitter { delta_meters: f64 },
    /// No tracking session to apply it to
    Ignored,
    /// Non-finite latitude or longitude; discarded
    Rejected,
}

/// The in-progress walk. At most one exists at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveWalkSession {
    pet: PetRef,
    start_time: DateTime<Utc>,
    coordinates: Vec<Coordinate>,
    distance_meters: f64,
    is_tracking: bool,
}

impl ActiveWalkSession {
    /// Seed a session with its initial fix.
    pub fn begin(pet: PetRef, start_time: DateTime<Utc>, initial_fix: Coordinate) -> Self {
        Self {
            pet,
            start_time,
            coordinates: vec![initial_fix],
            distance_meters: 0.0,
            is_tracking: true,
        }
    }

    pub fn pet(&self) -> &PetRef {
        &self.pet
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    pub fn last_coordinate(&self) -> Option<&Coordinate> {
        self.coordinates.last()
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.start_time).max(Duration::zero())
    }

    pub(crate) fn into_parts(self) -> (PetRef, DateTime<Utc>, Vec<Coordinate>, f64) {
        (self.pet, self.start_time, self.coordinates, self.distance_meters)
    }

    /// Apply one position update against the last trail point.
    fn apply_update(&mut self, coord: Coordinate, noise_threshold: f64) -> UpdateOutcome {
        let Some(last) = self.coordinates.last() else {
            // Sessions are always seeded; treat an empty trail as a fresh start.
            self.coordinates.push(coord);
            return UpdateOutcome::Accepted { delta_meters: 0.0 };
        };

        let delta = haversine_distance(last, &coord);
        if delta < noise_threshold {
            return UpdateOutcome::Jitter {
                delta_meters: delta,
            };
        }

        self.coordinates.push(coord);
        self.distance_meters += delta;
        UpdateOutcome::Accepted {
            delta_meters: delta,
        }
    }

    fn pause(&mut self) {
        self.is_tracking = false;
    }

    fn resume(&mut self, anchor: Option<Coordinate>) {
        if let Some(anchor) = anchor {
            self.coordinates.push(anchor);
        }
        self.is_tracking = true;
    }
}

/// Read-only view of the active session for UI rendering.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SessionSnapshot {
    pub pet_id: String,
    pub pet_name: String,
    /// Unix timestamp in milliseconds
    pub start_time_ms: i64,
    pub elapsed_seconds: i64,
    pub distance_meters: f64,
    pub formatted_distance: String,
    pub point_count: u32,
    pub last_coordinate: Option<Coordinate>,
    pub is_tracking: bool,
}

/// Live subscription held while tracking. Dropping the receiver alone does
/// not stop the platform; it must be released through the feed.
struct LiveSubscription {
    id: SubscriptionId,
    updates: Receiver<Coordinate>,
}

// ============================================================================
// Session Manager
// ============================================================================

/// Owner of the single walk session.
///
/// Every transition takes `&mut self`, so start/pause/resume/stop can never
/// interleave. The location subscription is held only while tracking and is
/// released on pause, stop, abandon, teardown and drop.
pub struct WalkSessionManager {
    feed: Box<dyn LocationFeed>,
    recorder: WalkRecorder,
    config: TrackingConfig,
    session: Option<ActiveWalkSession>,
    subscription: Option<LiveSubscription>,
    last_walk_id: i64,
}

impl WalkSessionManager {
    /// Create a manager around a location feed and a walk store.
    pub fn new(
        feed: Box<dyn LocationFeed>,
        store: Box<dyn WalkStore>,
        config: TrackingConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            feed,
            recorder: WalkRecorder::new(store),
            config,
            session: None,
            subscription: None,
            last_walk_id: 0,
        })
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Idle,
            Some(s) if s.is_tracking => SessionState::Tracking,
            Some(_) => SessionState::Paused,
        }
    }

    pub fn active_session(&self) -> Option<&ActiveWalkSession> {
        self.session.as_ref()
    }

    pub fn is_tracking(&self) -> bool {
        self.state() == SessionState::Tracking
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let session = self.session.as_ref()?;
        let now = Utc::now();
        Some(SessionSnapshot {
            pet_id: session.pet.id.clone(),
            pet_name: session.pet.name.clone(),
            start_time_ms: session.start_time.timestamp_millis(),
            elapsed_seconds: session.elapsed(now).num_seconds(),
            distance_meters: session.distance_meters,
            formatted_distance: format_distance(session.distance_meters),
            point_count: session.coordinates.len() as u32,
            last_coordinate: session.last_coordinate().copied(),
            is_tracking: session.is_tracking,
        })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Replace the tracking configuration.
    ///
    /// Watch options take effect at the next subscribe (start or resume).
    pub fn set_config(&mut self, config: TrackingConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn recorder(&self) -> &WalkRecorder {
        &self.recorder
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Start a walk for `pet`.
    ///
    /// Fails with `SessionAlreadyActive` unless idle. No state is created
    /// unless permission, the initial fix and the subscription all succeed.
    pub fn start_walk(&mut self, pet: PetRef) -> Result<()> {
        if let Some(active) = &self.session {
            return Err(WalkError::SessionAlreadyActive {
                pet_id: active.pet.id.clone(),
            });
        }

        if !self.feed.request_permission() {
            warn!("[WalkSession] Location permission denied, not starting walk");
            return Err(WalkError::PermissionDenied);
        }

        let fix = self.fresh_fix()?;
        let subscription = self.open_subscription()?;

        info!(
            "[WalkSession] Walk started for {} ({})",
            pet.name, pet.id
        );
        self.session = Some(ActiveWalkSession::begin(pet, Utc::now(), fix));
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Pause tracking. Updates already delivered are applied first; the
    /// distance is frozen afterwards.
    pub fn pause_walk(&mut self) -> Result<()> {
        self.require_state("pause", SessionState::Tracking)?;

        self.process_pending_updates();
        self.release_subscription();
        if let Some(session) = self.session.as_mut() {
            session.pause();
            info!(
                "[WalkSession] Walk paused at {:.0}m",
                session.distance_meters
            );
        }
        Ok(())
    }

    /// Resume a paused walk.
    ///
    /// Under `Anchor` a fresh fix is taken first. If the fix or the
    /// subscription fails the walk stays paused and no anchor is appended.
    pub fn resume_walk(&mut self) -> Result<()> {
        self.require_state("resume", SessionState::Paused)?;

        let policy = self.config.resume_policy;
        let anchor = match policy {
            ResumePolicy::Anchor => Some(self.fresh_fix()?),
            ResumePolicy::Bridge => None,
        };
        let subscription = self.open_subscription()?;

        self.subscription = Some(subscription);
        if let Some(session) = self.session.as_mut() {
            session.resume(anchor);
            info!(
                "[WalkSession] Walk resumed ({:?}), {} points so far",
                policy,
                session.coordinates.len()
            );
        }
        Ok(())
    }

    /// Stop the walk, persist it, and return the finished record.
    ///
    /// The session is cleared before persisting. If the store fails the walk
    /// is lost and `PersistenceFailed` is returned; the manager is idle either
    /// way.
    pub fn stop_walk(&mut self) -> Result<Walk> {
        if self.session.is_none() {
            return Err(WalkError::NoActiveSession { action: "stop" });
        }

        self.process_pending_updates();
        self.release_subscription();
        let session = self.session.take().ok_or_no_session("stop")?;

        let end_time = Utc::now().max(session.start_time);
        let id = self.next_walk_id(end_time);
        let walk = WalkRecorder::finalize(session, id, end_time);

        match self.recorder.persist(&walk) {
            Ok(()) => {
                info!(
                    "[WalkSession] Walk {} saved: {}, {} points",
                    walk.id,
                    format_distance(walk.distance_meters),
                    walk.coordinates.len()
                );
                Ok(walk)
            }
            Err(e) => {
                warn!("[WalkSession] Walk {} lost: {}", walk.id, e);
                Err(e)
            }
        }
    }

    /// Discard the session without saving it.
    pub fn abandon_walk(&mut self) -> Option<ActiveWalkSession> {
        self.release_subscription();
        let session = self.session.take();
        if let Some(s) = &session {
            info!("[WalkSession] Walk for {} abandoned", s.pet.id);
        }
        session
    }

    /// Release the live subscription, e.g. when the host screen unmounts or
    /// the app goes to the background. A tracking walk becomes paused and can
    /// be resumed later.
    pub fn teardown(&mut self) {
        if self.subscription.is_none() {
            return;
        }
        self.process_pending_updates();
        self.release_subscription();
        if let Some(session) = self.session.as_mut() {
            session.pause();
        }
        info!("[WalkSession] Torn down, walk paused");
    }

    // ========================================================================
    // Position Updates
    // ========================================================================

    /// Apply a single position update. Ignored unless tracking; non-finite
    /// fixes are rejected.
    pub fn on_position_update(&mut self, coord: Coordinate) -> UpdateOutcome {
        if !coord.is_finite() {
            warn!("[WalkSession] Rejected non-finite fix {:?}", coord);
            return UpdateOutcome::Rejected;
        }
        let threshold = self.config.noise_threshold_meters;
        let outcome = match self.session.as_mut() {
            Some(session) if session.is_tracking => session.apply_update(coord, threshold),
            _ => UpdateOutcome::Ignored,
        };
        if let UpdateOutcome::Jitter { delta_meters } = outcome {
            debug!("[WalkSession] Dropped jitter update ({:.1}m)", delta_meters);
        }
        outcome
    }

    /// Drain updates delivered by the feed and apply them in order.
    ///
    /// Returns the number of updates appended to the trail.
    pub fn process_pending_updates(&mut self) -> usize {
        let pending: Vec<Coordinate> = match &self.subscription {
            Some(sub) => sub.updates.try_iter().collect(),
            None => return 0,
        };

        let mut accepted = 0;
        for coord in pending {
            if let UpdateOutcome::Accepted { .. } = self.on_position_update(coord) {
                accepted += 1;
            }
        }
        accepted
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require_state(&self, action: &'static str, expected: SessionState) -> Result<()> {
        match self.state() {
            state if state == expected => Ok(()),
            SessionState::Idle => Err(WalkError::NoActiveSession { action }),
            state => Err(WalkError::InvalidTransition { action, state }),
        }
    }

    /// One-shot fix from the feed. Non-finite readings count as unavailable.
    fn fresh_fix(&mut self) -> Result<Coordinate> {
        let fix = self.feed.current_fix()?;
        if !fix.is_finite() {
            return Err(WalkError::location(format!("non-finite fix {:?}", fix)));
        }
        Ok(fix)
    }

    fn open_subscription(&mut self) -> Result<LiveSubscription> {
        let (sink, updates) = sync_channel(self.config.channel_capacity as usize);
        let id = self.feed.subscribe(&self.config.watch_options(), sink)?;
        debug!("[WalkSession] Subscribed to location updates ({:?})", id);
        Ok(LiveSubscription { id, updates })
    }

    fn release_subscription(&mut self) {
        if let Some(sub) = self.subscription.take() {
            self.feed.unsubscribe(sub.id);
            debug!("[WalkSession] Unsubscribed from location updates ({:?})", sub.id);
        }
    }

    /// Millisecond timestamp id, strictly increasing per manager.
    fn next_walk_id(&mut self, end_time: DateTime<Utc>) -> String {
        let id = end_time.timestamp_millis().max(self.last_walk_id + 1);
        self.last_walk_id = id;
        id.to_string()
    }
}

impl Drop for WalkSessionManager {
    fn drop(&mut self) {
        self.release_subscription();
    }
}

// ============================================================================
// Tests
// ============================================================================

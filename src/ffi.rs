//! FFI bindings for mobile platforms (iOS/Android).
//!
//! The app owns a [`WalkTracker`] handle built from two callback interfaces:
//! [`PlatformLocation`] (permission, fixes, watch start/stop) and
//! [`PlatformWalkStore`] (walk history as JSON). Live positions come back in
//! through [`WalkTracker::push_position`].
//!
//! Commands never throw across the boundary; they return a
//! [`WalkCommandResult`] carrying the error kind and message.

use std::collections::HashMap;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{TimeZone, Utc};
use log::{debug, info, warn};

use crate::location::{LocationFeed, SubscriptionId, WatchOptions};
use crate::session::{SessionSnapshot, SessionState, TrackingConfig, WalkSessionManager};
use crate::storage::WalkStore;
use crate::{
    format_distance, format_duration, haversine_distance, init_logging, path_length, Coordinate,
    OptionExt, PetRef, Result, Walk, WalkError, WalkErrorKind, WalkStats,
};

// ============================================================================
// Callback Interfaces (implemented in Kotlin/Swift)
// ============================================================================

/// Platform location service.
#[uniffi::export(callback_interface)]
pub trait PlatformLocation: Send + Sync {
    /// Request foreground location permission. Return false on denial or error.
    fn request_permission(&self) -> bool;

    /// One-shot current position, or None if unavailable.
    fn current_fix(&self) -> Option<Coordinate>;

    /// Start a position watch. Deliver each update with
    /// `WalkTracker::push_position(subscription_id, ..)`.
    /// Return false if the watch could not be started.
    fn start_watch(&self, subscription_id: u64, options: WatchOptions) -> bool;

    /// Stop a position watch.
    fn stop_watch(&self, subscription_id: u64);
}

/// Platform key-value storage holding walk history as JSON.
#[uniffi::export(callback_interface)]
pub trait PlatformWalkStore: Send + Sync {
    /// Upsert one walk by its `id`. Return false on failure.
    fn save_walk_json(&self, walk_json: String) -> bool;

    /// All stored walks as a JSON array.
    fn load_walks_json(&self) -> String;

    /// Delete one walk. Return true if it existed.
    fn delete_walk(&self, walk_id: String) -> bool;
}

// ============================================================================
// Adapters
// ============================================================================

type Senders = Arc<Mutex<HashMap<u64, SyncSender<Coordinate>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bridges [`PlatformLocation`] to [`LocationFeed`]. Channel senders are
/// shared with the tracker so `push_position` can route updates by id.
struct PlatformFeed {
    platform: Box<dyn PlatformLocation>,
    senders: Senders,
    next_id: u64,
}

impl LocationFeed for PlatformFeed {
    fn request_permission(&mut self) -> bool {
        self.platform.request_permission()
    }

    fn current_fix(&mut self) -> Result<Coordinate> {
        self.platform.current_fix().ok_or_location("platform returned no fix")
    }

    fn subscribe(
        &mut self,
        options: &WatchOptions,
        sink: SyncSender<Coordinate>,
    ) -> Result<SubscriptionId> {
        self.next_id += 1;
        let id = self.next_id;
        lock(&self.senders).insert(id, sink);

        // Lock released: the platform may push from inside start_watch
        if !self.platform.start_watch(id, *options) {
            lock(&self.senders).remove(&id);
            return Err(WalkError::location("platform could not start watch"));
        }
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        let removed = lock(&self.senders).remove(&id.0).is_some();
        if removed {
            self.platform.stop_watch(id.0);
        }
    }
}

/// Bridges [`PlatformWalkStore`] to [`WalkStore`] using the stored JSON
/// format.
struct PlatformStore {
    platform: Box<dyn PlatformWalkStore>,
}

impl WalkStore for PlatformStore {
    fn save_walk(&mut self, walk: &Walk) -> Result<()> {
        let json = serde_json::to_string(walk).map_err(|e| WalkError::persistence(e.to_string()))?;
        if self.platform.save_walk_json(json) {
            Ok(())
        } else {
            Err(WalkError::persistence(format!(
                "platform store rejected walk {}",
                walk.id
            )))
        }
    }

    fn list_walks(&self) -> Result<Vec<Walk>> {
        let json = self.platform.load_walks_json();
        let mut walks: Vec<Walk> =
            serde_json::from_str(&json).map_err(|e| WalkError::persistence(e.to_string()))?;
        walks.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| b.id.cmp(&a.id)));
        Ok(walks)
    }

    fn delete_walk(&mut self, walk_id: &str) -> Result<bool> {
        Ok(self.platform.delete_walk(walk_id.to_string()))
    }
}

// ============================================================================
// Tracker Object
// ============================================================================

/// Outcome of a tracker command.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct WalkCommandResult {
    pub success: bool,
    pub error_kind: Option<WalkErrorKind>,
    pub message: Option<String>,
    /// Stored JSON of the finished walk (stop only)
    pub walk_json: Option<String>,
}

impl WalkCommandResult {
    fn ok() -> Self {
        Self {
            success: true,
            error_kind: None,
            message: None,
            walk_json: None,
        }
    }

    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::from_error(&e),
        }
    }

    fn from_error(error: &WalkError) -> Self {
        Self {
            success: false,
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            walk_json: None,
        }
    }
}

/// Error raised when a tracker cannot be created.
#[derive(Debug, Clone, thiserror::Error, uniffi::Error)]
pub enum TrackerError {
    #[error("{message}")]
    InvalidConfig { message: String },
}

/// Walk tracker handle owned by the app.
#[derive(uniffi::Object)]
pub struct WalkTracker {
    manager: Mutex<WalkSessionManager>,
    senders: Senders,
    last_walk: Mutex<Option<Walk>>,
}

#[uniffi::export]
impl WalkTracker {
    /// Create a tracker. Fails only on an invalid config.
    #[uniffi::constructor]
    pub fn new(
        location: Box<dyn PlatformLocation>,
        store: Box<dyn PlatformWalkStore>,
        config: TrackingConfig,
    ) -> std::result::Result<Arc<Self>, TrackerError> {
        init_logging();

        let senders: Senders = Arc::new(Mutex::new(HashMap::new()));
        let feed = PlatformFeed {
            platform: location,
            senders: senders.clone(),
            next_id: 0,
        };
        let store = PlatformStore { platform: store };

        let manager = WalkSessionManager::new(Box::new(feed), Box::new(store), config).map_err(|e| {
            warn!("[WalkTracker] Rejected config: {}", e);
            TrackerError::InvalidConfig {
                message: e.to_string(),
            }
        })?;

        info!("[WalkTracker] Created");
        Ok(Arc::new(Self {
            manager: Mutex::new(manager),
            senders,
            last_walk: Mutex::new(None),
        }))
    }

    pub fn start_walk(&self, pet_id: String, pet_name: String) -> WalkCommandResult {
        info!("[WalkTracker] start_walk for {}", pet_id);
        WalkCommandResult::from_result(self.manager().start_walk(PetRef::new(pet_id, pet_name)))
    }

    pub fn pause_walk(&self) -> WalkCommandResult {
        WalkCommandResult::from_result(self.manager().pause_walk())
    }

    pub fn resume_walk(&self) -> WalkCommandResult {
        WalkCommandResult::from_result(self.manager().resume_walk())
    }

    /// Stop and persist the walk. On success `walk_json` holds the record.
    pub fn stop_walk(&self) -> WalkCommandResult {
        match self.manager().stop_walk() {
            Ok(walk) => {
                let json = walk.to_json();
                *lock(&self.last_walk) = Some(walk);
                WalkCommandResult {
                    walk_json: Some(json),
                    ..WalkCommandResult::ok()
                }
            }
            Err(e) => WalkCommandResult::from_error(&e),
        }
    }

    /// Discard the active walk without saving.
    pub fn abandon_walk(&self) -> WalkCommandResult {
        match self.manager().abandon_walk() {
            Some(_) => WalkCommandResult::ok(),
            None => WalkCommandResult::from_error(&WalkError::NoActiveSession { action: "abandon" }),
        }
    }

    /// Release the location watch (screen unmount, app backgrounded).
    pub fn teardown(&self) {
        self.manager().teardown();
    }

    /// Deliver a position from a platform watch.
    ///
    /// Returns false for unknown or released subscriptions. If the tracker is
    /// busy the update stays queued and is applied by the next command.
    pub fn push_position(&self, subscription_id: u64, coordinate: Coordinate) -> bool {
        let sent = match lock(&self.senders).get(&subscription_id) {
            Some(sink) => match sink.try_send(coordinate) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("[WalkTracker] Update queue full, dropping position");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
            None => {
                debug!("[WalkTracker] Position for stale watch {}", subscription_id);
                false
            }
        };

        if sent {
            if let Ok(mut manager) = self.manager.try_lock() {
                manager.process_pending_updates();
            }
        }
        sent
    }

    /// Apply any queued positions. Returns how many were added to the trail.
    pub fn process_pending_updates(&self) -> u32 {
        self.manager().process_pending_updates() as u32
    }

    pub fn state(&self) -> SessionState {
        self.manager().state()
    }

    pub fn is_tracking(&self) -> bool {
        self.manager().is_tracking()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let mut manager = self.manager();
        manager.process_pending_updates();
        manager.snapshot()
    }

    pub fn config(&self) -> TrackingConfig {
        self.manager().config().clone()
    }

    pub fn set_config(&self, config: TrackingConfig) -> WalkCommandResult {
        WalkCommandResult::from_result(self.manager().set_config(config))
    }

    /// JSON of the walk returned by the last successful stop, if any.
    pub fn last_walk_json(&self) -> Option<String> {
        lock(&self.last_walk).as_ref().map(Walk::to_json)
    }

    /// Stats over stored history, optionally for a single pet.
    pub fn walk_stats(&self, pet_id: Option<String>) -> WalkStats {
        match self.manager().recorder().store().list_walks() {
            Ok(walks) => WalkStats::from_walks(&walks, pet_id.as_deref()),
            Err(e) => {
                warn!("[WalkTracker] Could not load walk history: {}", e);
                WalkStats::default()
            }
        }
    }
}

impl WalkTracker {
    fn manager(&self) -> MutexGuard<'_, WalkSessionManager> {
        lock(&self.manager)
    }
}

// ============================================================================
// Pure Helpers
// ============================================================================

#[uniffi::export]
pub fn ffi_format_distance(meters: f64) -> String {
    format_distance(meters)
}

/// Format the span between two Unix millisecond timestamps.
#[uniffi::export]
pub fn ffi_format_duration(start_ms: i64, end_ms: i64) -> String {
    match (
        Utc.timestamp_millis_opt(start_ms).single(),
        Utc.timestamp_millis_opt(end_ms).single(),
    ) {
        (Some(start), Some(end)) => format_duration(start, end),
        _ => "0 min".to_string(),
    }
}

#[uniffi::export]
pub fn ffi_path_length(coordinates: Vec<Coordinate>) -> f64 {
    path_length(&coordinates)
}

#[uniffi::export]
pub fn ffi_haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    haversine_distance(&a, &b)
}

#[uniffi::export]
pub fn default_tracking_config() -> TrackingConfig {
    TrackingConfig::default()
}

//! Location collaborator contract.
//!
//! The platform location service is wrapped behind [`LocationFeed`]. Live
//! updates are pushed into a bounded channel handed over at subscribe time;
//! the session drains that channel on its own thread, so a session is never
//! mutated concurrently.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::{Coordinate, Result, WalkError};

/// Opaque handle for a live location subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Delivery constraints for a live subscription.
///
/// Filtering happens on the platform side; the session accepts whatever is
/// delivered.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WatchOptions {
    /// Minimum time between updates in milliseconds
    pub min_interval_ms: u32,
    /// Minimum movement before an update is delivered, in meters
    pub min_distance_meters: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_interval_ms: 3000,
            min_distance_meters: 1.0,
        }
    }
}

/// Platform location service, as seen by the walk session.
pub trait LocationFeed: Send {
    /// Ask for foreground location permission. Any error counts as denial.
    fn request_permission(&mut self) -> bool;

    /// One-shot current position.
    fn current_fix(&mut self) -> Result<Coordinate>;

    /// Start delivering position updates into `sink`.
    fn subscribe(
        &mut self,
        options: &WatchOptions,
        sink: SyncSender<Coordinate>,
    ) -> Result<SubscriptionId>;

    /// Stop delivery. Must be safe to call more than once for the same id.
    fn unsubscribe(&mut self, id: SubscriptionId);
}

// ============================================================================
// Mock Feed
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    permission_granted: bool,
    fixes: VecDeque<Coordinate>,
    subscribe_fails: bool,
    subscribers: HashMap<SubscriptionId, SyncSender<Coordinate>>,
    next_id: u64,
    last_options: Option<WatchOptions>,
    unsubscribe_calls: u32,
    teardowns: u32,
}

/// In-process location feed for tests and demos.
///
/// Clones share state, so a test can keep one handle while the session owns
/// another. Fixes are served from a queue; an empty queue means no fix.
#[derive(Debug, Clone)]
pub struct MockLocationFeed {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockLocationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLocationFeed {
    /// New feed with permission granted and no queued fixes.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                permission_granted: true,
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_permission(&self, granted: bool) {
        self.state().permission_granted = granted;
    }

    pub fn set_subscribe_fails(&self, fails: bool) {
        self.state().subscribe_fails = fails;
    }

    /// Queue the result of the next `current_fix` call.
    pub fn queue_fix(&self, coord: Coordinate) {
        self.state().fixes.push_back(coord);
    }

    /// Deliver a position to every live subscriber.
    ///
    /// Returns the number of subscribers that accepted it. Subscribers whose
    /// receiver is gone are dropped.
    pub fn push(&self, coord: Coordinate) -> usize {
        let mut state = self.state();
        let mut delivered = 0;
        state.subscribers.retain(|id, sink| match sink.try_send(coord) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("[MockLocation] Subscriber {:?} is full, dropping update", id);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn last_options(&self) -> Option<WatchOptions> {
        self.state().last_options
    }

    /// Every `unsubscribe` call, including repeats.
    pub fn unsubscribe_calls(&self) -> u32 {
        self.state().unsubscribe_calls
    }

    /// Subscriptions actually torn down.
    pub fn teardowns(&self) -> u32 {
        self.state().teardowns
    }
}

impl LocationFeed for MockLocationFeed {
    fn request_permission(&mut self) -> bool {
        self.state().permission_granted
    }

    fn current_fix(&mut self) -> Result<Coordinate> {
        self.state()
            .fixes
            .pop_front()
            .ok_or_else(|| WalkError::location("no fix available"))
    }

    fn subscribe(
        &mut self,
        options: &WatchOptions,
        sink: SyncSender<Coordinate>,
    ) -> Result<SubscriptionId> {
        let mut state = self.state();
        if state.subscribe_fails {
            return Err(WalkError::location("watch could not be started"));
        }
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscribers.insert(id, sink);
        state.last_options = Some(*options);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        let mut state = self.state();
        state.unsubscribe_calls += 1;
        if state.subscribers.remove(&id).is_some() {
            state.teardowns += 1;
        }
    }
}

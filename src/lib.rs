//! # Walk Tracker
//!
//! Live GPS walk tracking for a pet-care app.
//!
//! This library provides:
//! - Great-circle (Haversine) distance and path length helpers
//! - A walk session state machine (start / pause / resume / stop) fed by a
//!   live location subscription
//! - Incremental distance accumulation with optional jitter rejection
//! - Walk records and walk history storage
//!
//! ## Features
//!
//! - **`persistence`** - SQLite walk history store (enabled by default)
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use walk_tracker::location::MockLocationFeed;
//! use walk_tracker::storage::MemoryWalkStore;
//! use walk_tracker::{Coordinate, PetRef, TrackingConfig, WalkSessionManager};
//!
//! let feed = MockLocationFeed::new();
//! feed.queue_fix(Coordinate::new(51.5074, -0.1278));
//!
//! let mut manager = WalkSessionManager::new(
//!     Box::new(feed.clone()),
//!     Box::new(MemoryWalkStore::new()),
//!     TrackingConfig::default(),
//! )
//! .unwrap();
//!
//! manager.start_walk(PetRef::new("pet-1", "Rex")).unwrap();
//! feed.push(Coordinate::new(51.5080, -0.1278));
//! manager.process_pending_updates();
//!
//! let walk = manager.stop_walk().unwrap();
//! assert_eq!(walk.coordinates.len(), 2);
//! assert!(walk.distance_meters > 60.0);
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, WalkError, WalkErrorKind};

// Geographic utilities (distance, formatting, bounds)
pub mod geo_utils;
pub use geo_utils::{format_distance, format_duration, haversine_distance, path_length};

// Location collaborator contract
pub mod location;
pub use location::{LocationFeed, SubscriptionId, WatchOptions};

// Walk session state machine
pub mod session;
pub use session::{
    ActiveWalkSession, ResumePolicy, SessionSnapshot, SessionState, TrackingConfig,
    UpdateOutcome, WalkSessionManager,
};

// Session -> Walk finalization and handoff to storage
pub mod recorder;
pub use recorder::WalkRecorder;

// Walk history storage
pub mod storage;
pub use storage::{MemoryWalkStore, RetentionPolicy, WalkStore};
#[cfg(feature = "persistence")]
pub use storage::SqliteWalkStore;

// Walk history statistics
pub mod history;
pub use history::{walks_for_pet, WalkStats};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("WalkTracker"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A location fix with latitude and longitude in degrees.
///
/// No range validation is applied by the tracker; out-of-range values are
/// accepted as delivered by the platform.
///
/// # Example
/// ```
/// use walk_tracker::Coordinate;
/// let point = Coordinate::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both components are finite numbers. Fixes failing this never enter a
    /// trail.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Check if the coordinate is finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Identity of the pet being walked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PetRef {
    pub id: String,
    pub name: String,
}

impl PetRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Bounding box for a trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from coordinates.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// A finished walk, as persisted to walk history.
///
/// Serialized field names follow the app's stored JSON (`petId`,
/// `startTime`, `distance`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Walk {
    pub id: String,
    pub pet_id: String,
    /// Planned route this walk followed; live-tracked walks have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Accumulated distance in meters
    #[serde(rename = "distance", alias = "distanceMeters", default)]
    pub distance_meters: f64,
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,
    pub completed: bool,
}

impl Walk {
    /// Elapsed time between start and end, if the walk has ended.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Bounding box of the trail, for fitting a map viewport.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.coordinates)
    }

    /// Human-readable distance ("742 m", "1.24 km").
    pub fn formatted_distance(&self) -> String {
        format_distance(self.distance_meters)
    }

    /// Human-readable duration, or `None` while the walk is still open.
    pub fn formatted_duration(&self) -> Option<String> {
        self.end_time
            .map(|end| format_duration(self.start_time, end))
    }

    /// Serialize to the stored JSON representation.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_walk() -> Walk {
        Walk {
            id: "1718000000000".to_string(),
            pet_id: "pet-1".to_string(),
            route_id: None,
            start_time: Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap(),
            end_time: Some(Utc.with_ymd_and_hms(2024, 6, 10, 8, 42, 30).unwrap()),
            distance_meters: 1240.0,
            coordinates: vec![
                Coordinate::new(51.5074, -0.1278),
                Coordinate::new(51.5090, -0.1300),
                Coordinate::new(51.5110, -0.1320),
            ],
            completed: true,
        }
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(51.5074, -0.1278).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(Coordinate::new(91.0, 0.0).is_finite());
        assert!(!Coordinate::new(0.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_bounds_from_points() {
        let walk = sample_walk();
        let bounds = walk.bounds().unwrap();
        assert_eq!(bounds.min_lat, 51.5074);
        assert_eq!(bounds.max_lat, 51.5110);
        assert_eq!(bounds.min_lng, -0.1320);
        assert_eq!(bounds.max_lng, -0.1278);

        let center = bounds.center();
        assert!((center.latitude - 51.5092).abs() < 1e-9);
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_walk_json_field_names() {
        let json = sample_walk().to_json();
        assert!(json.contains("\"petId\":\"pet-1\""));
        assert!(json.contains("\"distance\":1240.0"));
        assert!(json.contains("\"startTime\""));
        assert!(json.contains("\"completed\":true"));
        assert!(!json.contains("routeId"));
    }

    #[test]
    fn test_walk_json_accepts_app_format() {
        let json = r#"{
            "id": "1718000000000",
            "petId": "pet-1",
            "startTime": "2024-06-10T08:00:00.000Z",
            "endTime": "2024-06-10T08:42:30.000Z",
            "distanceMeters": 1240,
            "coordinates": [{"latitude": 51.5074, "longitude": -0.1278}],
            "completed": true
        }"#;
        let walk: Walk = serde_json::from_str(json).unwrap();
        assert_eq!(walk.pet_id, "pet-1");
        assert_eq!(walk.distance_meters, 1240.0);
        assert_eq!(walk.duration(), Some(Duration::seconds(42 * 60 + 30)));
    }

    #[test]
    fn test_walk_without_optional_fields() {
        let json = r#"{
            "id": "w1",
            "petId": "pet-1",
            "startTime": "2024-06-10T08:00:00Z",
            "completed": false
        }"#;
        let walk: Walk = serde_json::from_str(json).unwrap();
        assert!(walk.end_time.is_none());
        assert!(walk.coordinates.is_empty());
        assert_eq!(walk.distance_meters, 0.0);
        assert!(walk.formatted_duration().is_none());
    }

    #[test]
    fn test_walk_formatting() {
        let walk = sample_walk();
        assert_eq!(walk.formatted_distance(), "1.24 km");
        assert_eq!(walk.formatted_duration().as_deref(), Some("42 min"));
    }
}

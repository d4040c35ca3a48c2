//! Turns a finished session into a [`Walk`] and hands it to storage.

use chrono::{DateTime, Utc};
use log::debug;

use crate::session::ActiveWalkSession;
use crate::storage::WalkStore;
use crate::{Result, Walk, WalkError};

/// Packages finished sessions and persists them through a [`WalkStore`].
pub struct WalkRecorder {
    store: Box<dyn WalkStore>,
}

impl WalkRecorder {
    pub fn new(store: Box<dyn WalkStore>) -> Self {
        Self { store }
    }

    /// Build the walk record for a finished session. No side effects.
    pub fn finalize(session: ActiveWalkSession, id: String, end_time: DateTime<Utc>) -> Walk {
        let (pet, start_time, coordinates, distance_meters) = session.into_parts();
        Walk {
            id,
            pet_id: pet.id,
            route_id: None,
            start_time,
            end_time: Some(end_time),
            distance_meters,
            coordinates,
            completed: true,
        }
    }

    /// Save (upsert by id) a walk. Any store failure becomes
    /// `PersistenceFailed`.
    pub fn persist(&mut self, walk: &Walk) -> Result<()> {
        debug!(
            "[WalkRecorder] Persisting walk {} ({} points)",
            walk.id,
            walk.coordinates.len()
        );
        self.store.save_walk(walk).map_err(|e| match e {
            WalkError::PersistenceFailed { .. } => e,
            other => WalkError::persistence(other.to_string()),
        })
    }

    pub fn store(&self) -> &dyn WalkStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryWalkStore;
    use crate::{Coordinate, PetRef};
    use chrono::Duration;

    fn session() -> ActiveWalkSession {
        let start = Utc::now() - Duration::minutes(30);
        ActiveWalkSession::begin(PetRef::new("pet-7", "Luna"), start, Coordinate::new(45.0, 25.0))
    }

    struct RejectingStore;

    impl WalkStore for RejectingStore {
        fn save_walk(&mut self, _walk: &Walk) -> Result<()> {
            Err(WalkError::ConfigError {
                message: "read-only".to_string(),
            })
        }

        fn list_walks(&self) -> Result<Vec<Walk>> {
            Ok(Vec::new())
        }

        fn delete_walk(&mut self, _walk_id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_finalize() {
        let session = session();
        let start = session.start_time();
        let end = Utc::now();

        let walk = WalkRecorder::finalize(session, "42".to_string(), end);
        assert_eq!(walk.id, "42");
        assert_eq!(walk.pet_id, "pet-7");
        assert_eq!(walk.start_time, start);
        assert_eq!(walk.end_time, Some(end));
        assert_eq!(walk.coordinates, vec![Coordinate::new(45.0, 25.0)]);
        assert_eq!(walk.distance_meters, 0.0);
        assert!(walk.completed);
        assert!(walk.route_id.is_none());
    }

    #[test]
    fn test_persist_upserts() {
        let mut recorder = WalkRecorder::new(Box::new(MemoryWalkStore::new()));
        let mut walk = WalkRecorder::finalize(session(), "1".to_string(), Utc::now());

        recorder.persist(&walk).unwrap();
        walk.distance_meters = 250.0;
        recorder.persist(&walk).unwrap();

        let walks = recorder.store().list_walks().unwrap();
        assert_eq!(walks.len(), 1);
        assert_eq!(walks[0].distance_meters, 250.0);
    }

    #[test]
    fn test_persist_maps_store_errors() {
        let mut recorder = WalkRecorder::new(Box::new(RejectingStore));
        let walk = WalkRecorder::finalize(session(), "1".to_string(), Utc::now());

        let result = recorder.persist(&walk);
        assert!(matches!(result, Err(WalkError::PersistenceFailed { .. })));
    }
}

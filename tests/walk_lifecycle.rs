//! End-to-end walk lifecycle against an on-disk SQLite history.
//!
//! Run with: cargo test --test walk_lifecycle -- --nocapture

use tempfile::TempDir;
use walk_tracker::location::MockLocationFeed;
use walk_tracker::{
    haversine_distance, Coordinate, PetRef, RetentionPolicy, SessionState, SqliteWalkStore,
    TrackingConfig, WalkError, WalkSessionManager, WalkStats, WalkStore,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open_store(dir: &TempDir) -> SqliteWalkStore {
    let path = dir.path().join("walks.db");
    SqliteWalkStore::new(path.to_str().unwrap()).unwrap()
}

/// Points ~111 m apart heading north.
fn step(i: u32) -> Coordinate {
    Coordinate::new(51.5074 + i as f64 * 0.001, -0.1278)
}

#[test]
fn test_full_walk_persists_across_reopen() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let feed = MockLocationFeed::new();

    let walk = {
        let mut manager = WalkSessionManager::new(
            Box::new(feed.clone()),
            Box::new(open_store(&dir)),
            TrackingConfig::default(),
        )
        .unwrap();

        feed.queue_fix(step(0));
        manager.start_walk(PetRef::new("pet-1", "Rex")).unwrap();
        assert_eq!(manager.state(), SessionState::Tracking);
        assert_eq!(feed.active_subscriptions(), 1);

        for i in 1..=3 {
            assert_eq!(feed.push(step(i)), 1);
        }
        assert_eq!(manager.process_pending_updates(), 3);

        let snapshot = manager.snapshot().unwrap();
        assert_eq!(snapshot.point_count, 4);
        assert_eq!(snapshot.pet_name, "Rex");

        let walk = manager.stop_walk().unwrap();
        assert_eq!(manager.state(), SessionState::Idle);
        assert_eq!(feed.active_subscriptions(), 0);
        walk
    };

    assert_eq!(walk.coordinates.len(), 4);
    assert!(walk.completed);
    assert!(walk.end_time.unwrap() >= walk.start_time);

    let expected: f64 = (0..3).map(|i| haversine_distance(&step(i), &step(i + 1))).sum();
    assert!((walk.distance_meters - expected).abs() < 1e-6);

    // Reopen the database file
    let store = open_store(&dir);
    let walks = store.list_walks().unwrap();
    assert_eq!(walks.len(), 1);
    assert_eq!(walks[0], walk);

    let stats = WalkStats::from_walks(&walks, Some("pet-1"));
    assert_eq!(stats.total_walks, 1);
    assert!((stats.total_distance_meters - expected).abs() < 1e-6);
}

#[test]
fn test_pause_excludes_movement_while_paused() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let feed = MockLocationFeed::new();
    let mut manager = WalkSessionManager::new(
        Box::new(feed.clone()),
        Box::new(open_store(&dir)),
        TrackingConfig::default(),
    )
    .unwrap();

    feed.queue_fix(step(0));
    manager.start_walk(PetRef::new("pet-2", "Luna")).unwrap();
    feed.push(step(1));
    manager.pause_walk().unwrap();
    let frozen = manager.active_session().unwrap().distance_meters();

    // Nothing is subscribed while paused
    assert_eq!(feed.push(step(5)), 0);

    feed.queue_fix(step(10));
    manager.resume_walk().unwrap();
    feed.push(step(11));
    manager.process_pending_updates();

    let walk = manager.stop_walk().unwrap();
    let resumed_leg = haversine_distance(&step(10), &step(11));
    assert!((walk.distance_meters - (frozen + resumed_leg)).abs() < 1e-6);
    assert_eq!(walk.coordinates, vec![step(0), step(1), step(10), step(11)]);
    assert_eq!(feed.teardowns(), 2);
}

#[test]
fn test_guards_and_retention() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let feed = MockLocationFeed::new();
    let store = open_store(&dir).with_retention(RetentionPolicy {
        max_walks: Some(2),
        trail_tolerance: None,
    });
    let mut manager =
        WalkSessionManager::new(Box::new(feed.clone()), Box::new(store), TrackingConfig::default())
            .unwrap();

    assert!(matches!(
        manager.stop_walk(),
        Err(WalkError::NoActiveSession { .. })
    ));

    let mut ids = Vec::new();
    for i in 0..3 {
        feed.queue_fix(step(i));
        manager.start_walk(PetRef::new("pet-1", "Rex")).unwrap();

        feed.queue_fix(step(i));
        assert!(matches!(
            manager.start_walk(PetRef::new("pet-2", "Luna")),
            Err(WalkError::SessionAlreadyActive { .. })
        ));

        ids.push(manager.stop_walk().unwrap().id);
    }

    let stored: Vec<String> = manager
        .recorder()
        .store()
        .list_walks()
        .unwrap()
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(stored, vec![ids[2].clone(), ids[1].clone()]);
}

#[test]
fn test_permission_denied_creates_nothing() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let feed = MockLocationFeed::new();
    feed.set_permission(false);
    feed.queue_fix(step(0));

    let mut manager = WalkSessionManager::new(
        Box::new(feed.clone()),
        Box::new(open_store(&dir)),
        TrackingConfig::default(),
    )
    .unwrap();

    assert_eq!(
        manager.start_walk(PetRef::new("pet-1", "Rex")),
        Err(WalkError::PermissionDenied)
    );
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(feed.active_subscriptions(), 0);
    assert!(manager.recorder().store().list_walks().unwrap().is_empty());
}

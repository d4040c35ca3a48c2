//! # Walk Storage
//!
//! Walk history persistence. The session only needs `save_walk` (upsert by
//! id); the read side serves the history screen.
//!
//! Two stores are provided:
//! - [`MemoryWalkStore`]: in-process, for tests and ephemeral sessions
//! - [`SqliteWalkStore`] (feature `persistence`): on-device SQLite
//!
//! Both list walks newest first and apply a [`RetentionPolicy`] on save.

use crate::geo_utils::simplify_trail;
use crate::{Result, Walk};

/// What a store keeps.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RetentionPolicy {
    /// Keep at most this many walks (newest by start time). Default: 20
    pub max_walks: Option<u32>,
    /// Douglas-Peucker tolerance in degrees applied to stored trails.
    /// Distance is never recomputed. Default: None (store full trail)
    pub trail_tolerance: Option<f64>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_walks: Some(20),
            trail_tolerance: None,
        }
    }
}

impl RetentionPolicy {
    /// Keep every walk and every point.
    pub fn unlimited() -> Self {
        Self {
            max_walks: None,
            trail_tolerance: None,
        }
    }

    fn prepare(&self, walk: &Walk) -> Walk {
        let mut stored = walk.clone();
        if let Some(tolerance) = self.trail_tolerance {
            stored.coordinates = simplify_trail(&walk.coordinates, tolerance);
        }
        stored
    }
}

/// Walk history store.
pub trait WalkStore: Send {
    /// Insert or replace the walk with the same id.
    fn save_walk(&mut self, walk: &Walk) -> Result<()>;

    /// All walks, newest first.
    fn list_walks(&self) -> Result<Vec<Walk>>;

    /// Delete one walk. Returns whether it existed.
    fn delete_walk(&mut self, walk_id: &str) -> Result<bool>;

    /// Walks of one pet, newest first.
    fn list_walks_for_pet(&self, pet_id: &str) -> Result<Vec<Walk>> {
        Ok(self
            .list_walks()?
            .into_iter()
            .filter(|w| w.pet_id == pet_id)
            .collect())
    }

    /// Delete every walk of a pet (used when the pet is removed).
    fn delete_walks_for_pet(&mut self, pet_id: &str) -> Result<u32> {
        let mut deleted = 0;
        for walk in self.list_walks_for_pet(pet_id)? {
            if self.delete_walk(&walk.id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory walk store.
#[derive(Debug, Clone, Default)]
pub struct MemoryWalkStore {
    walks: Vec<Walk>,
    retention: RetentionPolicy,
}

impl MemoryWalkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            walks: Vec::new(),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.walks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walks.is_empty()
    }
}

impl WalkStore for MemoryWalkStore {
    fn save_walk(&mut self, walk: &Walk) -> Result<()> {
        let stored = self.retention.prepare(walk);
        match self.walks.iter_mut().find(|w| w.id == walk.id) {
            Some(existing) => *existing = stored,
            None => self.walks.push(stored),
        }

        self.walks
            .sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| b.id.cmp(&a.id)));
        if let Some(max) = self.retention.max_walks {
            self.walks.truncate(max as usize);
        }
        Ok(())
    }

    fn list_walks(&self) -> Result<Vec<Walk>> {
        Ok(self.walks.clone())
    }

    fn delete_walk(&mut self, walk_id: &str) -> Result<bool> {
        let before = self.walks.len();
        self.walks.retain(|w| w.id != walk_id);
        Ok(self.walks.len() != before)
    }
}

// ============================================================================
// SQLite Store
// ============================================================================

#[cfg(feature = "persistence")]
pub use sqlite::SqliteWalkStore;

#[cfg(feature = "persistence")]
mod sqlite {
    use chrono::{DateTime, Utc};
    use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};

    use super::{RetentionPolicy, WalkStore};
    use crate::{Coordinate, Result, Walk, WalkError};

    /// Walk history in SQLite.
    ///
    /// Timestamps are stored as RFC 3339 text (full precision) plus a
    /// millisecond column used for ordering. Trails are MessagePack blobs.
    pub struct SqliteWalkStore {
        db: Connection,
        retention: RetentionPolicy,
    }

    /// Raw row, converted to a `Walk` outside the rusqlite closure.
    struct WalkRow {
        id: String,
        pet_id: String,
        route_id: Option<String>,
        start_time: String,
        end_time: Option<String>,
        distance: f64,
        completed: bool,
        coordinates: Vec<u8>,
    }

    const SELECT_WALK: &str = "SELECT id, pet_id, route_id, start_time, end_time, distance, completed, coordinates FROM walks";

    impl WalkRow {
        fn from_row(row: &Row<'_>) -> SqlResult<Self> {
            Ok(Self {
                id: row.get(0)?,
                pet_id: row.get(1)?,
                route_id: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                distance: row.get(5)?,
                completed: row.get(6)?,
                coordinates: row.get(7)?,
            })
        }

        fn into_walk(self) -> Result<Walk> {
            let coordinates: Vec<Coordinate> = rmp_serde::from_slice(&self.coordinates)
                .map_err(|e| WalkError::persistence(format!("corrupt trail for {}: {}", self.id, e)))?;
            let end_time = match self.end_time {
                Some(s) => Some(parse_time(&s)?),
                None => None,
            };
            Ok(Walk {
                start_time: parse_time(&self.start_time)?,
                end_time,
                id: self.id,
                pet_id: self.pet_id,
                route_id: self.route_id,
                distance_meters: self.distance,
                coordinates,
                completed: self.completed,
            })
        }
    }

    fn parse_time(s: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| WalkError::persistence(format!("bad timestamp '{}': {}", s, e)))
    }

    impl SqliteWalkStore {
        /// Open (or create) a store at the given database path.
        pub fn new(db_path: &str) -> SqlResult<Self> {
            let db = Connection::open(db_path)?;
            Self::init_schema(&db)?;
            Ok(Self {
                db,
                retention: RetentionPolicy::default(),
            })
        }

        /// Create an in-memory database (for testing).
        pub fn in_memory() -> SqlResult<Self> {
            Self::new(":memory:")
        }

        pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
            self.retention = retention;
            self
        }

        fn init_schema(conn: &Connection) -> SqlResult<()> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS walks (
                    id TEXT PRIMARY KEY,
                    pet_id TEXT NOT NULL,
                    route_id TEXT,
                    start_time TEXT NOT NULL,
                    start_ms INTEGER NOT NULL,
                    end_time TEXT,
                    distance REAL NOT NULL,
                    completed INTEGER NOT NULL,
                    coordinates BLOB NOT NULL,
                    point_count INTEGER NOT NULL,
                    created_at INTEGER DEFAULT (strftime('%s', 'now'))
                );

                CREATE INDEX IF NOT EXISTS idx_walks_pet ON walks(pet_id);
                CREATE INDEX IF NOT EXISTS idx_walks_start ON walks(start_ms DESC);
                "#,
            )
        }

        pub fn walk_count(&self) -> Result<u32> {
            let count: i64 = self
                .db
                .query_row("SELECT COUNT(*) FROM walks", [], |row| row.get(0))?;
            Ok(count as u32)
        }

        pub fn load_walk(&self, walk_id: &str) -> Result<Option<Walk>> {
            let row = self
                .db
                .query_row(
                    &format!("{} WHERE id = ?", SELECT_WALK),
                    params![walk_id],
                    WalkRow::from_row,
                )
                .optional()?;
            row.map(WalkRow::into_walk).transpose()
        }

        /// All walks as the app's JSON array, newest first.
        pub fn get_walks_json(&self) -> String {
            match self.list_walks() {
                Ok(walks) => serde_json::to_string(&walks).unwrap_or_else(|_| "[]".to_string()),
                Err(e) => {
                    log::warn!("[WalkStore] Failed to load walks: {}", e);
                    "[]".to_string()
                }
            }
        }

        fn query_walks(&self, sql: &str, pet_id: Option<&str>) -> Result<Vec<Walk>> {
            let mut stmt = self.db.prepare(sql)?;
            let rows: Vec<WalkRow> = match pet_id {
                Some(pet_id) => stmt
                    .query_map(params![pet_id], WalkRow::from_row)?
                    .collect::<SqlResult<_>>()?,
                None => stmt
                    .query_map([], WalkRow::from_row)?
                    .collect::<SqlResult<_>>()?,
            };
            rows.into_iter().map(WalkRow::into_walk).collect()
        }

        fn enforce_retention(&self) -> Result<()> {
            if let Some(max) = self.retention.max_walks {
                let removed = self.db.execute(
                    "DELETE FROM walks WHERE id NOT IN (
                        SELECT id FROM walks ORDER BY start_ms DESC, id DESC LIMIT ?
                     )",
                    params![max as i64],
                )?;
                if removed > 0 {
                    log::info!("[WalkStore] Trimmed {} old walks (keeping {})", removed, max);
                }
            }
            Ok(())
        }
    }

    impl WalkStore for SqliteWalkStore {
        fn save_walk(&mut self, walk: &Walk) -> Result<()> {
            let stored = self.retention.prepare(walk);
            let coordinates = rmp_serde::to_vec(&stored.coordinates)
                .map_err(|e| WalkError::persistence(e.to_string()))?;

            self.db.execute(
                "INSERT OR REPLACE INTO walks (id, pet_id, route_id, start_time, start_ms, end_time, distance, completed, coordinates, point_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    stored.id,
                    stored.pet_id,
                    stored.route_id,
                    stored.start_time.to_rfc3339(),
                    stored.start_time.timestamp_millis(),
                    stored.end_time.map(|t| t.to_rfc3339()),
                    stored.distance_meters,
                    stored.completed,
                    coordinates,
                    stored.coordinates.len() as i64
                ],
            )?;
            self.enforce_retention()
        }

        fn list_walks(&self) -> Result<Vec<Walk>> {
            self.query_walks(&format!("{} ORDER BY start_ms DESC, id DESC", SELECT_WALK), None)
        }

        fn delete_walk(&mut self, walk_id: &str) -> Result<bool> {
            let deleted = self
                .db
                .execute("DELETE FROM walks WHERE id = ?", params![walk_id])?;
            Ok(deleted > 0)
        }

        fn list_walks_for_pet(&self, pet_id: &str) -> Result<Vec<Walk>> {
            self.query_walks(
                &format!("{} WHERE pet_id = ? ORDER BY start_ms DESC, id DESC", SELECT_WALK),
                Some(pet_id),
            )
        }

        fn delete_walks_for_pet(&mut self, pet_id: &str) -> Result<u32> {
            let deleted = self
                .db
                .execute("DELETE FROM walks WHERE pet_id = ?", params![pet_id])?;
            Ok(deleted as u32)
        }
    }
}

//! Walk history statistics for the pet profile and history screens.

use serde::{Deserialize, Serialize};

use crate::Walk;

/// Aggregate statistics over completed walks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WalkStats {
    pub total_walks: u32,
    pub total_distance_meters: f64,
    /// Mean duration in whole minutes, rounded. Zero when there are no walks.
    pub avg_duration_minutes: u32,
}

impl WalkStats {
    /// Compute stats over completed walks, optionally for a single pet.
    ///
    /// Walks that are not completed are skipped. Completed walks without an
    /// end time count toward totals but not toward the mean duration.
    pub fn from_walks(walks: &[Walk], pet_id: Option<&str>) -> Self {
        let completed: Vec<&Walk> = walks
            .iter()
            .filter(|w| w.completed)
            .filter(|w| pet_id.map_or(true, |id| w.pet_id == id))
            .collect();

        if completed.is_empty() {
            return Self::default();
        }

        let total_distance_meters = completed.iter().map(|w| w.distance_meters).sum();
        let durations: Vec<f64> = completed
            .iter()
            .filter_map(|w| w.duration())
            .map(|d| d.num_milliseconds().max(0) as f64 / 60_000.0)
            .collect();
        let avg_duration_minutes = if durations.is_empty() {
            0
        } else {
            (durations.iter().sum::<f64>() / durations.len() as f64).round() as u32
        };

        Self {
            total_walks: completed.len() as u32,
            total_distance_meters,
            avg_duration_minutes,
        }
    }
}

/// Walks for one pet, newest first.
pub fn walks_for_pet(walks: &[Walk], pet_id: &str) -> Vec<Walk> {
    let mut result: Vec<Walk> = walks.iter().filter(|w| w.pet_id == pet_id).cloned().collect();
    result.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| b.id.cmp(&a.id)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn walk(id: &str, pet_id: &str, hour: u32, minutes: i64, distance: f64, completed: bool) -> Walk {
        let start = Utc.with_ymd_and_hms(2024, 6, 10, hour, 0, 0).unwrap();
        Walk {
            id: id.to_string(),
            pet_id: pet_id.to_string(),
            route_id: None,
            start_time: start,
            end_time: Some(start + Duration::minutes(minutes)),
            distance_meters: distance,
            coordinates: Vec::new(),
            completed,
        }
    }

    fn history() -> Vec<Walk> {
        vec![
            walk("1", "rex", 7, 20, 1000.0, true),
            walk("2", "luna", 9, 45, 3000.0, true),
            walk("3", "rex", 12, 40, 2000.0, true),
            walk("4", "rex", 15, 90, 9000.0, false),
        ]
    }

    #[test]
    fn test_stats_all_pets() {
        let stats = WalkStats::from_walks(&history(), None);
        assert_eq!(stats.total_walks, 3);
        assert_eq!(stats.total_distance_meters, 6000.0);
        // (20 + 45 + 40) / 3 = 35
        assert_eq!(stats.avg_duration_minutes, 35);
    }

    #[test]
    fn test_stats_single_pet() {
        let stats = WalkStats::from_walks(&history(), Some("rex"));
        assert_eq!(stats.total_walks, 2);
        assert_eq!(stats.total_distance_meters, 3000.0);
        assert_eq!(stats.avg_duration_minutes, 30);
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(WalkStats::from_walks(&[], None), WalkStats::default());
        assert_eq!(
            WalkStats::from_walks(&history(), Some("nobody")).total_walks,
            0
        );
    }

    #[test]
    fn test_completed_walk_without_end_time() {
        let mut open = walk("5", "rex", 18, 10, 500.0, true);
        open.end_time = None;

        let stats = WalkStats::from_walks(&[open.clone()], None);
        assert_eq!(stats.total_walks, 1);
        assert_eq!(stats.total_distance_meters, 500.0);
        assert_eq!(stats.avg_duration_minutes, 0);

        let mut walks = history();
        walks.push(open);
        let stats = WalkStats::from_walks(&walks, Some("rex"));
        assert_eq!(stats.total_walks, 3);
        assert_eq!(stats.total_distance_meters, 3500.0);
        // Mean over the two walks with an end time
        assert_eq!(stats.avg_duration_minutes, 30);
    }

    #[test]
    fn test_walks_for_pet_newest_first() {
        let ids: Vec<String> = walks_for_pet(&history(), "rex")
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids, vec!["4", "3", "1"]);
    }
}

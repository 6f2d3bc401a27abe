//! Review scheduling for served exercises.
//!
//! An exercise a user has never been served is always due. After the n-th
//! serving it becomes due again once n² days have passed since it was last
//! served. Every serving counts as a successful review: mistakes or hints
//! while solving do not shorten the interval.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::operations::{Exercise, UserExerciseView};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Days until an exercise served `repetition_counter` times is due again.
pub fn review_interval_days(repetition_counter: i64) -> f64 {
    let reps = repetition_counter.max(0);
    reps.saturating_mul(reps) as f64
}

/// Fractional days elapsed between `last_viewed` and `now`.
pub fn days_since(last_viewed: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - last_viewed).num_milliseconds() as f64 / MILLIS_PER_DAY
}

pub fn is_due(view: Option<&UserExerciseView>, now: DateTime<Utc>) -> bool {
    match view {
        None => true,
        Some(view) => {
            days_since(view.last_viewed, now) >= review_interval_days(view.repetition_counter)
        }
    }
}

/// Exercises from `exercises` that are due for the user whose history is `views`.
pub fn eligible_exercises(
    exercises: &[Exercise],
    views: &HashMap<String, UserExerciseView>,
    now: DateTime<Utc>,
) -> Vec<Exercise> {
    exercises
        .iter()
        .filter(|exercise| is_due(views.get(&exercise.id), now))
        .cloned()
        .collect()
}

/// The view record after serving `exercise_id` once more at `now`.
pub fn record_serving(
    existing: Option<&UserExerciseView>,
    user_id: &str,
    exercise_id: &str,
    now: DateTime<Utc>,
) -> UserExerciseView {
    match existing {
        Some(view) => UserExerciseView {
            last_viewed: now,
            repetition_counter: view.repetition_counter.saturating_add(1),
            ..view.clone()
        },
        None => UserExerciseView {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            exercise_id: exercise_id.to_string(),
            last_viewed: now,
            repetition_counter: 1,
        },
    }
}

//! Exercise and set domain records.
//!
//! # Responsibility
//! - Define read models (`Exercise`, `WorkoutSet`) returned by the store.
//! - Define write models (`NewExercise`, `NewSet`) accepted by the store.
//! - Define the created-exercise summary returned by batch create.
//!
//! # Invariants
//! - `id` values are assigned by the store and never reused.
//! - `sets` of an `Exercise` are in insertion order (set id ascending).
//! - `weight` and `reps` are non-negative; zero weight is a real value.

use serde::{Deserialize, Serialize};

/// Store-assigned exercise identifier.
pub type ExerciseId = i64;

/// Store-assigned set identifier.
pub type SetId = i64;

/// Category labels offered by the workout entry form.
///
/// The store accepts any label; this list only backs UI hints and the
/// `unknown category` diagnostic.
pub const KNOWN_CATEGORIES: &[&str] = &["Back", "Chest", "Legs", "Arms", "Shoulders", "Abs"];

/// Returns whether `category` is one of [`KNOWN_CATEGORIES`].
pub fn is_known_category(category: &str) -> bool {
    KNOWN_CATEGORIES.contains(&category)
}

/// One logged movement on a given day, together with its sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: ExerciseId,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub category: String,
    /// Serialized as `exerciseName` to match the workout UI payloads.
    #[serde(rename = "exerciseName")]
    pub name: String,
    /// Sets in insertion order. Empty when the exercise has no sets.
    pub sets: Vec<WorkoutSet>,
}

/// One repetition group of an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutSet {
    pub id: SetId,
    pub weight: i64,
    pub reps: i64,
}

/// Exercise header fields written by create and update paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExercise {
    pub date: String,
    pub category: String,
    pub name: String,
}

/// Set values written under an existing exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSet {
    pub weight: i64,
    pub reps: i64,
}

/// Summary of one exercise materialized by batch create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedExercise {
    pub id: ExerciseId,
    pub date: String,
    pub category: String,
    #[serde(rename = "exerciseName")]
    pub name: String,
}

impl CreatedExercise {
    pub(crate) fn from_new(id: ExerciseId, exercise: NewExercise) -> Self {
        Self {
            id,
            date: exercise.date,
            category: exercise.category,
            name: exercise.name,
        }
    }
}

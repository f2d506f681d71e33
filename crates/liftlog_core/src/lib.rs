//! Core domain logic for liftlog.
//! This crate owns the exercise/set write path and its invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LogLevel};
pub use model::exercise::{
    is_known_category, CreatedExercise, Exercise, ExerciseId, NewExercise, NewSet, SetId,
    WorkoutSet, KNOWN_CATEGORIES,
};
pub use repo::exercise_repo::{
    ExerciseFilter, ExerciseStore, RepoError, RepoResult, SqliteExerciseStore, SqliteUnitOfWork,
    UnitOfWork,
};
pub use service::payload::FieldIssue;
pub use service::workout_service::{
    BatchCreated, DeleteConfirmation, ErrorKind, ItemFailure, StorageStage, UpdateConfirmation,
    WorkoutResult, WorkoutService, WorkoutServiceError, WriteState,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Store layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the exercise/set data access contract, including the unit of
//!   work capability used by the write coordinator.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Mutations are only reachable through an explicit unit of work, except
//!   the single-statement exercise delete.
//! - Zero affected rows is reported as a count; deciding whether that means
//!   "not found" is the caller's job.

pub mod exercise_repo;

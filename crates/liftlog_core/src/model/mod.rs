//! Workout domain model.
//!
//! # Responsibility
//! - Define the exercise/set records shared by store and coordinator.
//!
//! # Invariants
//! - Every exercise and set is identified by a store-assigned integer id.
//! - Sets only carry a back-reference to their exercise; grouping is
//!   rebuilt at read time.

pub mod exercise;

//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into use-case level APIs.
//! - Own input validation and the commit/rollback decision.
//! - Keep CLI/HTTP callers decoupled from storage details.

pub mod payload;
pub mod workout_service;

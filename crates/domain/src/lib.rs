//! Shared types for the session cluster: the error type, configuration
//! structs, and structured trace events.

pub mod config;
pub mod error;
pub mod trace;

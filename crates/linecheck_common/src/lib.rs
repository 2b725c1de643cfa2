//! Linecheck Common - Shared types for the line diagnostic tool
//!
//! Holds the configuration snapshot, the report model and the timestamp
//! formats. Everything here is plain data: the collectors and the
//! orchestrator live in `linecheckd`.

pub mod config;
pub mod report;
pub mod timefmt;

pub use config::*;
pub use report::*;

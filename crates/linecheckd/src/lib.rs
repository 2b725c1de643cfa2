//! Linecheck daemon - health-check orchestrator for the sorting line.
//!
//! One diagnostic run samples the belt-drive PLC, inspects the freshest
//! blank reference images, resolves deployed-artifact timestamps, renders
//! the eight-section report and hands it to the storage uploader. Every
//! collaborator failure degrades its own report section only; the run as
//! a whole never aborts because one subsystem is unreachable.

pub mod anomaly;
pub mod config;
pub mod diagnosis;
pub mod plc;
pub mod scan;
pub mod upload;

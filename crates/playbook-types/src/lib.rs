//! Shared domain types for the playbook engine.
//!
//! This crate contains the types that cross crate boundaries: the step
//! specifications a caller submits, the ledger entries and summary the engine
//! returns, engine configuration, and run lifecycle events.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod event;
pub mod execution;
pub mod playbook;

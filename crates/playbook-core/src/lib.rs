//! Playbook execution engine.
//!
//! This crate defines the engine and the "ports" (capability traits) that
//! the infrastructure layer implements for external collaborators such as
//! AI providers and notification transports. It depends only on
//! `playbook-types` -- never on `playbook-infra` or any network crate.

pub mod event;
pub mod playbook;

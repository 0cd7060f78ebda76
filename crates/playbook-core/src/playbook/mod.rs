//! Playbook engine core: validation, capability dispatch, retry, ledger, runner.
//!
//! - `validation` -- request parsing (YAML/JSON), structural validation
//! - `capability` -- ports for external collaborators (actions, AI, notifications, task queue)
//! - `builtin` -- in-process capability implementations
//! - `retry` -- bounded retry with linear/exponential backoff
//! - `handlers` -- one handler per step type
//! - `registry` -- dispatch table from step type to handler
//! - `ledger` -- append-only step outcome record and summary derivation
//! - `runner` -- sequential fail-fast run driver

pub mod builtin;
pub mod capability;
pub mod handlers;
pub mod ledger;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod validation;

//! Infrastructure adapters for the playbook engine.
//!
//! - `config` -- data directory resolution and `config.toml` loading
//! - `ai` -- OpenAI-compatible implementation of the `AiAnalyst` port
//! - `notify` -- webhook implementation of the `NotificationDispatcher` port

pub mod ai;
pub mod config;
pub mod notify;
mod transport;

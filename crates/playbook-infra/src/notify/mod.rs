//! Notification dispatchers.

pub mod webhook;

pub use webhook::WebhookNotifier;

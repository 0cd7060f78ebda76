//! Request handlers grouped by resource.

pub mod playbook;

//! Run lifecycle event distribution.

pub mod bus;

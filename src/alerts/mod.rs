//! Alerts module
//!
//! Health-transition events and their fan-out to subscribers

pub mod dispatcher;
pub mod types;

pub use dispatcher::{AlertDispatcher, AlertHandler, SubscriptionId};
pub use types::*;

//! Device link domain models and helpers.

mod link_model;
mod link_policy;
mod link_scheduler;

pub use link_model::*;
pub use link_policy::*;
pub use link_scheduler::*;

//! relay-scheduler - background jobs for the relay gateway
//!
//! Jobs implement [`Job`] and are driven by [`JobRunner`] on cron schedules
//! until the runner's shutdown token is cancelled.

pub mod job;
pub mod runner;

pub use job::Job;
pub use runner::{JobRunner, next_delay, parse_schedule};

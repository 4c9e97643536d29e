//! Ramped HTTP load generation with latency and error thresholds.
//!
//! A [`scheduler::Scheduler`] follows a [`clock::RampSchedule`], growing and
//! shrinking a pool of [`user::VirtualUser`]s that each GET the target in a
//! loop. Every attempt lands in a shared [`metrics::MetricsCollector`]; when
//! the schedule ends the [`threshold`] module judges the final snapshot.
pub mod check;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod run;
pub mod scheduler;
pub mod threshold;
pub mod user;

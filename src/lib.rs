//! Agent Jobs — run a coding agent CLI against git repositories as tracked jobs.
//!
//! A submission becomes a [`job::Job`] record, runs through
//! [`runner::JobRunner`] (clone, profile overlay, agent subprocess, auto-PR),
//! and is persisted by [`store::JobStore`] at every step.

pub mod config;
pub mod error;
pub mod job;
pub mod pr;
pub mod profiles;
pub mod repos;
pub mod router;
pub mod runner;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
pub use job::{Job, JobStatus, SubmitRequest};
pub use runner::{JobRunner, JobService};

//! Job execution.
//!
//! - `command` — agent argv and environment
//! - `session` — session id extraction from agent output
//! - `runner` — `JobRunner`, one job end to end
//! - `supervisor` — ownership of background job tasks
//! - `service` — `JobService`, the submission API

pub mod command;
#[allow(clippy::module_inception)]
pub mod runner;
pub mod service;
pub mod session;
pub mod supervisor;

pub use command::{AgentCommand, AgentEnv};
pub use runner::JobRunner;
pub use service::JobService;
pub use session::extract_session_id;
pub use supervisor::JobSupervisor;

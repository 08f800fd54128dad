//! Job records and their lifecycle.
//!
//! - `model` — the `Job` record, its status machine and the `JobUpdate` patch type
//! - `request` — submission request/response envelopes

pub mod model;
pub mod request;

pub use model::{Job, JobMode, JobStatus, JobUpdate, NewJob, MAX_ERROR_CHARS, MAX_OUTPUT_CHARS};
pub use request::{JobListResponse, JobResponse, SubmitRequest};

//! Submission request and response envelopes shared by every front end.

use serde::{Deserialize, Serialize};

use super::model::{DEFAULT_BASE_REF, Job};

fn default_base_ref() -> String {
    DEFAULT_BASE_REF.to_string()
}

/// A request to run the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task: String,
    #[serde(default)]
    pub repo_url: String,
    /// Empty means "let the router pick".
    #[serde(default)]
    pub profile: String,
    #[serde(default = "default_base_ref")]
    pub base_ref: String,
    #[serde(default)]
    pub wait: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl SubmitRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            repo_url: String::new(),
            profile: String::new(),
            base_ref: default_base_ref(),
            wait: false,
            session_id: None,
        }
    }
}

/// `{ success, job?, error? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResponse {
    pub fn ok(job: Job) -> Self {
        Self {
            success: true,
            job: Some(job),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            job: None,
            error: Some(error.into()),
        }
    }
}

/// `{ success, jobs, error? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListResponse {
    pub success: bool,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobListResponse {
    pub fn ok(jobs: Vec<Job>) -> Self {
        Self {
            success: true,
            jobs,
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            jobs: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req: SubmitRequest = serde_json::from_str(r#"{"task": "list files"}"#).unwrap();
        assert_eq!(req, SubmitRequest::new("list files"));
        assert_eq!(req.base_ref, "main");
        assert!(!req.wait);
        assert!(req.session_id.is_none());
    }

    #[test]
    fn error_response_has_no_job_key() {
        let value = serde_json::to_value(JobResponse::err("Job not found: x")).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("job").is_none());
        assert_eq!(value["error"], "Job not found: x");
    }
}

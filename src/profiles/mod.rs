//! Execution profiles.
//!
//! A profile is a directory holding `profile.yml` (agent CLI settings and the
//! auto-PR policy) plus optional `.claude/` and `.mcp.json` files that are
//! overlaid into the job's working directory before the agent starts.

pub mod args;
pub mod loader;
pub mod materialize;
pub mod model;

use std::path::Path;

use async_trait::async_trait;

use crate::error::ProfileError;

pub use args::build_cli_args;
pub use loader::DirProfileResolver;
pub use materialize::materialize_overlays;
pub use model::{AgentSettings, Profile};

/// Looks up profiles by name and installs their files into a working tree.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// The resolved profile (with inheritance applied), if it exists.
    async fn resolve(&self, name: &str) -> Option<Profile>;

    /// Overlay the profile's auxiliary files into `working_dir`.
    async fn materialize(&self, profile: &Profile, working_dir: &Path) -> Result<(), ProfileError>;

    /// Every known profile, sorted by name.
    async fn list(&self) -> Vec<Profile>;
}

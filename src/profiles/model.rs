//! Profile types and the layered merge used for `extends`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "sonnet";
pub const DEFAULT_MAX_TURNS: u32 = 80;
pub const DEFAULT_PERMISSION_MODE: &str = "bypassPermissions";
pub const DEFAULT_OUTPUT_FORMAT: &str = "json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Agent CLI settings after all layers have been merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSettings {
    pub model: String,
    pub max_turns: u32,
    pub permission_mode: String,
    pub no_session_persistence: bool,
    pub output_format: String,
    pub worktree: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    /// Seconds the agent subprocess may run.
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            permission_mode: DEFAULT_PERMISSION_MODE.to_string(),
            no_session_persistence: true,
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            worktree: true,
            effort: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            max_budget_usd: None,
            fallback_model: None,
        }
    }
}

/// The `claude:` block of a `profile.yml`, every key optional.
///
/// A key that is present wins over the same key from any parent, even when
/// it equals the built-in default. Unrecognised keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentLayer {
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub permission_mode: Option<String>,
    pub no_session_persistence: Option<bool>,
    pub output_format: Option<String>,
    pub worktree: Option<bool>,
    pub effort: Option<String>,
    pub timeout: Option<u64>,
    pub max_budget_usd: Option<f64>,
    pub fallback_model: Option<String>,
}

impl AgentLayer {
    /// `self` on top of `base`.
    pub fn over(self, base: AgentLayer) -> AgentLayer {
        AgentLayer {
            model: self.model.or(base.model),
            max_turns: self.max_turns.or(base.max_turns),
            permission_mode: self.permission_mode.or(base.permission_mode),
            no_session_persistence: self.no_session_persistence.or(base.no_session_persistence),
            output_format: self.output_format.or(base.output_format),
            worktree: self.worktree.or(base.worktree),
            effort: self.effort.or(base.effort),
            timeout: self.timeout.or(base.timeout),
            max_budget_usd: self.max_budget_usd.or(base.max_budget_usd),
            fallback_model: self.fallback_model.or(base.fallback_model),
        }
    }

    /// Fill unset keys from the defaults.
    pub fn resolve(self) -> AgentSettings {
        let d = AgentSettings::default();
        AgentSettings {
            model: self.model.unwrap_or(d.model),
            max_turns: self.max_turns.unwrap_or(d.max_turns),
            permission_mode: self.permission_mode.unwrap_or(d.permission_mode),
            no_session_persistence: self.no_session_persistence.unwrap_or(d.no_session_persistence),
            output_format: self.output_format.unwrap_or(d.output_format),
            worktree: self.worktree.unwrap_or(d.worktree),
            effort: self.effort,
            timeout: self.timeout.unwrap_or(d.timeout),
            max_budget_usd: self.max_budget_usd,
            fallback_model: self.fallback_model,
        }
    }
}

/// Raw contents of one `profile.yml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileLayer {
    pub name: Option<String>,
    pub description: Option<String>,
    pub extends: Option<String>,
    pub auto_pr: Option<bool>,
    #[serde(default)]
    pub claude: AgentLayer,
}

impl ProfileLayer {
    /// `self` on top of `base`. Identity fields (`name`, `extends`) stay with `self`.
    pub fn over(self, base: ProfileLayer) -> ProfileLayer {
        ProfileLayer {
            name: self.name,
            extends: self.extends,
            description: self.description.filter(|d| !d.is_empty()).or(base.description),
            auto_pr: self.auto_pr.or(base.auto_pr),
            claude: self.claude.over(base.claude),
        }
    }
}

/// A fully resolved profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    pub auto_pr: bool,
    pub claude: AgentSettings,
    /// Directories whose `.claude/` and `.mcp.json` are overlaid into the
    /// working directory, base first and this profile last.
    #[serde(skip)]
    pub overlay_dirs: Vec<PathBuf>,
}

impl Profile {
    /// A profile with defaults and no overlay files.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            extends: None,
            auto_pr: true,
            claude: AgentSettings::default(),
            overlay_dirs: Vec::new(),
        }
    }

    pub(crate) fn from_layer(name: String, layer: ProfileLayer, overlay_dirs: Vec<PathBuf>) -> Self {
        Self {
            name,
            description: layer.description.unwrap_or_default(),
            extends: layer.extends,
            auto_pr: layer.auto_pr.unwrap_or(true),
            claude: layer.claude.resolve(),
            overlay_dirs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(yaml: &str) -> ProfileLayer {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn empty_layer_resolves_to_defaults() {
        let p = Profile::from_layer("code".into(), layer("{}"), vec![]);
        assert_eq!(p.claude, AgentSettings::default());
        assert!(p.auto_pr);
        assert_eq!(p.claude.timeout, 3600);
        assert_eq!(p.claude.permission_mode, "bypassPermissions");
    }

    #[test]
    fn child_overrides_parent_per_key() {
        let parent = layer(
            "description: base\nauto_pr: false\nclaude:\n  model: opus\n  max_turns: 10\n  effort: high\n",
        );
        let child = layer("extends: base\nclaude:\n  max_turns: 5\n");
        let merged = child.over(parent);
        let p = Profile::from_layer("child".into(), merged, vec![]);
        assert_eq!(p.claude.model, "opus");
        assert_eq!(p.claude.max_turns, 5);
        assert_eq!(p.claude.effort.as_deref(), Some("high"));
        assert_eq!(p.description, "base");
        assert!(!p.auto_pr);
        assert_eq!(p.extends.as_deref(), Some("base"));
    }

    #[test]
    fn explicit_default_value_still_overrides_parent() {
        let parent = layer("claude:\n  model: opus\n  worktree: false\n");
        let child = layer("claude:\n  model: sonnet\n  worktree: true\n");
        let settings = child.claude.over(parent.claude).resolve();
        assert_eq!(settings.model, "sonnet");
        assert!(settings.worktree);
    }

    #[test]
    fn unknown_keys_do_not_drop_the_profile() {
        let parsed = layer("append_prompt: legacy\nclaude:\n  modle: opus\n  max_turns: 9\n");
        assert_eq!(parsed.claude.max_turns, Some(9));
        assert!(parsed.claude.model.is_none());
    }
}

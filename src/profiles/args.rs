//! Agent CLI flags derived from a profile.

use crate::profiles::model::AgentSettings;

/// Permission mode that maps to the skip-permissions switch instead of
/// `--permission-mode`.
pub const SKIP_PERMISSIONS_MODE: &str = "dangerously-skip-permissions";

/// Flags for `settings`, in a stable order.
pub fn build_cli_args(settings: &AgentSettings) -> Vec<String> {
    let mut args = Vec::new();

    if settings.worktree {
        args.push("--worktree".to_string());
    }
    args.extend(["--model".to_string(), settings.model.clone()]);
    args.extend(["--max-turns".to_string(), settings.max_turns.to_string()]);
    args.extend(["--output-format".to_string(), settings.output_format.clone()]);

    if settings.permission_mode == SKIP_PERMISSIONS_MODE {
        args.push("--dangerously-skip-permissions".to_string());
    } else if !settings.permission_mode.is_empty() {
        args.extend(["--permission-mode".to_string(), settings.permission_mode.clone()]);
    }

    if settings.no_session_persistence {
        args.push("--no-session-persistence".to_string());
    }
    if let Some(effort) = settings.effort.as_deref().filter(|e| !e.is_empty()) {
        args.extend(["--effort".to_string(), effort.to_string()]);
    }
    if let Some(budget) = settings.max_budget_usd {
        args.extend(["--max-budget-usd".to_string(), budget.to_string()]);
    }
    if let Some(model) = settings.fallback_model.as_deref().filter(|m| !m.is_empty()) {
        args.extend(["--fallback-model".to_string(), model.to_string()]);
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags() {
        let args = build_cli_args(&AgentSettings::default());
        assert_eq!(
            args,
            vec![
                "--worktree",
                "--model",
                "sonnet",
                "--max-turns",
                "80",
                "--output-format",
                "json",
                "--permission-mode",
                "bypassPermissions",
                "--no-session-persistence",
            ]
        );
    }

    #[test]
    fn optional_flags() {
        let settings = AgentSettings {
            worktree: false,
            no_session_persistence: false,
            permission_mode: SKIP_PERMISSIONS_MODE.into(),
            effort: Some("high".into()),
            max_budget_usd: Some(2.5),
            fallback_model: Some("haiku".into()),
            ..Default::default()
        };
        let args = build_cli_args(&settings);
        assert!(!args.contains(&"--worktree".to_string()));
        assert!(!args.contains(&"--no-session-persistence".to_string()));
        assert!(!args.contains(&"--permission-mode".to_string()));
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
        let joined = args.join(" ");
        assert!(joined.contains("--effort high"));
        assert!(joined.contains("--max-budget-usd 2.5"));
        assert!(joined.contains("--fallback-model haiku"));
    }

    #[test]
    fn empty_permission_mode_emits_nothing() {
        let settings = AgentSettings {
            permission_mode: String::new(),
            ..Default::default()
        };
        let args = build_cli_args(&settings);
        assert!(!args.iter().any(|a| a.contains("permission")));
    }
}

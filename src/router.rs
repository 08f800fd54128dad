//! Picks the profile for a submission.

use crate::profiles::ProfileResolver;

/// An explicitly requested profile that exists wins; anything else (empty or
/// unknown) falls back to `default_profile`.
pub async fn route(resolver: &dyn ProfileResolver, requested: &str, default_profile: &str) -> String {
    let requested = requested.trim();
    if !requested.is_empty() {
        if resolver.resolve(requested).await.is_some() {
            return requested.to_string();
        }
        tracing::info!(
            requested = %requested,
            fallback = %default_profile,
            "Requested profile not found, using default"
        );
    }
    default_profile.to_string()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ProfileError;
    use crate::profiles::Profile;

    struct Known(&'static [&'static str]);

    #[async_trait]
    impl ProfileResolver for Known {
        async fn resolve(&self, name: &str) -> Option<Profile> {
            self.0.iter().any(|n| *n == name).then(|| Profile::named(name))
        }

        async fn materialize(&self, _: &Profile, _: &Path) -> Result<(), ProfileError> {
            Ok(())
        }

        async fn list(&self) -> Vec<Profile> {
            self.0.iter().map(|n| Profile::named(*n)).collect()
        }
    }

    #[tokio::test]
    async fn explicit_existing_profile() {
        assert_eq!(route(&Known(&["code", "review"]), "review", "code").await, "review");
    }

    #[tokio::test]
    async fn unknown_profile_falls_back() {
        assert_eq!(route(&Known(&["code"]), "ghost", "code").await, "code");
    }

    #[tokio::test]
    async fn empty_profile_uses_default() {
        assert_eq!(route(&Known(&[]), "", "code").await, "code");
        assert_eq!(route(&Known(&[]), "  ", "code").await, "code");
    }
}

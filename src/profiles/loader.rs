//! Directory-based profiles: `<dir>/<name>/profile.yml`.
//!
//! Directories are searched in order and a later directory overrides an
//! earlier one for the same profile name. Built-in profiles sit beneath every
//! search directory.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ProfileError;
use crate::profiles::materialize::materialize_overlays;
use crate::profiles::model::{Profile, ProfileLayer};
use crate::profiles::ProfileResolver;

pub const PROFILE_FILE: &str = "profile.yml";

/// Profiles compiled into the binary: `(name, profile.yml)`.
const BUILTIN_PROFILES: &[(&str, &str)] = &[(
    "code",
    include_str!("../../defaults/profiles/code/profile.yml"),
)];

/// A profile before `extends` is resolved.
#[derive(Debug, Clone)]
struct RawProfile {
    /// `None` for built-ins, which have no overlay files.
    dir: Option<PathBuf>,
    layer: ProfileLayer,
}

/// Resolves profiles from a list of search directories.
#[derive(Debug, Clone)]
pub struct DirProfileResolver {
    dirs: Vec<PathBuf>,
    /// Applied beneath every profile chain.
    base: ProfileLayer,
}

impl DirProfileResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            base: ProfileLayer::default(),
        }
    }

    /// Agent timeout for profiles that do not set one.
    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.base.claude.timeout = Some(secs);
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Load and resolve every profile. Broken profile files are skipped with
    /// a warning.
    pub fn load_all(&self) -> BTreeMap<String, Profile> {
        let raw = load_raw(&self.dirs);
        raw.keys()
            .map(|name| (name.clone(), resolve_chain(name, &raw, &self.base)))
            .collect()
    }

    /// Load a single resolved profile by name.
    pub fn load(&self, name: &str) -> Option<Profile> {
        let raw = load_raw(&self.dirs);
        raw.contains_key(name)
            .then(|| resolve_chain(name, &raw, &self.base))
    }
}

#[async_trait]
impl ProfileResolver for DirProfileResolver {
    async fn resolve(&self, name: &str) -> Option<Profile> {
        let this = self.clone();
        let name = name.to_string();
        match tokio::task::spawn_blocking(move || this.load(&name)).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!("Profile loading task failed: {}", e);
                None
            }
        }
    }

    async fn materialize(&self, profile: &Profile, working_dir: &Path) -> Result<(), ProfileError> {
        let dirs = profile.overlay_dirs.clone();
        let target = working_dir.to_path_buf();
        tokio::task::spawn_blocking(move || materialize_overlays(&dirs, &target).map(|_| ()))
            .await
            .map_err(|e| ProfileError::Materialize {
                path: working_dir.to_path_buf(),
                source: std::io::Error::other(e),
            })?
    }

    async fn list(&self) -> Vec<Profile> {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.load_all()).await {
            Ok(all) => all.into_values().collect(),
            Err(e) => {
                tracing::error!("Profile loading task failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn read_layer(path: &Path) -> Result<ProfileLayer, ProfileError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProfileError::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if content.trim().is_empty() {
        return Ok(ProfileLayer::default());
    }
    serde_yaml::from_str(&content).map_err(|e| ProfileError::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn load_builtins(profiles: &mut BTreeMap<String, RawProfile>) {
    for (name, yaml) in BUILTIN_PROFILES {
        match serde_yaml::from_str::<ProfileLayer>(yaml) {
            Ok(layer) => {
                profiles.insert(name.to_string(), RawProfile { dir: None, layer });
            }
            Err(e) => tracing::error!(profile = %name, "Built-in profile is invalid: {}", e),
        }
    }
}

fn load_raw(dirs: &[PathBuf]) -> BTreeMap<String, RawProfile> {
    let mut profiles = BTreeMap::new();
    load_builtins(&mut profiles);
    for base in dirs {
        let Ok(entries) = std::fs::read_dir(base) else {
            continue;
        };
        let mut children: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.join(PROFILE_FILE).is_file())
            .collect();
        children.sort();

        for dir in children {
            match read_layer(&dir.join(PROFILE_FILE)) {
                Ok(layer) => {
                    let name = layer.name.clone().unwrap_or_else(|| {
                        dir.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default()
                    });
                    tracing::debug!(profile = %name, dir = %dir.display(), "Loaded profile");
                    profiles.insert(name, RawProfile { dir: Some(dir), layer });
                }
                Err(e) => tracing::warn!("Skipping profile: {}", e),
            }
        }
    }
    profiles
}

/// Merge `name` with its `extends` ancestors. Unknown parents and cycles end
/// the chain.
fn resolve_chain(name: &str, raw: &BTreeMap<String, RawProfile>, base: &ProfileLayer) -> Profile {
    let mut chain: Vec<&RawProfile> = Vec::new();
    let mut seen = HashSet::new();
    let mut current = name;
    while let Some(profile) = raw.get(current) {
        seen.insert(current);
        chain.push(profile);
        match profile.layer.extends.as_deref() {
            Some(parent) if seen.contains(parent) => {
                tracing::warn!(profile = %current, parent = %parent, "Profile inheritance cycle");
                break;
            }
            Some(parent) if !raw.contains_key(parent) => {
                tracing::warn!(profile = %current, parent = %parent, "Profile extends unknown profile");
                break;
            }
            Some(parent) => current = parent,
            None => break,
        }
    }

    // chain is child-first; fold from the base up.
    let mut merged = base.clone();
    let mut overlay_dirs = Vec::with_capacity(chain.len());
    for profile in chain.iter().rev() {
        merged = profile.layer.clone().over(merged);
        overlay_dirs.extend(profile.dir.clone());
    }
    Profile::from_layer(name.to_string(), merged, overlay_dirs)
}

//! Overlay a profile's `.claude/` directory and `.mcp.json` into a working
//! directory.
//!
//! Files are written in place. A failure part-way through leaves whatever
//! was already copied.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::ProfileError;

pub const CLAUDE_DIR: &str = ".claude";
pub const MCP_FILE: &str = ".mcp.json";
const MCP_SERVERS: &str = "mcpServers";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProfileError + '_ {
    move |source| ProfileError::Materialize {
        path: path.to_path_buf(),
        source,
    }
}

/// Apply each overlay directory in order (base first). Returns the paths that
/// were created or modified.
pub fn materialize_overlays(overlay_dirs: &[PathBuf], working_dir: &Path) -> Result<Vec<PathBuf>, ProfileError> {
    let mut touched = Vec::new();
    for dir in overlay_dirs {
        let src_claude = dir.join(CLAUDE_DIR);
        if src_claude.is_dir() {
            let dst = working_dir.join(CLAUDE_DIR);
            copy_dir_recursive(&src_claude, &dst)?;
            if !touched.contains(&dst) {
                touched.push(dst);
            }
        }

        let src_mcp = dir.join(MCP_FILE);
        if src_mcp.is_file() {
            let dst = working_dir.join(MCP_FILE);
            merge_mcp_json(&src_mcp, &dst)?;
            if !touched.contains(&dst) {
                touched.push(dst);
            }
        }
    }
    tracing::debug!(dir = %working_dir.display(), files = touched.len(), "Materialized profile");
    Ok(touched)
}

/// Copy `src` into `dst`, overwriting files that already exist.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), ProfileError> {
    std::fs::create_dir_all(dst).map_err(io_err(dst))?;
    for entry in std::fs::read_dir(src).map_err(io_err(src))? {
        let entry = entry.map_err(io_err(src))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(io_err(&from))?;
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(io_err(&to))?;
        }
    }
    Ok(())
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>, ProfileError> {
    let content = std::fs::read_to_string(path).map_err(io_err(path))?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProfileError::McpJson {
            path: path.to_path_buf(),
            reason: "expected a JSON object".into(),
        }),
        Err(e) => Err(ProfileError::McpJson {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Copy `src` to `dst`, or merge its `mcpServers` into an existing `dst`
/// (incoming servers replace same-named ones).
fn merge_mcp_json(src: &Path, dst: &Path) -> Result<(), ProfileError> {
    if !dst.exists() {
        std::fs::copy(src, dst).map_err(io_err(dst))?;
        return Ok(());
    }

    let mut existing = read_json_object(dst)?;
    let incoming = read_json_object(src)?;

    let servers = existing
        .entry(MCP_SERVERS)
        .or_insert_with(|| Value::Object(Map::new()));
    if !servers.is_object() {
        *servers = Value::Object(Map::new());
    }
    if let (Value::Object(servers), Some(Value::Object(new_servers))) = (servers, incoming.get(MCP_SERVERS)) {
        for (name, server) in new_servers {
            servers.insert(name.clone(), server.clone());
        }
    }

    let json = serde_json::to_string_pretty(&Value::Object(existing)).map_err(|e| ProfileError::McpJson {
        path: dst.to_path_buf(),
        reason: e.to_string(),
    })?;
    std::fs::write(dst, json).map_err(io_err(dst))
}

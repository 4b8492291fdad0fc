//! Ambient configuration: where saved workflows, registry metadata, and
//! `settings.json` live on disk, and the allow/deny glob filters a
//! workflow author can use to restrict which node types are reachable
//! from `settings.json`.

use crate::error::InfraError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Resolves `PFLOW_HOME`: the `PFLOW_HOME` env var if set, else
/// `~/.pflow` via [`dirs::home_dir`].
pub fn pflow_home() -> PathBuf {
    if let Ok(custom) = std::env::var("PFLOW_HOME") {
        return PathBuf::from(custom);
    }
    dirs::home_dir()
        .map(|home| home.join(".pflow"))
        .unwrap_or_else(|| PathBuf::from(".pflow"))
}

pub fn workflows_dir() -> PathBuf {
    pflow_home().join("workflows")
}

pub fn registry_file() -> PathBuf {
    pflow_home().join("registry.json")
}

pub fn settings_file() -> PathBuf {
    pflow_home().join("settings.json")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFilter {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default)]
    pub nodes: RegistryFilter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub registry: NodeSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| InfraError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Whether `node_type` is reachable given `registry.nodes.{allow,deny}`:
    /// an empty allow list means "everything is allowed" (subject to deny);
    /// a non-empty allow list means only matching types pass, and deny
    /// always wins over allow.
    pub fn node_type_allowed(&self, node_type: &str) -> bool {
        let filter = &self.registry.nodes;
        let denied = filter
            .deny
            .iter()
            .any(|pattern| glob_match(pattern, node_type));
        if denied {
            return false;
        }
        if filter.allow.is_empty() {
            return true;
        }
        filter.allow.iter().any(|pattern| glob_match(pattern, node_type))
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(candidate))
        .unwrap_or(false)
}

/// Reads a saved workflow's raw IR JSON from `PFLOW_HOME/workflows/<name>.json`.
pub fn read_workflow(name: &str) -> Result<String, InfraError> {
    let path = workflows_dir().join(format!("{name}.json"));
    std::fs::read_to_string(&path).map_err(|source| InfraError::ReadFile {
        path: path.display().to_string(),
        source,
    })
}

/// Saves a workflow's raw IR JSON to `PFLOW_HOME/workflows/<name>.json`,
/// creating the directory if needed.
pub fn write_workflow(name: &str, ir_json: &str) -> Result<(), InfraError> {
    let dir = workflows_dir();
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(format!("{name}.json")), ir_json)?;
    Ok(())
}

/// Lists saved workflow names (file stem, without `.json`), sorted, for
/// `pflow --list`.
pub fn list_workflows() -> Result<Vec<String>, InfraError> {
    let dir = workflows_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_everything_not_denied() {
        let mut settings = Settings::default();
        settings.registry.nodes.deny = vec!["mcp-*".to_string()];
        assert!(settings.node_type_allowed("shell"));
        assert!(!settings.node_type_allowed("mcp-filesystem-read"));
    }

    #[test]
    fn nonempty_allow_list_restricts() {
        let mut settings = Settings::default();
        settings.registry.nodes.allow = vec!["shell".to_string(), "http-*".to_string()];
        assert!(settings.node_type_allowed("shell"));
        assert!(settings.node_type_allowed("http-get"));
        assert!(!settings.node_type_allowed("switch"));
    }

    #[test]
    fn deny_wins_over_allow() {
        let mut settings = Settings::default();
        settings.registry.nodes.allow = vec!["shell".to_string()];
        settings.registry.nodes.deny = vec!["shell".to_string()];
        assert!(!settings.node_type_allowed("shell"));
    }
}

//! Remote host descriptions and the host registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Host id that is always present and describes the current machine.
pub const LOCAL_HOST_ID: &str = "local";

/// Declared resources of a named execution host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub id: String,
    pub cores_per_node: u32,
    /// Number of nodes a single job may request.
    #[serde(default = "default_nodes")]
    pub nodes: u32,
    /// Root directory on the host under which job directories are created.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

fn default_nodes() -> u32 {
    1
}

impl HostSpec {
    /// Describe the machine this process runs on.
    pub fn local() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        Self {
            id: LOCAL_HOST_ID.to_string(),
            cores_per_node: cores,
            nodes: 1,
            root: None,
        }
    }

    /// Saturates at `u32::MAX`; registry hosts never get that far.
    pub fn total_cores(&self) -> u32 {
        self.cores_per_node.saturating_mul(self.nodes)
    }
}

/// Lookup table of known hosts, keyed by id.
#[derive(Debug, Clone)]
pub struct HostRegistry {
    hosts: BTreeMap<String, HostSpec>,
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl HostRegistry {
    /// Build a registry from explicit host specs. The local host is added
    /// unless one of the specs already claims its id.
    pub fn new(specs: Vec<HostSpec>) -> Self {
        let mut hosts: BTreeMap<String, HostSpec> =
            specs.into_iter().map(|h| (h.id.clone(), h)).collect();
        hosts
            .entry(LOCAL_HOST_ID.to_string())
            .or_insert_with(HostSpec::local);
        Self { hosts }
    }

    /// Load a JSON array of host specs. A missing file yields a registry
    /// that only knows the local host.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            tracing::debug!(
                path = %path.display(),
                "Host registry not found, using local host only",
            );
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let specs: Vec<HostSpec> = serde_json::from_str(&text)?;
        for spec in &specs {
            validate_host(spec)?;
        }
        tracing::info!(count = specs.len(), path = %path.display(), "Loaded host registry");
        Ok(Self::new(specs))
    }

    pub fn get(&self, id: &str) -> Result<&HostSpec, CoreError> {
        self.hosts
            .get(id)
            .ok_or_else(|| CoreError::Configuration(format!("Unknown host \"{id}\"")))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }
}

fn validate_host(spec: &HostSpec) -> Result<(), CoreError> {
    if spec.id.is_empty() {
        return Err(CoreError::Configuration("Host id must not be empty".to_string()));
    }
    if spec.cores_per_node == 0 || spec.nodes == 0 {
        return Err(CoreError::Configuration(format!(
            "Host \"{}\" must declare at least one node and one core per node",
            spec.id
        )));
    }
    if spec.cores_per_node.checked_mul(spec.nodes).is_none() {
        return Err(CoreError::Configuration(format!(
            "Host \"{}\" declares more than {} cores in total",
            spec.id,
            u32::MAX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn local_host_always_present() {
        let registry = HostRegistry::default();
        let local = registry.get(LOCAL_HOST_ID).unwrap();
        assert!(local.cores_per_node >= 1);
    }

    #[test]
    fn unknown_host_is_a_configuration_error() {
        let registry = HostRegistry::default();
        assert_matches!(
            registry.get("nowhere"),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn load_reads_json_specs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.json");
        std::fs::write(
            &path,
            r#"[{"id": "cluster", "cores_per_node": 16, "nodes": 4}]"#,
        )
        .unwrap();

        let registry = HostRegistry::load(&path).unwrap();
        let host = registry.get("cluster").unwrap();
        assert_eq!(host.total_cores(), 64);
        assert!(host.root.is_none());
        assert!(registry.get(LOCAL_HOST_ID).is_ok());
    }

    #[test]
    fn load_rejects_zero_cores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.json");
        std::fs::write(&path, r#"[{"id": "broken", "cores_per_node": 0}]"#).unwrap();

        assert_matches!(
            HostRegistry::load(&path),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn load_rejects_core_totals_beyond_u32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.json");
        std::fs::write(
            &path,
            r#"[{"id": "huge", "cores_per_node": 65536, "nodes": 65536}]"#,
        )
        .unwrap();

        assert_matches!(
            HostRegistry::load(&path),
            Err(CoreError::Configuration(reason)) if reason.contains("\"huge\"")
        );
    }

    #[test]
    fn missing_file_falls_back_to_local() {
        let registry = HostRegistry::load(Path::new("/definitely/not/here.json")).unwrap();
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![LOCAL_HOST_ID]);
    }
}

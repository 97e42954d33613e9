//! Policy files: a JSON list of resource descriptors.
//!
//! Either `{"resources": [...]}` or a bare array is accepted.

use anyhow::{Context, Result, bail};
use reconcile::PolicyResource;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct PolicyFile {
    resources: Vec<PolicyResource>,
}

/// Load a policy and reject duplicate resource ids.
pub fn load(path: &Path) -> Result<Vec<PolicyResource>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy: {}", path.display()))?;
    parse(&content).with_context(|| format!("Invalid policy: {}", path.display()))
}

pub fn parse(content: &str) -> Result<Vec<PolicyResource>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let resources: Vec<PolicyResource> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        serde_json::from_value::<PolicyFile>(value)?.resources
    };

    let mut seen = HashSet::new();
    for resource in &resources {
        if resource.id.is_empty() {
            bail!("resource without an id");
        }
        if !seen.insert(resource.id.as_str()) {
            bail!("duplicate resource id {:?}", resource.id);
        }
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APT: &str =
        r#"{"id": "curl", "pkg": {"desired_state": "INSTALLED", "apt": {"name": "curl"}}}"#;

    #[test]
    fn test_parse_wrapped() {
        let resources = parse(&format!(r#"{{"resources": [{APT}]}}"#)).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id, "curl");
        assert!(resources[0].pkg.is_some());
    }

    #[test]
    fn test_parse_bare() {
        let json = format!(
            r#"[{APT}, {{"id": "motd", "file": {{"path": "/etc/motd", "state": "ABSENT"}}}}]"#
        );
        let resources = parse(&json).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1].id, "motd");
    }

    #[test]
    fn test_duplicate_ids() {
        let err = parse(&format!("[{APT}, {APT}]")).unwrap_err();
        assert!(err.to_string().contains("duplicate resource id"));
    }

    #[test]
    fn test_missing_id() {
        assert!(parse(r#"[{"file": {"path": "/x", "state": "ABSENT"}}]"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/policy.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read policy"));
    }
}

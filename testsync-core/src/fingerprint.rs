//! Project fingerprinting
//!
//! Derives a short, stable digest of a project's declared dependency set.
//! The learned-pattern cache is keyed by this digest: if the dependencies
//! have not changed, cached pattern knowledge is still trustworthy.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Number of hex characters kept from the full SHA-256 digest
const FINGERPRINT_LEN: usize = 16;

/// Compute the fingerprint for the project rooted at `root`.
///
/// Dependency names are collected from `package.json` and `Cargo.toml` when
/// present, sorted, deduplicated and hashed. A missing or unreadable
/// manifest contributes nothing; this function never fails.
pub fn project_fingerprint(root: &Path) -> String {
    let mut names = BTreeSet::new();
    collect_package_json(&root.join("package.json"), &mut names);
    collect_cargo_toml(&root.join("Cargo.toml"), &mut names);
    digest_names(&names)
}

fn digest_names(names: &BTreeSet<String>) -> String {
    let joined: String = names
        .iter()
        .map(|n| n.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

fn collect_package_json(path: &Path, names: &mut BTreeSet<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        tracing::debug!(path = %path.display(), "unparseable package.json ignored for fingerprint");
        return;
    };
    for section in ["dependencies", "devDependencies"] {
        if let Some(deps) = value.get(section).and_then(|d| d.as_object()) {
            for name in deps.keys() {
                names.insert(name.clone());
            }
        }
    }
}

fn collect_cargo_toml(path: &Path, names: &mut BTreeSet<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let Ok(value) = content.parse::<toml::Value>() else {
        tracing::debug!(path = %path.display(), "unparseable Cargo.toml ignored for fingerprint");
        return;
    };
    for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
        if let Some(deps) = value.get(section).and_then(|d| d.as_table()) {
            for name in deps.keys() {
                names.insert(name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_fingerprint_is_stable_and_order_independent() {
        let dir_a = tempdir().unwrap();
        fs::write(
            dir_a.path().join("package.json"),
            r#"{"dependencies": {"react": "^18", "axios": "^1"}}"#,
        )
        .unwrap();

        let dir_b = tempdir().unwrap();
        fs::write(
            dir_b.path().join("package.json"),
            r#"{"dependencies": {"axios": "^2", "react": "^17"}}"#,
        )
        .unwrap();

        // Same names in different order with different version specs
        assert_eq!(
            project_fingerprint(dir_a.path()),
            project_fingerprint(dir_b.path())
        );
    }

    #[test]
    fn test_fingerprint_changes_with_dependency_set() {
        let dir_a = tempdir().unwrap();
        fs::write(
            dir_a.path().join("package.json"),
            r#"{"dependencies": {"react": "^18"}}"#,
        )
        .unwrap();

        let dir_b = tempdir().unwrap();
        fs::write(
            dir_b.path().join("package.json"),
            r#"{"dependencies": {"react": "^18", "lodash": "^4"}}"#,
        )
        .unwrap();

        assert_ne!(
            project_fingerprint(dir_a.path()),
            project_fingerprint(dir_b.path())
        );
    }

    #[test]
    fn test_missing_manifests_do_not_fail() {
        let dir = tempdir().unwrap();
        let fp = project_fingerprint(dir.path());
        assert_eq!(fp.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_cargo_toml_dependencies_counted() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"x\"\n\n[dependencies]\nserde = \"1\"\n",
        )
        .unwrap();
        let empty = tempdir().unwrap();
        assert_ne!(
            project_fingerprint(dir.path()),
            project_fingerprint(empty.path())
        );
    }
}

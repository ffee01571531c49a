// crates/nysm-harness/src/spec_bundle.rs
// ============================================================================
// Module: Spec Bundle Loader
// Description: Loads a `{concept, rules[]}` JSON document named by a
//              scenario's `specs[]` entry.
// Purpose: Give the harness a concrete on-disk shape for the concept specs
//          and sync rules a scenario exercises, since spec.md treats the
//          specification source language and its loader as an out-of-scope
//          external collaborator (spec §1) without naming one for the
//          harness itself to read.
// Dependencies: nysm-ir, serde_json
// ============================================================================

//! ## Overview
//! One bundle file corresponds to one concept: its [`nysm_ir::ConceptSpec`]
//! plus the [`nysm_ir::SyncRule`] values that react to its actions. A
//! scenario's `specs[]` lists these files by path, relative to the scenario
//! document itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use nysm_ir::ConceptSpec;
use nysm_ir::SyncRule;
use serde::Deserialize;

use crate::error::HarnessError;

// ============================================================================
// SECTION: Bundle
// ============================================================================

/// One concept spec plus the sync rules declared alongside it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecBundle {
    /// The concept this bundle declares.
    pub concept: ConceptSpec,
    /// Sync rules reacting to this concept's actions.
    #[serde(default)]
    pub rules: Vec<SyncRule>,
}

/// Loads every spec bundle a scenario's `specs[]` entries name, resolving
/// each path against `base_dir`.
///
/// # Errors
///
/// Returns [`HarnessError::InputRejection`] if a file cannot be read or is
/// not a valid `SpecBundle` document.
pub fn load_spec_bundles(base_dir: &Path, specs: &[String]) -> Result<Vec<SpecBundle>, HarnessError> {
    specs.iter().map(|relative_path| load_one(base_dir, relative_path)).collect()
}

/// Loads a single spec bundle.
fn load_one(base_dir: &Path, relative_path: &str) -> Result<SpecBundle, HarnessError> {
    let path = base_dir.join(relative_path);
    let bytes = fs::read(&path).map_err(|err| HarnessError::InputRejection(format!("reading spec bundle {}: {err}", path.display())))?;
    serde_json::from_slice(&bytes).map_err(|err| HarnessError::InputRejection(format!("parsing spec bundle {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn loads_a_concept_with_no_rules() {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(
            br#"{
                "concept": {
                    "name": "Cart",
                    "purpose": "Track a shopping cart's contents.",
                    "state_schema": [],
                    "actions": [
                        {
                            "name": "addItem",
                            "args": [{"name": "item_id", "type": "string"}],
                            "outputs": [{"case": "Added", "fields": []}]
                        }
                    ]
                }
            }"#,
        )
        .expect("write bundle");

        let bundles = load_spec_bundles(Path::new(""), &[file.path().display().to_string()]).expect("bundle loads");
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].concept.name, "Cart");
        assert!(bundles[0].rules.is_empty());
    }

    #[test]
    fn rejects_missing_file() {
        let err = load_spec_bundles(Path::new("/nonexistent"), &["missing.json".to_string()]).unwrap_err();
        assert!(matches!(err, HarnessError::InputRejection(_)));
    }
}

//! Checkpoint discovery and resolution.
//!
//! Discovery lists recognized model files in the engine's checkpoint
//! directory; selection is a pure function over that set so the
//! fallback policy can be tested without filesystem fixtures.

use std::path::Path;

use crate::error::CoreError;

/// File extensions recognized as loadable model checkpoints.
pub const CHECKPOINT_EXTENSIONS: &[&str] = &["safetensors", "ckpt"];

/// The checkpoint name actually used for a generation, after fallback.
///
/// Always a member of the discoverable set at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCheckpoint(String);

impl ResolvedCheckpoint {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn into_name(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ResolvedCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// List checkpoint files in `dir`, filtered to recognized extensions.
///
/// A missing or unreadable directory yields an empty set (the caller
/// then fails resolution with [`CoreError::NoCheckpointsAvailable`])
/// rather than an I/O error, matching the terminal-error contract.
pub fn discover_checkpoints(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to list checkpoint directory");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| has_model_extension(name))
        .collect();
    // Sorted so fallback selection is reproducible across platforms.
    names.sort_unstable();
    names
}

/// True when `name` ends in one of [`CHECKPOINT_EXTENSIONS`].
pub fn has_model_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CHECKPOINT_EXTENSIONS.contains(&ext))
}

/// Resolve the checkpoint to use for a generation.
///
/// - A requested name that is a member of `available` is used unchanged.
/// - Otherwise the lexicographically smallest member is chosen as the
///   fallback.
/// - An empty `available` set fails with
///   [`CoreError::NoCheckpointsAvailable`], which is terminal for the
///   request: no compilation or dispatch may follow.
pub fn select_checkpoint(
    requested: Option<&str>,
    available: &[String],
) -> Result<ResolvedCheckpoint, CoreError> {
    if available.is_empty() {
        return Err(CoreError::NoCheckpointsAvailable);
    }

    if let Some(name) = requested {
        if available.iter().any(|a| a == name) {
            return Ok(ResolvedCheckpoint(name.to_string()));
        }
    }

    let fallback = available
        .iter()
        .min()
        .expect("non-empty set has a minimum")
        .clone();
    if let Some(name) = requested {
        tracing::info!(
            requested = %name,
            fallback = %fallback,
            "Requested checkpoint not available, falling back",
        );
    }
    Ok(ResolvedCheckpoint(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn requested_member_is_identity() {
        let available = set(&["a.safetensors", "b.ckpt"]);
        for name in &available {
            let resolved = select_checkpoint(Some(name), &available).unwrap();
            assert_eq!(resolved.name(), name);
        }
    }

    #[test]
    fn absent_request_falls_back_to_member() {
        let available = set(&["zeta.ckpt", "alpha.safetensors"]);
        let resolved = select_checkpoint(Some("missing.safetensors"), &available).unwrap();
        assert!(available.contains(&resolved.name().to_string()));
        assert_ne!(resolved.name(), "missing.safetensors");
    }

    #[test]
    fn fallback_is_lexicographically_smallest() {
        let available = set(&["zeta.ckpt", "alpha.safetensors", "mid.ckpt"]);
        let resolved = select_checkpoint(None, &available).unwrap();
        assert_eq!(resolved.name(), "alpha.safetensors");
    }

    #[test]
    fn empty_set_fails_regardless_of_request() {
        for requested in [None, Some("anything.ckpt")] {
            let err = select_checkpoint(requested, &[]).unwrap_err();
            assert!(matches!(err, CoreError::NoCheckpointsAvailable));
        }
    }

    #[test]
    fn discovery_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.safetensors", "b.ckpt", "notes.txt", "c.safetensors.bak"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = discover_checkpoints(dir.path());
        assert_eq!(found, set(&["a.safetensors", "b.ckpt"]));
    }

    #[test]
    fn discovery_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(discover_checkpoints(&missing).is_empty());
    }

    #[test]
    fn extension_check_ignores_prefixes() {
        assert!(has_model_extension("model.safetensors"));
        assert!(has_model_extension("model.v2.ckpt"));
        assert!(!has_model_extension("safetensors"));
        assert!(!has_model_extension("model.pt"));
    }
}

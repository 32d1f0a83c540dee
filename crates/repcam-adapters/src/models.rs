//! Location of the backbone checkpoint.

use std::path::{Path, PathBuf};

use tracing::debug;

/// File name of the backbone checkpoint inside `backbone_dir()`.
pub const BACKBONE_FILE: &str = "extractor.safetensors";

/// Returns the backbone directory path.
///
/// Uses `XDG_DATA_HOME/repcam/backbone` or `~/.local/share/repcam/backbone`.
#[must_use]
pub fn backbone_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repcam")
        .join("backbone")
}

/// Default backbone checkpoint path.
#[must_use]
pub fn default_backbone_path() -> PathBuf {
    backbone_dir().join(BACKBONE_FILE)
}

/// The configured backbone, or the default location when none is set.
#[must_use]
pub fn resolve_backbone(configured: Option<&Path>) -> PathBuf {
    let path = configured.map_or_else(default_backbone_path, Path::to_path_buf);
    debug!("Backbone checkpoint: {}", path.display());
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backbone_path() {
        let path = default_backbone_path();
        assert!(path.ends_with("repcam/backbone/extractor.safetensors"));
    }

    #[test]
    fn test_configured_backbone_wins() {
        let path = resolve_backbone(Some(Path::new("/models/bb.safetensors")));
        assert_eq!(path, PathBuf::from("/models/bb.safetensors"));
    }
}

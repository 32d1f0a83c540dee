//! Read-only access to a labelling project's tag document.
//!
//! A project document names the tags annotators may attach to frames and
//! which tags each class uses. Tags are identified by positive integers that
//! are never reused, so `max_tag_index` can exceed the highest live id.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tag section of a project document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Tag id → tag name.
    #[serde(default)]
    pub project_tags: BTreeMap<u32, String>,
    /// Highest tag id ever handed out.
    #[serde(default)]
    pub max_tag_index: u32,
    /// Class label → ids of the tags it uses.
    #[serde(default)]
    pub classes: BTreeMap<String, BTreeSet<u32>>,
}

impl ProjectConfig {
    /// Reads and validates a project document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or is
    /// inconsistent (see [`ProjectConfig::validate`]).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse project {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid project {}", path.display()))?;
        debug!(
            "Loaded project with {} tags and {} classes",
            config.project_tags.len(),
            config.classes.len()
        );
        Ok(config)
    }

    /// Checks that tag ids stay within `max_tag_index` and that classes only
    /// reference existing tags.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        if let Some((&id, name)) = self
            .project_tags
            .iter()
            .find(|(id, _)| **id > self.max_tag_index)
        {
            anyhow::bail!(
                "tag {id} ('{name}') exceeds max_tag_index {}",
                self.max_tag_index
            );
        }
        for (class, tags) in &self.classes {
            if let Some(id) = tags.iter().find(|id| !self.project_tags.contains_key(*id)) {
                anyhow::bail!("class '{class}' references unknown tag {id}");
            }
        }
        Ok(())
    }

    /// Name of tag `id`.
    #[must_use]
    pub fn tag_name(&self, id: u32) -> Option<&str> {
        self.project_tags.get(&id).map(String::as_str)
    }

    /// Tag names used by `class`, in id order.
    #[must_use]
    pub fn tags_of(&self, class: &str) -> Vec<&str> {
        self.classes
            .get(class)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tag_name(*id))
            .collect()
    }

    /// Classes that use tag `id`, in name order.
    #[must_use]
    pub fn classes_with(&self, id: u32) -> Vec<&str> {
        self.classes
            .iter()
            .filter(|(_, tags)| tags.contains(&id))
            .map(|(class, _)| class.as_str())
            .collect()
    }
}

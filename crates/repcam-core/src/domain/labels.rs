//! Label ↔ index mapping of a trained classifier.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use super::LoadError;

/// Bijection between label names and the indices of a probability vector.
///
/// Built once at load time and immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelMap {
    /// Labels ordered by index (`int2label`).
    labels: Vec<String>,
    /// Reverse lookup (`class2int`).
    #[serde(skip)]
    indices: HashMap<String, usize>,
}

impl LabelMap {
    /// Builds a label map from a `label → index` mapping.
    ///
    /// Indices must be exactly `0..n` with no gaps or repeats.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found.
    pub fn from_class2int(class2int: &BTreeMap<String, i64>) -> Result<Self, String> {
        if class2int.is_empty() {
            return Err("no labels defined".to_string());
        }

        let n = class2int.len();
        let mut slots: Vec<Option<String>> = vec![None; n];
        for (label, &raw) in class2int {
            let index = usize::try_from(raw)
                .ok()
                .filter(|i| *i < n)
                .ok_or_else(|| format!("label '{label}' has index {raw}, expected 0..{n}"))?;
            if let Some(existing) = &slots[index] {
                return Err(format!(
                    "labels '{existing}' and '{label}' share index {index}"
                ));
            }
            slots[index] = Some(label.clone());
        }

        let labels: Vec<String> = slots.into_iter().flatten().collect();
        let indices = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Ok(Self { labels, indices })
    }

    /// Builds a label map where label `i` is `names[i]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `names` is empty or contains duplicates.
    pub fn from_ordered<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let class2int = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_ref().to_string(), i64::try_from(i).unwrap_or(i64::MAX)))
            .collect::<BTreeMap<_, _>>();
        if class2int.len() != names.len() {
            return Err("duplicate label names".to_string());
        }
        Self::from_class2int(&class2int)
    }

    /// Loads a `label2int.json` file.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Missing` if the file is absent, `LoadError::Io` if it
    /// cannot be read and `LoadError::Labels` if it is not a dense JSON mapping
    /// from strings to integers.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        debug!("Loading label metadata from {}", path.display());

        if !path.exists() {
            return Err(LoadError::Missing {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let class2int: BTreeMap<String, i64> =
            serde_json::from_str(&content).map_err(|e| LoadError::Labels {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Self::from_class2int(&class2int).map_err(|reason| LoadError::Labels {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a successfully built map.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Index of a label name.
    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.indices.get(label).copied()
    }

    /// Label name at an index.
    #[must_use]
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Iterates `(index, label)` in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().map(String::as_str).enumerate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn map(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_inverse_mapping() {
        let labels =
            LabelMap::from_class2int(&map(&[("squat_up", 1), ("idle", 0), ("squat_down", 2)]))
                .unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.label(0), Some("idle"));
        assert_eq!(labels.label(2), Some("squat_down"));
        assert_eq!(labels.index_of("squat_up"), Some(1));
        assert_eq!(labels.index_of("missing"), None);
    }

    #[test]
    fn test_rejects_gaps_and_repeats() {
        assert!(LabelMap::from_class2int(&map(&[("a", 0), ("b", 2)])).is_err());
        assert!(LabelMap::from_class2int(&map(&[("a", 0), ("b", 0)])).is_err());
        assert!(LabelMap::from_class2int(&map(&[("a", -1)])).is_err());
        assert!(LabelMap::from_class2int(&BTreeMap::new()).is_err());
    }

    #[test]
    fn test_from_ordered_rejects_duplicates() {
        assert!(LabelMap::from_ordered(&["a", "a"]).is_err());
        let labels = LabelMap::from_ordered(&["a", "b"]).unwrap();
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec![(0, "a"), (1, "b")]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = LabelMap::load("/nonexistent/label2int.json").unwrap_err();
        assert!(matches!(err, LoadError::Missing { .. }));
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"a": "zero"}"#).unwrap();
        let err = LabelMap::load(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Labels { .. }));
    }

    #[test]
    fn test_load_valid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"background": 0, "jump": 1}"#).unwrap();
        let labels = LabelMap::load(file.path()).unwrap();
        assert_eq!(labels.label(1), Some("jump"));
    }
}

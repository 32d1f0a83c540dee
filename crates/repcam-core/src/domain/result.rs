//! Per-frame inference and postprocessing results.

use serde::{Serialize, Serializer};

/// Categorical distribution over the label set, indexed like the `LabelMap`.
pub type ProbabilityVector = Vec<f32>;

/// A label with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelScore {
    /// Label name.
    pub label: String,
    /// Label index.
    pub index: usize,
    /// Smoothed probability.
    pub score: f32,
}

/// Aggregate produced by the postprocessor chain for one frame.
///
/// Rebuilt every frame; only the counters keep state between frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    /// Capture index of the frame this result belongs to.
    pub frame_index: u64,
    /// Raw classifier output.
    pub probabilities: ProbabilityVector,
    /// Rolling mean of recent probability vectors, once a smoother ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothed: Option<ProbabilityVector>,
    /// Highest-scoring labels of the smoothed vector.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub top_k: Vec<LabelScore>,
    /// Counter output key → current repetition count.
    pub counts: Counts,
}

impl RunResult {
    /// Starts an empty result for a frame.
    #[must_use]
    pub fn new(frame_index: u64, probabilities: ProbabilityVector) -> Self {
        Self {
            frame_index,
            probabilities,
            ..Self::default()
        }
    }

    /// Best label of the frame, if a smoother ranked them.
    #[must_use]
    pub fn top_label(&self) -> Option<&LabelScore> {
        self.top_k.first()
    }

    /// Count written under `key`, if any counter writes it.
    #[must_use]
    pub fn count(&self, key: &str) -> Option<u32> {
        self.counts.get(key)
    }
}

/// Repetition counts keyed by counter output key, in the order the counters run.
///
/// Serializes as a JSON object with keys in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counts(Vec<(String, u32)>);

impl Counts {
    /// Sets the count under `key`, keeping the position of an existing key.
    pub fn set(&mut self, key: &str, count: u32) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = count,
            None => self.0.push((key.to_string(), count)),
        }
    }

    /// Count under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u32> {
        self.0.iter().find(|(k, _)| k == key).map(|&(_, c)| c)
    }

    /// `(key, count)` pairs in counter order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, c)| (k.as_str(), *c))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Counts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_keep_counter_order() {
        let mut counts = Counts::default();
        counts.set("squats", 1);
        counts.set("jumps", 4);
        counts.set("squats", 2);

        assert_eq!(counts.iter().collect::<Vec<_>>(), vec![("squats", 2), ("jumps", 4)]);
        assert_eq!(counts.get("jumps"), Some(4));
        assert_eq!(counts.get("lunges"), None);
        assert_eq!(
            serde_json::to_string(&counts).unwrap(),
            r#"{"squats":2,"jumps":4}"#
        );
    }
}

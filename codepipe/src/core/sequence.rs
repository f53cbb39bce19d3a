//! The fixed, totally ordered sequence of stage names.
//!
//! The order is declared once here. Stages additionally encode it through
//! their own predecessor checks, so the two must agree.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The stage names of the code-generation pipeline, in execution order.
pub const DEFAULT_STAGES: [&str; 5] = [
    "requirements_gathering",
    "knowledge_gathering",
    "implementation_planning",
    "implementation_writing",
    "review",
];

/// An ordered list of unique stage names.
///
/// Cheap to clone; the names are shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StageSequence {
    stages: Arc<[String]>,
}

impl Default for StageSequence {
    fn default() -> Self {
        Self::new(DEFAULT_STAGES)
    }
}

impl From<Vec<String>> for StageSequence {
    fn from(stages: Vec<String>) -> Self {
        Self::new(stages)
    }
}

impl From<StageSequence> for Vec<String> {
    fn from(sequence: StageSequence) -> Self {
        sequence.stages.to_vec()
    }
}

impl StageSequence {
    /// Creates a sequence from stage names. Later duplicates are dropped.
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for stage in stages {
            let stage = stage.into();
            if !unique.contains(&stage) {
                unique.push(stage);
            }
        }
        Self {
            stages: unique.into(),
        }
    }

    /// All stage names in order.
    #[must_use]
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the sequence has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns true if `name` is a member of the sequence.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Zero-based index of `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == name)
    }

    /// The stage at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.stages.get(index).map(String::as_str)
    }

    /// The first stage, where every new pipeline state starts.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.get(0)
    }

    /// The terminal stage.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.stages.last().map(String::as_str)
    }

    /// Returns true if `name` is the terminal stage.
    #[must_use]
    pub fn is_last(&self, name: &str) -> bool {
        self.last() == Some(name)
    }

    /// The stage after `name`; `None` for the terminal stage or an unknown name.
    #[must_use]
    pub fn next_after(&self, name: &str) -> Option<&str> {
        self.position(name).and_then(|idx| self.get(idx + 1))
    }

    /// The stage before `name`; `None` for the first stage or an unknown name.
    #[must_use]
    pub fn previous_of(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|idx| idx.checked_sub(1))
            .and_then(|idx| self.get(idx))
    }

    /// The stages strictly before `name`.
    #[must_use]
    pub fn prefix_before(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(idx) => &self.stages[..idx],
            None => &[],
        }
    }

    /// Returns true if the pipeline may move from `current` to `next`.
    ///
    /// Both names must be members; `next` must be `current` itself or its
    /// immediate successor. Rollback is a separate operation and is never
    /// accepted here.
    #[must_use]
    pub fn is_valid_transition(&self, current: &str, next: &str) -> bool {
        match (self.position(current), self.position(next)) {
            (Some(current_idx), Some(next_idx)) => {
                next_idx == current_idx || next_idx == current_idx + 1
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_sequence() {
        let seq = StageSequence::default();
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.first(), Some("requirements_gathering"));
        assert_eq!(seq.last(), Some("review"));
        assert!(seq.is_last("review"));
    }

    #[test]
    fn test_neighbours() {
        let seq = StageSequence::default();
        assert_eq!(seq.next_after("requirements_gathering"), Some("knowledge_gathering"));
        assert_eq!(seq.next_after("review"), None);
        assert_eq!(seq.previous_of("requirements_gathering"), None);
        assert_eq!(seq.previous_of("review"), Some("implementation_writing"));
        assert_eq!(seq.next_after("deploy"), None);
    }

    #[test]
    fn test_prefix_before() {
        let seq = StageSequence::default();
        assert_eq!(
            seq.prefix_before("implementation_planning"),
            &["requirements_gathering".to_string(), "knowledge_gathering".to_string()]
        );
        assert!(seq.prefix_before("requirements_gathering").is_empty());
        assert!(seq.prefix_before("unknown").is_empty());
    }

    #[test]
    fn test_is_valid_transition() {
        let seq = StageSequence::default();
        assert!(seq.is_valid_transition("requirements_gathering", "requirements_gathering"));
        assert!(seq.is_valid_transition("requirements_gathering", "knowledge_gathering"));
        assert!(!seq.is_valid_transition("requirements_gathering", "implementation_planning"));
        assert!(!seq.is_valid_transition("knowledge_gathering", "requirements_gathering"));
        assert!(!seq.is_valid_transition("review", "deploy"));
        assert!(!seq.is_valid_transition("deploy", "review"));
    }

    #[test]
    fn test_duplicates_dropped() {
        let seq = StageSequence::new(["a", "b", "a", "c"]);
        assert_eq!(seq.stages(), &["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_serde_as_list() {
        let seq = StageSequence::new(["draft", "polish"]);
        let json = serde_json::to_string(&seq).unwrap();
        assert_eq!(json, r#"["draft","polish"]"#);

        let restored: StageSequence = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, seq);
    }
}

//! Training run identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a training run, recorded in the evaluation report.
///
/// Format: `train-<date>-<time>-<random>`
/// Example: `train-20260115-143022-abc123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .to_string()
            .chars()
            .take(6)
            .collect();
        RunId(format!("train-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }

    /// Parse an existing run ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with("train-") && s.len() > 21 {
            Some(RunId(s.to_string()))
        } else {
            None
        }
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let id = RunId::new();
        assert!(id.0.starts_with("train-"));
        assert!(RunId::parse(&id.0).is_some());
    }

    #[test]
    fn test_run_id_parse_rejects_foreign() {
        assert!(RunId::parse("sess-20260115-143022-abc123").is_none());
        assert!(RunId::parse("train-").is_none());
    }
}

//! Safety limits (normative defaults).

use serde::{Deserialize, Serialize};

/// Bounds on unbounded-looking work.
///
/// Values are explicit about their units to avoid confusion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Commands retained on the undo stack; oldest entries are dropped
    /// beyond this. Zero means unbounded.
    pub max_undo_steps: usize,
    /// Entities a single tombstone cascade may visit before it is declared
    /// non-terminating (`ReferentialCycle`). Membership cycles are legal
    /// data; this bound is the guard that keeps cascade traversal finite
    /// even if the visited-set logic is ever wrong.
    pub max_cascade_steps: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_undo_steps: 1024,
            max_cascade_steps: 65_536,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let limits: Limits = serde_json::from_str(r#"{"max_undo_steps": 8}"#).unwrap();
        assert_eq!(limits.max_undo_steps, 8);
        assert_eq!(limits.max_cascade_steps, Limits::default().max_cascade_steps);
    }
}

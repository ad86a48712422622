//! Execution traces
//!
//! A trace is the ordered list of every decision taken during one exploration:
//! for operation choices `chosen` is the operation id, for nondeterministic
//! booleans it is `0` or `1`, for integers the value itself.
//!
//! Serialized as a plain JSON list:
//!
//! ```json
//! [{"kind":"Create","chosen":0},{"kind":"NonDeterministicBool","chosen":1}]
//! ```

use crate::errors::TraceError;
use crate::point::SchedulingPointKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One recorded decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub kind: SchedulingPointKind,
    pub chosen: u64,
}

/// Ordered decisions of one exploration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    steps: Vec<TraceStep>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: SchedulingPointKind, chosen: u64) {
        self.steps.push(TraceStep { kind, chosen });
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn to_json(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), TraceError> {
        fs::write(path, self.to_json()?).map_err(|e| TraceError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let text = fs::read_to_string(path).map_err(|e| TraceError::io(path, e))?;
        Self::from_json(&text)
    }
}

impl FromIterator<TraceStep> for ExecutionTrace {
    fn from_iter<I: IntoIterator<Item = TraceStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wire_format() {
        let mut trace = ExecutionTrace::new();
        trace.push(SchedulingPointKind::Create, 0);
        trace.push(SchedulingPointKind::NonDeterministicBool, 1);

        let json = serde_json::to_string(&trace).unwrap();
        assert_eq!(
            json,
            r#"[{"kind":"Create","chosen":0},{"kind":"NonDeterministicBool","chosen":1}]"#
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bug.trace.json");

        let trace: ExecutionTrace = vec![
            TraceStep { kind: SchedulingPointKind::Send, chosen: 2 },
            TraceStep { kind: SchedulingPointKind::Yield, chosen: 1 },
        ]
        .into_iter()
        .collect();

        trace.save(&path).unwrap();
        assert_eq!(ExecutionTrace::load(&path).unwrap(), trace);
    }

    #[test]
    fn test_malformed_trace() {
        let err = ExecutionTrace::from_json(r#"[{"kind":"Teleport","chosen":0}]"#).unwrap_err();
        assert!(matches!(err, TraceError::Format(_)));

        let err = ExecutionTrace::load(Path::new("/nonexistent/trace.json")).unwrap_err();
        assert!(matches!(err, TraceError::Io { .. }));
    }
}

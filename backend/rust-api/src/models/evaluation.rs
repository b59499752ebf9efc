use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Yes,
    Partially,
    No,
}

impl Verdict {
    /// Literal label the model is asked to emit.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Yes => "YES",
            Verdict::Partially => "PARTIALLY",
            Verdict::No => "NO",
        }
    }

    pub fn suggests_hints(&self) -> bool {
        !matches!(self, Verdict::Yes)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub ticket_id: String,
    pub attempt_ref: u32,
    pub verdict: Verdict,
    pub rationale: String,
    pub evaluated_at: DateTime<Utc>,
}

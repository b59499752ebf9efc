use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod evaluation;
pub mod hint;
pub mod session;
pub mod settings;
pub mod solution;

/// Ticket difficulty chosen by the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Simple,
    Medium,
    Complex,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Simple => "simple",
            Difficulty::Medium => "medium",
            Difficulty::Complex => "complex",
        }
    }

    /// Heading shown above the hint list for this tier.
    pub fn hint_heading(&self) -> &'static str {
        match self {
            Difficulty::Simple => "Helpful Hints",
            Difficulty::Medium => "Targeted Guidance",
            Difficulty::Complex => "Expert Insights",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three AI-backed operations. Used to tag prompts, parse results and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Generate,
    Hint,
    Evaluate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Generate => "generate",
            Operation::Hint => "hint",
            Operation::Evaluate => "evaluate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const UNKNOWN_REQUESTER: &str = "Unknown requester";
pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub difficulty: Difficulty,
    pub title: String,
    pub description: String,
    pub category: String,
    pub requester: String,
    pub created_at: DateTime<Utc>,
}

/// Ticket fields recovered from model output, before an id and timestamp are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub requester: String,
}

impl Ticket {
    pub fn from_draft(draft: TicketDraft, difficulty: Difficulty) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            difficulty,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            requester: draft.requester,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateTicketRequest {
    pub difficulty: Difficulty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_serializes_lowercase() {
        let json = serde_json::to_string(&Difficulty::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}

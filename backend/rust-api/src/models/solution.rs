use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// The learner's current proposed solution for the active ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionAttempt {
    pub ticket_id: String,
    /// Starts at 1 and increments whenever the text changes; referenced by hints and evaluations.
    pub revision: u32,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitSolutionRequest {
    #[validate(length(max = 8000, message = "solution text must be at most 8000 characters"))]
    pub text: String,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub ticket_id: String,
    /// Revision of the solution attempt the hint was generated for.
    pub attempt_ref: u32,
    /// 1-based count of hints requested for the ticket so far.
    pub tier: u32,
    pub text: String,
}

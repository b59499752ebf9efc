use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::evaluation::Evaluation;
use super::hint::Hint;
use super::solution::SolutionAttempt;
use super::Ticket;

/// Workflow position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    TicketReady,
    SolutionPending,
    HintGiven,
    Evaluated,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::TicketReady => "ticket_ready",
            WorkflowState::SolutionPending => "solution_pending",
            WorkflowState::HintGiven => "hint_given",
            WorkflowState::Evaluated => "evaluated",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One learner's practice session. Mutated only through the workflow controller.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    state: WorkflowState,
    ticket: Option<Ticket>,
    attempt: Option<SolutionAttempt>,
    hints: Vec<Hint>,
    evaluation: Option<Evaluation>,
    /// Credential epoch the AI provider rejected while serving this session.
    pub(crate) blocked_credential_epoch: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: WorkflowState::Idle,
            ticket: None,
            attempt: None,
            hints: Vec::new(),
            evaluation: None,
            blocked_credential_epoch: None,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    pub fn attempt(&self) -> Option<&SolutionAttempt> {
        self.attempt.as_ref()
    }

    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Installs a freshly generated ticket and drops everything tied to the previous one.
    pub(crate) fn install_ticket(&mut self, ticket: Ticket) {
        self.ticket = Some(ticket);
        self.attempt = None;
        self.hints.clear();
        self.evaluation = None;
        self.state = WorkflowState::TicketReady;
    }

    /// Replaces the live attempt. The evaluation referenced the superseded attempt and is dropped.
    pub(crate) fn replace_attempt(&mut self, attempt: SolutionAttempt) {
        self.attempt = Some(attempt);
        self.evaluation = None;
        self.state = WorkflowState::SolutionPending;
    }

    pub(crate) fn push_hint(&mut self, hint: Hint) {
        self.hints.push(hint);
        self.state = WorkflowState::HintGiven;
    }

    pub(crate) fn set_evaluation(&mut self, evaluation: Evaluation) {
        self.evaluation = Some(evaluation);
        self.state = WorkflowState::Evaluated;
    }

    pub(crate) fn clear(&mut self) {
        self.ticket = None;
        self.attempt = None;
        self.hints.clear();
        self.evaluation = None;
        self.state = WorkflowState::Idle;
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            state: self.state,
            hint_heading: self.ticket.as_ref().map(|t| t.difficulty.hint_heading()),
            ticket: self.ticket.clone(),
            attempt: self.attempt.clone(),
            hints: self.hints.clone(),
            evaluation: self.evaluation.clone(),
            next_step: self.next_step(),
        }
    }

    fn next_step(&self) -> &'static str {
        match self.state {
            WorkflowState::Idle => "Generate a practice ticket to start.",
            WorkflowState::TicketReady => "Describe how you would solve this ticket.",
            WorkflowState::SolutionPending => {
                "Request a hint, or check whether your solution would fix the issue."
            }
            WorkflowState::HintGiven => match &self.evaluation {
                None => "Revise your solution using the hints, then check it.",
                Some(_) => "Revise your solution using the hints, then check it again.",
            },
            WorkflowState::Evaluated => match self.evaluation.as_ref().map(|e| e.verdict) {
                Some(verdict) if !verdict.suggests_hints() => {
                    "Well done. Generate a new ticket to keep practicing."
                }
                _ => "Request a hint and revise your solution, then check again.",
            },
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub state: WorkflowState,
    pub ticket: Option<Ticket>,
    pub attempt: Option<SolutionAttempt>,
    pub hint_heading: Option<&'static str>,
    pub hints: Vec<Hint>,
    pub evaluation: Option<Evaluation>,
    pub next_step: &'static str,
}

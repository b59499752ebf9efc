//! Sequences ticket generation, solution proposals, hints and evaluations on a [`Session`].
//!
//! Every AI-dependent trigger builds its prompt, sends it through the [`AiGateway`], parses
//! the reply and only then commits to the session. A failure at any step returns before the
//! commit, so the session is left exactly as it was.

use chrono::Utc;
use std::time::Duration;

use crate::metrics::{self, EVALUATIONS_TOTAL, TICKETS_GENERATED_TOTAL};
use crate::models::evaluation::Evaluation;
use crate::models::hint::Hint;
use crate::models::session::Session;
use crate::models::solution::SolutionAttempt;
use crate::models::{Difficulty, Operation, Ticket};
use crate::services::ai_gateway::{AiGateway, AiRequest, RawResult};
use crate::services::prompt_builder::{self, PromptRequest};
use crate::services::response_parser::{self, ParseFailure, ParsePhase, Parsed};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiFailure {
    #[error("AI provider rate limit reached, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("AI provider rejected the credential: {0}")]
    Auth(String),
    #[error("could not reach the AI provider: {0}")]
    Network(String),
    #[error("AI provider did not answer in time")]
    Timeout,
    #[error("AI provider error: {0}")]
    Upstream(String),
}

impl AiFailure {
    /// `None` for `RawResult::Ok`.
    pub fn from_raw(raw: RawResult, default_cooldown: Duration) -> Option<Self> {
        match raw {
            RawResult::Ok(_) => None,
            RawResult::RateLimited { retry_after } => Some(AiFailure::RateLimited {
                retry_after: retry_after.unwrap_or(default_cooldown),
            }),
            RawResult::AuthError(detail) => Some(AiFailure::Auth(detail)),
            RawResult::NetworkError(detail) => Some(AiFailure::Network(detail)),
            RawResult::Timeout => Some(AiFailure::Timeout),
            RawResult::UpstreamError(detail) => Some(AiFailure::Upstream(detail)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("no ticket has been generated yet")]
    NoTicket,
    #[error("no solution has been submitted for the current ticket")]
    NoSolution,
    #[error("solution text must not be empty")]
    EmptySolution,
    #[error(transparent)]
    Ai(#[from] AiFailure),
    #[error(transparent)]
    Parse(#[from] ParseFailure),
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NoTicket => "no_ticket",
            WorkflowError::NoSolution => "no_solution",
            WorkflowError::EmptySolution => "empty_solution",
            WorkflowError::Ai(AiFailure::RateLimited { .. }) => "rate_limited",
            WorkflowError::Ai(AiFailure::Auth(_)) => "auth",
            WorkflowError::Ai(AiFailure::Network(_)) => "network",
            WorkflowError::Ai(AiFailure::Timeout) => "timeout",
            WorkflowError::Ai(AiFailure::Upstream(_)) => "upstream",
            WorkflowError::Parse(_) => "parse",
        }
    }

    /// Whether repeating the same trigger unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::NoTicket | WorkflowError::NoSolution | WorkflowError::EmptySolution => {
                false
            }
            WorkflowError::Ai(AiFailure::Auth(_)) => false,
            WorkflowError::Ai(_) | WorkflowError::Parse(_) => true,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            WorkflowError::Ai(AiFailure::RateLimited { retry_after }) => Some(*retry_after),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Generate,
    SubmitSolution,
    RequestHint,
    RequestEvaluation,
    Reset,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Generate => "generate",
            Trigger::SubmitSolution => "submit_solution",
            Trigger::RequestHint => "request_hint",
            Trigger::RequestEvaluation => "request_evaluation",
            Trigger::Reset => "reset",
        }
    }
}

/// Runtime AI settings. Replaceable through the settings endpoint.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub model_id: String,
    pub timeout: Duration,
    pub rate_limit_cooldown: Duration,
}

pub struct WorkflowController<'a> {
    gateway: &'a AiGateway,
    settings: AiSettings,
}

impl<'a> WorkflowController<'a> {
    pub fn new(gateway: &'a AiGateway, settings: AiSettings) -> Self {
        Self { gateway, settings }
    }

    /// Allowed from any state. On success the new ticket replaces the old one together with
    /// its attempt, hints and evaluation.
    pub async fn generate(
        &self,
        session: &mut Session,
        difficulty: Difficulty,
    ) -> Result<(), WorkflowError> {
        let result = self.try_generate(session, difficulty).await;
        finish(Trigger::Generate, session, &result);
        result
    }

    async fn try_generate(
        &self,
        session: &mut Session,
        difficulty: Difficulty,
    ) -> Result<(), WorkflowError> {
        let request = PromptRequest::Generate { difficulty };
        let operation = request.operation();
        let prompt = prompt_builder::build(request);
        let raw = self.dispatch(session, operation, prompt).await?;
        let draft = parsed(operation, response_parser::parse_ticket(&raw))?;

        let ticket = Ticket::from_draft(draft, difficulty);
        tracing::info!(
            "Generated {} ticket {} for session {}: {}",
            difficulty,
            ticket.id,
            session.id,
            ticket.title
        );
        TICKETS_GENERATED_TOTAL
            .with_label_values(&[difficulty.as_str()])
            .inc();
        session.install_ticket(ticket);
        Ok(())
    }

    /// Stores the solution text. Returns `false` when the text equals the live attempt,
    /// which leaves the session untouched.
    pub fn submit_solution(&self, session: &mut Session, text: &str) -> Result<bool, WorkflowError> {
        let result = Self::try_submit(session, text);
        finish(Trigger::SubmitSolution, session, &result);
        result
    }

    fn try_submit(session: &mut Session, text: &str) -> Result<bool, WorkflowError> {
        let ticket_id = session
            .ticket()
            .map(|t| t.id.clone())
            .ok_or(WorkflowError::NoTicket)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::EmptySolution);
        }

        let revision = match session.attempt() {
            Some(current) if current.text == text => return Ok(false),
            Some(current) => current.revision + 1,
            None => 1,
        };

        session.replace_attempt(SolutionAttempt {
            ticket_id,
            revision,
            text: text.to_string(),
            submitted_at: Utc::now(),
        });
        Ok(true)
    }

    pub async fn request_hint(&self, session: &mut Session) -> Result<(), WorkflowError> {
        let result = self.try_hint(session).await;
        finish(Trigger::RequestHint, session, &result);
        result
    }

    async fn try_hint(&self, session: &mut Session) -> Result<(), WorkflowError> {
        let ticket = session.ticket().ok_or(WorkflowError::NoTicket)?;
        let attempt = session.attempt().ok_or(WorkflowError::NoSolution)?;
        let tier = session.hints().len() as u32 + 1;

        let ticket_id = ticket.id.clone();
        let attempt_ref = attempt.revision;
        let request = PromptRequest::Hint {
            ticket: Some(ticket),
            attempt: Some(attempt),
            tier,
        };
        let operation = request.operation();
        let prompt = prompt_builder::build(request);

        let raw = self.dispatch(session, operation, prompt).await?;
        let text = parsed(operation, response_parser::parse_hint(&raw))?;

        metrics::record_hint(tier);
        session.push_hint(Hint {
            ticket_id,
            attempt_ref,
            tier,
            text,
        });
        Ok(())
    }

    pub async fn request_evaluation(&self, session: &mut Session) -> Result<(), WorkflowError> {
        let result = self.try_evaluation(session).await;
        finish(Trigger::RequestEvaluation, session, &result);
        result
    }

    async fn try_evaluation(&self, session: &mut Session) -> Result<(), WorkflowError> {
        let ticket = session.ticket().ok_or(WorkflowError::NoTicket)?;
        let attempt = session.attempt().ok_or(WorkflowError::NoSolution)?;

        let ticket_id = ticket.id.clone();
        let attempt_ref = attempt.revision;
        let request = PromptRequest::Evaluate {
            ticket: Some(ticket),
            attempt: Some(attempt),
        };
        let operation = request.operation();
        let prompt = prompt_builder::build(request);

        let raw = self.dispatch(session, operation, prompt).await?;
        let draft = parsed(operation, response_parser::parse_evaluation(&raw))?;

        EVALUATIONS_TOTAL
            .with_label_values(&[draft.verdict.label()])
            .inc();
        session.set_evaluation(Evaluation {
            ticket_id,
            attempt_ref,
            verdict: draft.verdict,
            rationale: draft.rationale,
            evaluated_at: Utc::now(),
        });
        Ok(())
    }

    /// "New Ticket": back to Idle with nothing carried over.
    pub fn reset(&self, session: &mut Session) {
        session.clear();
        finish::<()>(Trigger::Reset, session, &Ok(()));
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        operation: Operation,
        prompt: String,
    ) -> Result<String, WorkflowError> {
        let epoch = self.gateway.credential_epoch();
        if session.blocked_credential_epoch == Some(epoch) {
            return Err(AiFailure::Auth(
                "the AI provider rejected the current credential; update the API key".to_string(),
            )
            .into());
        }

        let request = AiRequest::new(operation, prompt, self.settings.model_id.clone());
        match self.gateway.send(&request, self.settings.timeout).await {
            RawResult::Ok(text) => {
                session.blocked_credential_epoch = None;
                Ok(text)
            }
            raw => {
                if matches!(raw, RawResult::AuthError(_)) {
                    session.blocked_credential_epoch = Some(epoch);
                }
                let failure = AiFailure::from_raw(raw, self.settings.rate_limit_cooldown)
                    .unwrap_or_else(|| AiFailure::Upstream("unclassified response".to_string()));
                Err(failure.into())
            }
        }
    }
}

fn parsed<T>(
    operation: Operation,
    result: Result<Parsed<T>, ParseFailure>,
) -> Result<T, WorkflowError> {
    match result {
        Ok(parsed) => {
            metrics::record_parse(operation.as_str(), Some(parsed.phase));
            if parsed.phase == ParsePhase::Permissive {
                tracing::warn!("{} response recovered by permissive parsing", operation);
            }
            Ok(parsed.value)
        }
        Err(failure) => {
            metrics::record_parse(operation.as_str(), None);
            Err(failure.into())
        }
    }
}

fn finish<T>(trigger: Trigger, session: &Session, result: &Result<T, WorkflowError>) {
    match result {
        Ok(_) => {
            metrics::record_transition(trigger.as_str(), "ok");
            tracing::info!(
                "Session {} {} -> {}",
                session.id,
                trigger.as_str(),
                session.state()
            );
        }
        Err(e) => {
            metrics::record_transition(trigger.as_str(), e.kind());
            match e {
                WorkflowError::NoTicket
                | WorkflowError::NoSolution
                | WorkflowError::EmptySolution => tracing::debug!(
                    "Session {} rejected {} in state {}: {}",
                    session.id,
                    trigger.as_str(),
                    session.state(),
                    e
                ),
                _ => tracing::error!(
                    "Session {} {} failed in state {}: {}",
                    session.id,
                    trigger.as_str(),
                    session.state(),
                    e
                ),
            }
        }
    }
}

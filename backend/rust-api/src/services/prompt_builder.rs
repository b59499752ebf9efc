//! Prompt construction for the three AI operations.
//!
//! Every function here is a pure function of its arguments: no clock, no randomness,
//! no session lookups. The same inputs always produce byte-identical prompts, which lets
//! tests replay the workflow without a network.
//!
//! Output contracts the response parser relies on:
//! - generate: a single JSON object with the string fields listed in [`TICKET_FIELDS`].
//! - hint: two or three bullet lines starting with `- `.
//! - evaluate: a `VERDICT: YES|PARTIALLY|NO` line followed by a `RATIONALE: ...` line.

use crate::models::{solution::SolutionAttempt, Difficulty, Operation, Ticket};

pub const TICKET_FIELDS: [&str; 4] = ["title", "description", "category", "requester"];
pub const VERDICT_LABEL: &str = "VERDICT";
pub const RATIONALE_LABEL: &str = "RATIONALE";

pub const MISSING_TICKET: &str = "(no ticket available)";
pub const MISSING_SOLUTION: &str = "(no solution submitted)";

/// Inputs for one prompt, tagged by operation.
#[derive(Debug, Clone, Copy)]
pub enum PromptRequest<'a> {
    Generate {
        difficulty: Difficulty,
    },
    Hint {
        ticket: Option<&'a Ticket>,
        attempt: Option<&'a SolutionAttempt>,
        tier: u32,
    },
    Evaluate {
        ticket: Option<&'a Ticket>,
        attempt: Option<&'a SolutionAttempt>,
    },
}

impl PromptRequest<'_> {
    pub fn operation(&self) -> Operation {
        match self {
            PromptRequest::Generate { .. } => Operation::Generate,
            PromptRequest::Hint { .. } => Operation::Hint,
            PromptRequest::Evaluate { .. } => Operation::Evaluate,
        }
    }
}

pub fn build(request: PromptRequest<'_>) -> String {
    match request {
        PromptRequest::Generate { difficulty } => generate(difficulty),
        PromptRequest::Hint {
            ticket,
            attempt,
            tier,
        } => hint(ticket, attempt, tier),
        PromptRequest::Evaluate { ticket, attempt } => evaluate(ticket, attempt),
    }
}

pub fn generate(difficulty: Difficulty) -> String {
    let (rules, example) = match difficulty {
        Difficulty::Simple => (
            "- Exactly one symptom with one plausible cause.\n\
             - A common everyday problem that a first-line technician sees regularly.\n\
             - Plain, non-technical wording from the requester.",
            r#"{
  "title": "Computer will not power on",
  "description": "My computer won't turn on. No lights or sounds when I press the power button.",
  "category": "Hardware",
  "requester": "Sarah from Marketing"
}"#,
        ),
        Difficulty::Medium => (
            "- Several symptoms, or a single symptom whose cause is ambiguous.\n\
             - Solving it needs some technical knowledge and more than one troubleshooting step.\n\
             - Include realistic technical details the requester noticed.",
            r#"{
  "title": "Emails from specific domains land in Junk",
  "description": "Outlook moves emails to the Junk folder instead of the Inbox. It only happens with emails from a few partner domains.",
  "category": "Email",
  "requester": "Alex from Engineering"
}"#,
        ),
        Difficulty::Complex => (
            "- The problem involves an interaction between several systems.\n\
             - Information is incomplete: the requester reports observations, not causes.\n\
             - Include error messages, timings or log excerpts where they fit.",
            r#"{
  "title": "Intermittent packet loss to cloud servers",
  "description": "Packet loss between the main office and our cloud servers happens randomly between 2 and 4 PM every day. Speed tests show normal bandwidth but some applications time out. Firewall logs show no blocked connections.",
  "category": "Network",
  "requester": "Network Admin from IT Department"
}"#,
        ),
    };

    format!(
        "You are writing a practice IT support ticket for a learner who is training as a support technician.\n\
         \n\
         Difficulty: {level}\n\
         Scenario rules:\n\
         {rules}\n\
         \n\
         Respond with ONLY a JSON object containing these string fields:\n\
         - \"{title}\": a short summary of the problem (at most 80 characters)\n\
         - \"{description}\": the problem as the requester reports it\n\
         - \"{category}\": one of Hardware, Software, Network, Email, Accounts, Printing, Security, Other\n\
         - \"{requester}\": the requester's name and department\n\
         \n\
         The ticket must describe symptoms only. Do not mention the cause or the solution.\n\
         \n\
         Example:\n\
         {example}\n\
         \n\
         Return ONLY the JSON object, no other text.",
        level = difficulty.as_str().to_uppercase(),
        rules = rules,
        title = TICKET_FIELDS[0],
        description = TICKET_FIELDS[1],
        category = TICKET_FIELDS[2],
        requester = TICKET_FIELDS[3],
        example = example,
    )
}

pub fn hint(ticket: Option<&Ticket>, attempt: Option<&SolutionAttempt>, tier: u32) -> String {
    let tier = tier.max(1);
    let persona = match ticket.map(|t| t.difficulty) {
        Some(Difficulty::Simple) => "a friendly IT mentor",
        Some(Difficulty::Medium) => "an IT trainer",
        Some(Difficulty::Complex) => "a senior IT engineer who challenges assumptions",
        None => "an IT mentor",
    };
    let specificity = match tier {
        1 => "Give only a general direction: point to the area worth investigating without \
              naming the specific component, setting or command. Do NOT reveal the final answer.",
        2 => "Be more specific than a general direction: name the component, setting or log that \
              deserves attention, but leave the diagnosis to the learner.",
        _ => "Be concrete: describe the next diagnostic step the learner should perform and what \
              result to look for, but still do not write out the complete fix.",
    };

    format!(
        "You are {persona}. A learner is working on the IT support ticket below and has proposed a solution.\n\
         \n\
         {ticket}\n\
         \n\
         Learner's proposed solution:\n\
         {solution}\n\
         \n\
         This is hint number {tier} for this ticket. {specificity}\n\
         \n\
         Format: two or three short bullet points, each starting with \"- \". \
         No heading and no verdict on whether the solution works.\n\
         Never state the complete fix. Keep the tone encouraging.",
        persona = persona,
        ticket = ticket_block(ticket),
        solution = solution_text(attempt),
        tier = tier,
        specificity = specificity,
    )
}

pub fn evaluate(ticket: Option<&Ticket>, attempt: Option<&SolutionAttempt>) -> String {
    format!(
        "You are assessing whether a learner's proposed solution would fix an IT support ticket.\n\
         \n\
         {ticket}\n\
         \n\
         Proposed solution:\n\
         {solution}\n\
         \n\
         Answer in exactly this format:\n\
         {verdict}: <YES|PARTIALLY|NO>\n\
         {rationale}: <one sentence explaining the verdict>\n\
         \n\
         Use YES when the solution addresses the root cause and would resolve the issue, \
         PARTIALLY when it would help but misses an important step, and NO when it would not resolve the issue.\n\
         The rationale must only discuss what the learner proposed. \
         Do not describe or hint at any fix the learner did not mention.\n\
         Start your response with the {verdict} line.",
        ticket = ticket_block(ticket),
        solution = solution_text(attempt),
        verdict = VERDICT_LABEL,
        rationale = RATIONALE_LABEL,
    )
}

fn ticket_block(ticket: Option<&Ticket>) -> String {
    match ticket {
        Some(t) => format!(
            "Ticket: {}\nCategory: {}\nDifficulty: {}\nReported by: {}\nIssue: {}",
            t.title, t.category, t.difficulty, t.requester, t.description
        ),
        None => format!("Ticket: {}", MISSING_TICKET),
    }
}

fn solution_text(attempt: Option<&SolutionAttempt>) -> &str {
    match attempt {
        Some(a) if !a.text.trim().is_empty() => a.text.as_str(),
        _ => MISSING_SOLUTION,
    }
}

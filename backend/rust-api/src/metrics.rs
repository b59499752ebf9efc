use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

use crate::services::response_parser::ParsePhase;

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // AI provider metrics
    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_requests_total",
        "Total number of AI provider exchanges by final outcome",
        &["operation", "outcome"]
    )
    .unwrap();

    pub static ref AI_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "ai_request_duration_seconds",
        "AI provider exchange duration in seconds, retries included",
        &["operation"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
    )
    .unwrap();

    pub static ref AI_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_retries_total",
        "Total number of automatic retries after transient AI failures",
        &["operation"]
    )
    .unwrap();

    pub static ref PARSE_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "parse_outcomes_total",
        "AI response parse results by phase",
        &["operation", "phase"]
    )
    .unwrap();

    // Business Metrics
    pub static ref WORKFLOW_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "workflow_transitions_total",
        "Workflow triggers by result",
        &["trigger", "result"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of sessions held in memory"
    )
    .unwrap();

    pub static ref TICKETS_GENERATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tickets_generated_total",
        "Total number of tickets generated",
        &["difficulty"]
    )
    .unwrap();

    pub static ref HINTS_REQUESTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "hints_requested_total",
        "Total number of hints delivered",
        &["tier"]
    )
    .unwrap();

    pub static ref EVALUATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "evaluations_total",
        "Total number of evaluations by verdict",
        &["verdict"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

pub fn record_parse(operation: &str, phase: Option<ParsePhase>) {
    let phase = phase.map(|p| p.as_str()).unwrap_or("failed");
    PARSE_OUTCOMES_TOTAL
        .with_label_values(&[operation, phase])
        .inc();
}

pub fn record_transition(trigger: &str, result: &str) {
    WORKFLOW_TRANSITIONS_TOTAL
        .with_label_values(&[trigger, result])
        .inc();
}

/// Hint tiers above 3 share one label.
pub fn record_hint(tier: u32) {
    let label = match tier {
        0 | 1 => "1",
        2 => "2",
        _ => "3+",
    };
    HINTS_REQUESTED_TOTAL.with_label_values(&[label]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = AI_REQUESTS_TOTAL.with_label_values(&["hint", "ok"]).get();
    }

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        record_parse("generate", Some(ParsePhase::Permissive));
        record_hint(5);

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("parse_outcomes_total"));
        assert!(output.contains("tier=\"3+\""));
    }
}

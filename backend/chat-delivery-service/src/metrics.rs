use actix_web::HttpResponse;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static::lazy_static! {
    /// Events handed to the bus, by topic and result
    static ref EVENTS_PUBLISHED: IntCounterVec = register_int_counter_vec!(
        "chat_events_published_total",
        "Chat events published to the bus",
        &["topic", "result"]
    )
    .expect("chat_events_published_total metric registration");

    /// Fan-out decisions, by event type and outcome
    static ref FANOUT_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "chat_fanout_outcomes_total",
        "Fan-out outcomes per consumed event",
        &["event_type", "outcome"]
    )
    .expect("chat_fanout_outcomes_total metric registration");

    static ref DUPLICATE_EVENTS_SKIPPED: IntCounter = register_int_counter!(
        "chat_duplicate_events_skipped_total",
        "Consumed events skipped because their event_id was already handled"
    )
    .expect("chat_duplicate_events_skipped_total metric registration");

    static ref SESSIONS_EVICTED: IntCounter = register_int_counter!(
        "chat_sessions_evicted_total",
        "Live sessions dropped after a failed or timed out push"
    )
    .expect("chat_sessions_evicted_total metric registration");

    static ref ACTIVE_SESSIONS: IntGauge = register_int_gauge!(
        "chat_active_sessions",
        "Live sessions held by this instance"
    )
    .expect("chat_active_sessions metric registration");

    static ref STORE_LATENCY: HistogramVec = register_histogram_vec!(
        "chat_message_store_duration_seconds",
        "Message store query latency",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("chat_message_store_duration_seconds metric registration");
}

pub fn record_publish(topic: &str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    EVENTS_PUBLISHED.with_label_values(&[topic, result]).inc();
}

pub fn record_fanout(event_type: &str, outcome: &str) {
    FANOUT_OUTCOMES
        .with_label_values(&[event_type, outcome])
        .inc();
}

pub fn record_duplicate_skipped() {
    DUPLICATE_EVENTS_SKIPPED.inc();
}

pub fn record_session_evicted() {
    SESSIONS_EVICTED.inc();
}

pub fn set_active_sessions(count: usize) {
    ACTIVE_SESSIONS.set(count as i64);
}

pub fn observe_store_latency(operation: &str, started: Instant) {
    STORE_LATENCY
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

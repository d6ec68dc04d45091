use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "odyssey_submissions_total",
        "Graded submissions by outcome",
        &["outcome"]
    )
    .expect("submissions counter registers once");
    pub static ref SUBMISSION_SECONDS: Histogram = register_histogram!(
        "odyssey_submission_seconds",
        "Wall time of a graded submission, persistence included",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("submission histogram registers once");
}

pub fn record_submission(succeeded: bool, elapsed: Duration) {
    let outcome = if succeeded { "passed" } else { "failed" };
    SUBMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
    SUBMISSION_SECONDS.observe(elapsed.as_secs_f64());
}

/// Default registry in the text exposition format
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

//! Counters recorded through the `metrics` facade.
//!
//! Without an installed recorder these calls are no-ops.

use metrics::counter;

pub fn record_request_pushed(scheduler: &str, elements: usize) {
    counter!("thumbd_requests_total", "scheduler" => scheduler.to_string()).increment(1);
    counter!("thumbd_elements_total", "scheduler" => scheduler.to_string())
        .increment(elements as u64);
}

pub fn record_cache_hits(scheduler: &str, hits: usize) {
    if hits > 0 {
        counter!("thumbd_cache_hits_total", "scheduler" => scheduler.to_string())
            .increment(hits as u64);
    }
}

pub fn record_element_outcome(scheduler: &str, success: bool) {
    let outcome = if success { "ready" } else { "error" };
    counter!(
        "thumbd_element_outcomes_total",
        "scheduler" => scheduler.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_dequeue(scheduler: &str) {
    counter!("thumbd_dequeued_total", "scheduler" => scheduler.to_string()).increment(1);
}

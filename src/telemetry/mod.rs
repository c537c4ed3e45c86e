//! Telemetry for the thumbnail daemon.
//!
//! Log output, one span per processed request, and counters for queued
//! requests, cache hits, element outcomes and dequeues.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat, LogSink};
pub use self::metrics::{
    record_cache_hits, record_dequeue, record_element_outcome, record_request_pushed,
};
pub use spans::{RequestSpan, SpanExt};

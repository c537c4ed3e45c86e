//! The `thumbnail_request` span opened by a pool thread for each request.

use tracing::span::Entered;
use tracing::{info_span, Span};

use crate::scheduler::RequestHandle;

pub trait SpanExt {
    /// Set `status` to `ok` or `error`, plus `error.message` on failure.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Span covering one request from `started` to `finished`.
///
/// Log lines emitted while a worker runs inherit `handle` and `scheduler`,
/// which is how a slow or failing URI is traced back to its client request.
pub struct RequestSpan {
    span: Span,
}

impl RequestSpan {
    pub fn new(handle: RequestHandle, scheduler: &str, elements: usize) -> Self {
        let span = info_span!(
            "thumbnail_request",
            handle = %handle,
            scheduler = %scheduler,
            elements = elements,
            failed = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        );
        Self { span }
    }

    pub fn enter(&self) -> Entered<'_> {
        self.span.enter()
    }

    /// A request counts as failed if any of its elements did.
    pub fn record_outcome(&self, failed: usize) {
        self.span.record("failed", failed);
        let result = if failed == 0 {
            Ok(())
        } else {
            Err(format!("{failed} of the request's elements failed"))
        };
        self.span.record_result(&result);
    }

    pub fn record_panic(&self, reason: &str) {
        self.span.record_result::<(), _>(&Err(format!("processing panicked: {reason}")));
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

//! W3C trace context for attach mode.
//!
//! A second tool joins a trace by synthesizing the `traceparent` the root
//! would have propagated, then extracting it through the SDK propagator.

use crate::tracer::TracerError;
use opentelemetry::Context;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TraceContextExt;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use prowtrace_core::TraceIdentity;
use std::collections::HashMap;

pub const TRACEPARENT: &str = "traceparent";

/// W3C Trace Context of a derived root span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub trace_flags: String,
}

impl TraceContext {
    /// The context of the root span derived from `identity`, marked sampled.
    pub fn from_identity(identity: &TraceIdentity) -> Self {
        Self {
            trace_id: identity.trace_id_hex(),
            span_id: identity.root_span_id_hex(),
            trace_flags: "01".to_string(),
        }
    }

    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-{}", self.trace_id, self.span_id, self.trace_flags)
    }
}

/// Remote-parent context for the root derived from `identity`.
pub fn extract_context(identity: &TraceIdentity) -> Result<Context, TracerError> {
    let traceparent = TraceContext::from_identity(identity).to_traceparent();
    let headers = HashMap::from([(TRACEPARENT.to_string(), traceparent.clone())]);

    let cx = TraceContextPropagator::new().extract(&headers);
    let span_context = cx.span().span_context().clone();
    if !span_context.is_valid() || !span_context.is_remote() {
        return Err(TracerError::Propagation(format!(
            "no remote parent in {traceparent}"
        )));
    }
    Ok(cx)
}

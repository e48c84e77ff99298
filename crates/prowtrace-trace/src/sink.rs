//! Span sink backed by an OpenTelemetry tracer.

use crate::context::extract_context;
use chrono::{DateTime, Utc};
use opentelemetry::trace::{SpanBuilder, SpanId, TraceContextExt, TraceId, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer as SdkTracer;
use prowtrace_core::{Attributes, SpanSink, TraceIdentity};
use std::time::SystemTime;

/// Forwards every span with the caller's timestamps, never the wall clock.
#[derive(Debug, Clone)]
pub struct OtelSink {
    tracer: SdkTracer,
}

impl OtelSink {
    pub fn new(tracer: SdkTracer) -> Self {
        Self { tracer }
    }
}

impl SpanSink for OtelSink {
    type Context = Context;

    fn start_root(&self, identity: &TraceIdentity, name: &str, start: DateTime<Utc>) -> Context {
        let builder = SpanBuilder::from_name(name.to_string())
            .with_trace_id(TraceId::from_bytes(identity.trace_id))
            .with_span_id(SpanId::from_bytes(identity.root_span_id))
            .with_start_time(SystemTime::from(start));
        let span = self.tracer.build_with_context(builder, &Context::new());
        Context::new().with_span(span)
    }

    fn remote_parent(&self, identity: &TraceIdentity) -> prowtrace_core::Result<Context> {
        extract_context(identity).map_err(|e| prowtrace_core::Error::Propagation(e.to_string()))
    }

    fn start_span(&self, parent: &Context, name: &str, start: DateTime<Utc>) -> Context {
        let builder = SpanBuilder::from_name(name.to_string()).with_start_time(SystemTime::from(start));
        let span = self.tracer.build_with_context(builder, parent);
        parent.with_span(span)
    }

    fn add_event(&self, span: &Context, name: &str, time: DateTime<Utc>, attributes: &Attributes) {
        let attributes = attributes
            .iter()
            .map(|(key, value)| KeyValue::new(*key, value.clone()))
            .collect();
        span.span()
            .add_event_with_timestamp(name.to_string(), SystemTime::from(time), attributes);
    }

    fn end_span(&self, span: &Context, end: DateTime<Utc>) {
        span.span().end_with_timestamp(SystemTime::from(end));
    }
}

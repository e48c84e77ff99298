//! Span id generation for the SDK provider.

use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::trace::IdGenerator;
use prowtrace_core::SpanIdGenerator;
use std::sync::Arc;

/// Hands the run's seeded generator to the OpenTelemetry SDK.
///
/// Root spans carry explicit ids, so the SDK only asks this for descendants.
/// The generator is shared with the caller so a run can draw from one
/// sequence whichever side opens the span.
#[derive(Debug, Clone)]
pub struct SeededIdGenerator {
    ids: Arc<SpanIdGenerator>,
}

impl SeededIdGenerator {
    pub fn new(ids: Arc<SpanIdGenerator>) -> Self {
        Self { ids }
    }
}

impl IdGenerator for SeededIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from_bytes(self.ids.next_trace_id())
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from_bytes(self.ids.next_span_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let a = SeededIdGenerator::new(Arc::new(SpanIdGenerator::with_seed(42)));
        let b = SeededIdGenerator::new(Arc::new(SpanIdGenerator::with_seed(42)));

        for _ in 0..16 {
            let id = a.new_span_id();
            assert_ne!(id, SpanId::INVALID);
            assert_eq!(id, b.new_span_id());
        }
    }
}

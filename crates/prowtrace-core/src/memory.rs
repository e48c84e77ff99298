//! In-memory span sink, used for dry runs and tests.

use crate::ids::{SpanIdGenerator, TraceIdentity};
use crate::ports::{Attributes, SpanSink};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSpan {
    pub name: String,
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub parent_id: Option<[u8; 8]>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub events: Vec<RecordedEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub name: String,
    pub time: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryContext {
    trace_id: [u8; 16],
    span_id: [u8; 8],
    /// Index into the recorded spans; `None` for a remote parent.
    index: Option<usize>,
}

/// Keeps every span in call order.
#[derive(Debug)]
pub struct MemorySink {
    ids: SpanIdGenerator,
    spans: Mutex<Vec<RecordedSpan>>,
}

impl MemorySink {
    pub fn new(ids: SpanIdGenerator) -> Self {
        Self {
            ids,
            spans: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the spans recorded so far, in start order.
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, span: RecordedSpan) -> usize {
        let mut spans = self.spans.lock().unwrap_or_else(PoisonError::into_inner);
        spans.push(span);
        spans.len() - 1
    }

    fn with_span(&self, cx: &MemoryContext, f: impl FnOnce(&mut RecordedSpan)) {
        let Some(index) = cx.index else {
            return;
        };
        let mut spans = self.spans.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(span) = spans.get_mut(index) {
            f(span);
        }
    }
}

impl SpanSink for MemorySink {
    type Context = MemoryContext;

    fn start_root(&self, identity: &TraceIdentity, name: &str, start: DateTime<Utc>) -> MemoryContext {
        let index = self.push(RecordedSpan {
            name: name.to_string(),
            trace_id: identity.trace_id,
            span_id: identity.root_span_id,
            parent_id: None,
            start,
            end: None,
            events: Vec::new(),
        });
        MemoryContext {
            trace_id: identity.trace_id,
            span_id: identity.root_span_id,
            index: Some(index),
        }
    }

    fn remote_parent(&self, identity: &TraceIdentity) -> Result<MemoryContext> {
        Ok(MemoryContext {
            trace_id: identity.trace_id,
            span_id: identity.root_span_id,
            index: None,
        })
    }

    fn start_span(&self, parent: &MemoryContext, name: &str, start: DateTime<Utc>) -> MemoryContext {
        let span_id = self.ids.next_span_id();
        let index = self.push(RecordedSpan {
            name: name.to_string(),
            trace_id: parent.trace_id,
            span_id,
            parent_id: Some(parent.span_id),
            start,
            end: None,
            events: Vec::new(),
        });
        MemoryContext {
            trace_id: parent.trace_id,
            span_id,
            index: Some(index),
        }
    }

    fn add_event(&self, span: &MemoryContext, name: &str, time: DateTime<Utc>, attributes: &Attributes) {
        self.with_span(span, |s| {
            s.events.push(RecordedEvent {
                name: name.to_string(),
                time,
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            })
        });
    }

    fn end_span(&self, span: &MemoryContext, end: DateTime<Utc>) {
        self.with_span(span, |s| s.end = Some(end));
    }
}

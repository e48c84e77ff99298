//! Explicit-time span recording on top of a [`SpanSink`].
//!
//! A [`SpanContext`] is an immutable handle: starting a child never changes
//! the context it was started from. A [`Recording`] is an open span that can
//! take events until it is ended, which hands back the context of the span
//! just closed so its children can be recorded beneath it.
//!
//! Timestamps are never corrected. A span ending before it starts, or an
//! event outside its span, is logged and forwarded unchanged.

use crate::ids::TraceIdentity;
use crate::ports::{Attributes, SpanSink};
use crate::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

pub struct SpanContext<'s, S: SpanSink> {
    sink: &'s S,
    cx: S::Context,
}

impl<S: SpanSink> Clone for SpanContext<'_, S> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink,
            cx: self.cx.clone(),
        }
    }
}

impl<'s, S: SpanSink> SpanContext<'s, S> {
    /// Open the root span of a trace whose ids come from `identity`.
    pub fn root(
        sink: &'s S,
        identity: &TraceIdentity,
        name: &str,
        start: DateTime<Utc>,
    ) -> Recording<'s, S> {
        let cx = sink.start_root(identity, name, start);
        Recording::open(sink, cx, name, start)
    }

    /// Context beneath a span some other process owns.
    pub fn attached(sink: &'s S, identity: &TraceIdentity) -> Result<Self> {
        let cx = sink.remote_parent(identity)?;
        Ok(Self { sink, cx })
    }

    /// Record a child span with no events and return its context.
    pub fn record(&self, name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.recording(name, start).end(end)
    }

    /// Open a child span; it stays open until [`Recording::end`].
    pub fn recording(&self, name: &str, start: DateTime<Utc>) -> Recording<'s, S> {
        let cx = self.sink.start_span(&self.cx, name, start);
        Recording::open(self.sink, cx, name, start)
    }

    pub fn inner(&self) -> &S::Context {
        &self.cx
    }
}

pub struct Recording<'s, S: SpanSink> {
    sink: &'s S,
    cx: S::Context,
    name: String,
    start: DateTime<Utc>,
    event_times: Vec<(String, DateTime<Utc>)>,
}

impl<'s, S: SpanSink> Recording<'s, S> {
    fn open(sink: &'s S, cx: S::Context, name: &str, start: DateTime<Utc>) -> Self {
        Self {
            sink,
            cx,
            name: name.to_string(),
            start,
            event_times: Vec::new(),
        }
    }

    /// Attach a zero-duration event at `time`.
    pub fn event(&mut self, message: &str, time: DateTime<Utc>, attributes: &Attributes) {
        self.sink.add_event(&self.cx, message, time, attributes);
        self.event_times.push((message.to_string(), time));
    }

    /// Close the span at `end` and return its context.
    pub fn end(self, end: DateTime<Utc>) -> SpanContext<'s, S> {
        if end < self.start {
            warn!(
                span = %self.name,
                start = %self.start,
                end = %end,
                "span ends before it starts"
            );
        }
        for (event, time) in &self.event_times {
            if *time < self.start || *time > end {
                warn!(
                    span = %self.name,
                    event = %event,
                    time = %time,
                    start = %self.start,
                    end = %end,
                    "event falls outside its span"
                );
            }
        }

        self.sink.end_span(&self.cx, end);
        SpanContext {
            sink: self.sink,
            cx: self.cx,
        }
    }

    pub fn inner(&self) -> &S::Context {
        &self.cx
    }
}

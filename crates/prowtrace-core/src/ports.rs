//! Port traits (hexagonal architecture).
//!
//! Reconstruction never talks to an exporter directly; it drives a
//! [`SpanSink`]. Every timestamp is supplied by the caller, never read from
//! the clock.

use crate::ids::TraceIdentity;
use crate::Result;
use chrono::{DateTime, Utc};

/// Event attributes: static keys, owned values.
pub type Attributes = [(&'static str, String)];

/// Destination for reconstructed spans.
///
/// `Context` identifies one span (or a remote parent) and is what children
/// are started from. Implementations forward every call immediately; any
/// buffering is theirs to do.
pub trait SpanSink {
    type Context: Clone;

    /// Open the trace root with ids taken from `identity` instead of the
    /// generator.
    fn start_root(&self, identity: &TraceIdentity, name: &str, start: DateTime<Utc>)
    -> Self::Context;

    /// Context for a span owned by another process, addressed by `identity`.
    fn remote_parent(&self, identity: &TraceIdentity) -> Result<Self::Context>;

    /// Open a child of `parent`.
    fn start_span(&self, parent: &Self::Context, name: &str, start: DateTime<Utc>)
    -> Self::Context;

    fn add_event(
        &self,
        span: &Self::Context,
        name: &str,
        time: DateTime<Utc>,
        attributes: &Attributes,
    );

    fn end_span(&self, span: &Self::Context, end: DateTime<Utc>);
}

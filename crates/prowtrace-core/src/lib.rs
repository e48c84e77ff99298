//! Prowtrace Core
//!
//! Rebuilds a span tree for a CI job that has already finished, using the
//! artifacts the job left behind. This crate holds the identifier scheme,
//! the artifact model and the reconstruction policy. It performs no I/O:
//! documents come in already decoded and spans leave through [`SpanSink`].

pub mod artifacts;
pub mod assembly;
pub mod classify;
pub mod error;
pub mod ids;
pub mod memory;
pub mod ports;
pub mod recording;

pub use assembly::{AssemblySummary, Mode, Timeline, assemble};
pub use classify::classify_git_command;
pub use error::{Error, Result};
pub use ids::{JobId, SpanIdGenerator, TraceIdentity};
pub use memory::{MemorySink, RecordedSpan};
pub use ports::{Attributes, SpanSink};
pub use recording::{Recording, SpanContext};

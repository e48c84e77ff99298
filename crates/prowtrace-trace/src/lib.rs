//! OpenTelemetry export for reconstructed traces.
//!
//! Provides the OTLP pipeline, a span sink that forwards explicit timestamps,
//! W3C trace context synthesis for attach mode, and the process logger.

pub mod context;
pub mod ids;
pub mod logging;
pub mod sink;
pub mod tracer;

pub use context::{TraceContext, extract_context};
pub use ids::SeededIdGenerator;
pub use logging::{LogFormat, init_logging};
pub use sink::OtelSink;
pub use tracer::{ExportPipeline, OtlpConfig, TracerError, TracingConfig};

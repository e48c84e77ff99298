//! Export pipeline setup and teardown.

use crate::ids::SeededIdGenerator;
use crate::sink::OtelSink;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{Sampler, TracerProvider},
};
use prowtrace_core::SpanIdGenerator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Instrumentation scope for every reconstructed span.
pub const INSTRUMENTATION_NAME: &str = "prowtrace";

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("Failed to initialize exporter: {0}")]
    Init(String),
    #[error("Failed to flush or shut down exporter: {0}")]
    Shutdown(String),
    #[error("Failed to propagate trace context: {0}")]
    Propagation(String),
}

/// OTLP exporter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4317".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Resource-level settings for exported traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub service_name: String,
    pub service_version: String,
    pub otlp: OtlpConfig,
    pub resource_attributes: BTreeMap<String, String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "prowjob".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp: OtlpConfig::default(),
            resource_attributes: BTreeMap::new(),
        }
    }
}

/// Build the exporter resource: service identity, configured attributes,
/// then the job's own labels.
pub fn build_resource(config: &TracingConfig, job_labels: &BTreeMap<String, String>) -> Resource {
    let mut attrs = vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
    ];

    for (key, value) in config.resource_attributes.iter().chain(job_labels) {
        attrs.push(KeyValue::new(key.clone(), value.clone()));
    }

    Resource::new(attrs)
}

/// An OTLP provider that flushes and shuts down exactly once, on
/// [`ExportPipeline::shutdown`] or when dropped on an early return.
#[derive(Debug)]
pub struct ExportPipeline {
    provider: TracerProvider,
    shut_down: bool,
}

impl ExportPipeline {
    /// Connect to the collector. Must run inside a Tokio runtime.
    pub fn otlp(
        config: &TracingConfig,
        job_labels: &BTreeMap<String, String>,
        ids: Arc<SpanIdGenerator>,
    ) -> Result<Self, TracerError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp.endpoint)
            .with_timeout(Duration::from_secs(config.otlp.timeout_seconds))
            .build()
            .map_err(|e| TracerError::Init(e.to_string()))?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_sampler(Sampler::AlwaysOn)
            .with_id_generator(SeededIdGenerator::new(ids))
            .with_resource(build_resource(config, job_labels))
            .build();

        info!(endpoint = %config.otlp.endpoint, labels = job_labels.len(), "exporter ready");
        Ok(Self {
            provider,
            shut_down: false,
        })
    }

    pub fn sink(&self) -> OtelSink {
        OtelSink::new(self.provider.tracer(INSTRUMENTATION_NAME))
    }

    /// Flush buffered spans and tear the provider down.
    pub fn shutdown(mut self) -> Result<(), TracerError> {
        self.flush_and_shutdown()
    }

    fn flush_and_shutdown(&mut self) -> Result<(), TracerError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let flush_errors: Vec<String> = self
            .provider
            .force_flush()
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        let shutdown = self.provider.shutdown();

        if !flush_errors.is_empty() {
            return Err(TracerError::Shutdown(flush_errors.join("; ")));
        }
        shutdown.map_err(|e| TracerError::Shutdown(e.to_string()))
    }
}

impl Drop for ExportPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.flush_and_shutdown() {
            error!(error = %e, "span export did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "prowjob");
        assert_eq!(config.otlp.endpoint, "http://localhost:4317");
        assert_eq!(config.otlp.timeout_seconds, 10);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: TracingConfig =
            serde_json::from_str(r#"{"otlp": {"endpoint": "http://collector:4317"}}"#).unwrap();
        assert_eq!(config.otlp.endpoint, "http://collector:4317");
        assert_eq!(config.otlp.timeout_seconds, 10);
        assert_eq!(config.service_name, "prowjob");
    }

    #[test]
    fn test_resource_includes_job_labels() {
        let mut config = TracingConfig::default();
        config
            .resource_attributes
            .insert("deployment.environment".to_string(), "ci".to_string());
        let labels = BTreeMap::from([("prow.k8s.io/job".to_string(), "integ-pilot".to_string())]);

        let resource = build_resource(&config, &labels);
        let get = |key: &'static str| resource.get(opentelemetry::Key::new(key)).map(|v| v.to_string());

        assert_eq!(get("service.name").as_deref(), Some("prowjob"));
        assert_eq!(get("deployment.environment").as_deref(), Some("ci"));
        assert_eq!(get("prow.k8s.io/job").as_deref(), Some("integ-pilot"));
    }
}

//! Command handlers.

use crate::commands::ReconstructArgs;
use crate::config::CliConfig;
use chrono::{DateTime, Duration, Utc};
use console::style;
use prowtrace_core::artifacts::ArtifactSet;
use prowtrace_core::{
    AssemblySummary, MemorySink, Mode, RecordedSpan, SpanContext, SpanIdGenerator, SpanSink, assemble,
};
use prowtrace_store::{ArtifactStore, FilesystemStore, GcsStore, fetch_artifacts};
use prowtrace_trace::{ExportPipeline, TraceContext};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

pub const SELFTEST_SPAN: &str = "selftest";
pub const SELFTEST_STEP_SPAN: &str = "selftest/step";

/// Fetch a job's artifacts and rebuild its trace.
pub async fn reconstruct(
    config: &CliConfig,
    args: ReconstructArgs,
) -> Result<AssemblySummary, Box<dyn std::error::Error>> {
    let store: Box<dyn ArtifactStore> = match (&args.local, &args.job_path) {
        (Some(dir), _) => Box::new(FilesystemStore::new(dir.clone())),
        (None, Some(path)) => Box::new(GcsStore::new(&config.storage_url, path)?),
        (None, None) => return Err("a job path or --local directory is required".into()),
    };

    println!("Fetching artifacts from {}...", style(store.location()).bold());
    let artifacts = fetch_artifacts(store.as_ref()).await?;
    log_job_times(&artifacts);

    let mode = match &args.attach {
        Some(id) => Mode::attach(id)?,
        None => Mode::root(&artifacts.prow_job, &config.job_id_label)?,
    };

    if args.dry_run {
        let sink = MemorySink::new(SpanIdGenerator::from_entropy()?);
        let summary = assemble(&sink, &mode, &artifacts)?;
        for line in render_tree(&sink.spans()) {
            println!("{line}");
        }
        print_summary(&mode, &summary);
        return Ok(summary);
    }

    // Only a root run owns the resource the job's labels describe.
    let labels: BTreeMap<String, String> = match mode {
        Mode::Root(_) => artifacts
            .prow_job
            .labels_with_prefix(&config.label_prefix)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        Mode::Attach(_) => BTreeMap::new(),
    };

    let mut tracing = config.tracing.clone();
    if let Some(endpoint) = args.endpoint {
        tracing.otlp.endpoint = endpoint;
    }

    let ids = Arc::new(SpanIdGenerator::from_entropy()?);
    let pipeline = ExportPipeline::otlp(&tracing, &labels, ids)?;
    let assembled = assemble(&pipeline.sink(), &mode, &artifacts);
    let shutdown = pipeline.shutdown();
    let summary = assembled?;
    shutdown?;

    info!(
        spans = summary.spans,
        events = summary.events,
        skipped_containers = summary.skipped_containers,
        skipped_events = summary.skipped_events,
        unknown_commands = summary.unknown_commands,
        "trace exported"
    );
    print_summary(&mode, &summary);
    Ok(summary)
}

/// Emit a synthetic trace under the root derived from `job_id`.
pub fn selftest(
    config: &CliConfig,
    job_id: &str,
    endpoint: Option<String>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = Mode::attach(job_id)?;
    let now = Utc::now();

    if dry_run {
        let sink = MemorySink::new(SpanIdGenerator::from_entropy()?);
        emit_selftest(&sink, &mode, now)?;
        for line in render_tree(&sink.spans()) {
            println!("{line}");
        }
        return Ok(());
    }

    let mut tracing = config.tracing.clone();
    if let Some(endpoint) = endpoint {
        tracing.otlp.endpoint = endpoint;
    }

    let ids = Arc::new(SpanIdGenerator::from_entropy()?);
    let pipeline = ExportPipeline::otlp(&tracing, &BTreeMap::new(), ids)?;
    let emitted = emit_selftest(&pipeline.sink(), &mode, now);
    let shutdown = pipeline.shutdown();
    let spans = emitted?;
    shutdown?;

    println!(
        "{} Sent {} self-test spans to trace {}",
        style("✓").green(),
        spans,
        mode.identity().trace_id_hex()
    );
    Ok(())
}

/// Two nested spans and an event, ending at `now`.
pub fn emit_selftest<S: SpanSink>(sink: &S, mode: &Mode, now: DateTime<Utc>) -> prowtrace_core::Result<usize> {
    let parent = SpanContext::attached(sink, mode.identity())?;

    let mut test = parent.recording(SELFTEST_SPAN, now - Duration::minutes(1));
    test.event(
        "checkpoint",
        now - Duration::seconds(30),
        &[("source", "prowtrace selftest".to_string())],
    );
    let test = test.end(now);
    test.record(SELFTEST_STEP_SPAN, now - Duration::seconds(50), now - Duration::seconds(10));

    Ok(2)
}

/// Print the trace identity derived from `id`.
pub fn show_id(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mode = Mode::attach(id)?;
    let identity = mode.identity();

    println!("trace id:     {}", style(identity.trace_id_hex()).bold());
    println!("root span id: {}", style(identity.root_span_id_hex()).bold());
    println!("traceparent:  {}", TraceContext::from_identity(identity).to_traceparent());
    Ok(())
}

fn log_job_times(artifacts: &ArtifactSet) {
    let status = &artifacts.prow_job.status;
    info!(
        created = ?artifacts.prow_job.metadata.creation_timestamp,
        job_start = ?status.start_time,
        job_completion = ?status.completion_time,
        started = ?artifacts.started.started_at(),
        finished = ?artifacts.finished.finished_at(),
        "job timestamps"
    );
}

fn print_summary(mode: &Mode, summary: &AssemblySummary) {
    let (verb, trace) = match mode {
        Mode::Root(identity) => ("Reconstructed", identity.trace_id_hex()),
        Mode::Attach(identity) => ("Attached", identity.trace_id_hex()),
    };
    println!(
        "{} {} {} spans and {} events in trace {}",
        style("✓").green(),
        verb,
        summary.spans,
        summary.events,
        style(trace).bold()
    );
    if summary.skipped_containers > 0 {
        println!("  {} containers had not terminated", summary.skipped_containers);
    }
    if summary.skipped_events > 0 {
        println!(
            "  {} {} pod events had no timestamp",
            style("!").yellow(),
            summary.skipped_events
        );
    }
    if summary.unknown_commands > 0 {
        println!(
            "  {} {} clone commands were not recognised",
            style("!").yellow(),
            summary.unknown_commands
        );
    }
}

/// One line per span, indented under its parent, in recording order.
///
/// Spans whose parent was not recorded here (the remote parent in attach
/// mode) start at the left margin.
pub fn render_tree(spans: &[RecordedSpan]) -> Vec<String> {
    let mut depth: HashMap<[u8; 8], usize> = HashMap::new();
    let mut lines = Vec::with_capacity(spans.len());

    for span in spans {
        let level = span
            .parent_id
            .and_then(|parent| depth.get(&parent))
            .map_or(0, |d| d + 1);
        depth.insert(span.span_id, level);

        let (end, duration) = match span.end {
            Some(end) => (end.to_rfc3339(), format_duration(end - span.start)),
            None => ("open".to_string(), "-".to_string()),
        };
        lines.push(format!(
            "{}{}  {}  {}  {}  {}",
            "  ".repeat(level),
            span.name,
            span.start.to_rfc3339(),
            end,
            duration,
            hex::encode(span.span_id)
        ));
    }

    lines
}

fn format_duration(duration: Duration) -> String {
    let millis = duration.num_milliseconds();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{:.3}s", millis as f64 / 1000.0)
    }
}

//! Trace assembly: turns an [`ArtifactSet`] into a span tree.
//!
//! The tree is always
//!
//! ```text
//! job
//! └── pod                      (pod events attached as span events)
//!     ├── pod/schedule
//!     ├── init/<name>
//!     │   └── clone/<org>/<repo>     (clonerefs only)
//!     │       └── git <subcommand>
//!     └── container/<name>
//! ```
//!
//! In attach mode the `job` level is owned by another process and `pod`
//! hangs directly off the remote parent.
//!
//! Every timestamp that could fail the run is resolved in [`Timeline::resolve`]
//! before the first span is opened, so a run either emits a whole tree or
//! nothing.

use crate::artifacts::{ArtifactSet, CloneRecord, ContainerStatus, Pod, ProwJob};
use crate::classify::{UNKNOWN_COMMAND, classify_git_command};
use crate::ids::{JobId, TraceIdentity};
use crate::ports::SpanSink;
use crate::recording::SpanContext;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub const JOB_SPAN: &str = "job";
pub const POD_SPAN: &str = "pod";
pub const SCHEDULE_SPAN: &str = "pod/schedule";
pub const CLONEREFS: &str = "clonerefs";
pub const READY_CONDITION: &str = "Ready";
pub const SCHEDULED_CONDITION: &str = "PodScheduled";

/// Where the reconstructed tree is rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Create the trace root, with ids derived from the job's own id.
    Root(TraceIdentity),
    /// Nest beneath the root another process derived from the same id.
    Attach(TraceIdentity),
}

impl Mode {
    /// Root mode, reading the job id from `label`.
    pub fn root(job: &ProwJob, label: &str) -> Result<Self> {
        Ok(Mode::Root(checked_identity(&job.job_id(label)?)?))
    }

    /// Attach mode for an externally supplied identifier.
    pub fn attach(identifier: &str) -> Result<Self> {
        Ok(Mode::Attach(checked_identity(&JobId::parse(identifier)?)?))
    }

    pub fn identity(&self) -> &TraceIdentity {
        match self {
            Mode::Root(identity) | Mode::Attach(identity) => identity,
        }
    }
}

fn checked_identity(job: &JobId) -> Result<TraceIdentity> {
    let identity = TraceIdentity::derive(job);
    if !identity.is_valid() {
        return Err(Error::InvalidFormat(format!(
            "{job} cannot identify a trace"
        )));
    }
    Ok(identity)
}

/// A clone record placed on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledClone {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub commands: Vec<ScheduledCommand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledCommand {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub error: Option<String>,
}

/// Lay clone records back to back from `start`.
///
/// The archive only keeps durations, so each record starts where the
/// previous one ended, and each command where the previous command ended.
/// Records with an empty org are placeholders: they get no span and take no
/// time.
pub fn schedule_clones(start: DateTime<Utc>, records: &[CloneRecord]) -> Result<Vec<ScheduledClone>> {
    let mut cursor = start;
    let mut scheduled = Vec::new();

    for record in records.iter().filter(|r| !r.refs.org.is_empty()) {
        let name = format!("clone/{}/{}", record.refs.org, record.refs.repo);
        let end = cursor
            .checked_add_signed(record.duration)
            .ok_or_else(|| Error::TimestampOverflow(name.clone()))?;

        let mut command_cursor = cursor;
        let mut commands = Vec::with_capacity(record.commands.len());
        for command in &record.commands {
            let command_end = command_cursor
                .checked_add_signed(command.duration)
                .ok_or_else(|| Error::TimestampOverflow(command.command.clone()))?;
            commands.push(ScheduledCommand {
                label: classify_git_command(&command.command),
                start: command_cursor,
                end: command_end,
                error: (!command.error.is_empty()).then(|| command.error.clone()),
            });
            command_cursor = command_end;
        }

        scheduled.push(ScheduledClone {
            name,
            start: cursor,
            end,
            commands,
        });
        cursor = end;
    }

    Ok(scheduled)
}

/// Every time the walk needs, resolved up front.
#[derive(Debug, Clone)]
pub struct Timeline<'a> {
    pub pod: &'a Pod,
    /// `None` when the job never recorded both start and completion.
    pub job: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub pod_window: (DateTime<Utc>, DateTime<Utc>),
    pub scheduled_at: Option<DateTime<Utc>>,
    pub clones: Vec<ScheduledClone>,
}

impl<'a> Timeline<'a> {
    pub fn resolve(artifacts: &'a ArtifactSet) -> Result<Self> {
        let pod = artifacts
            .pod_report
            .pod
            .as_ref()
            .ok_or_else(|| Error::MissingField("podinfo.pod".to_string()))?;

        let status = &artifacts.prow_job.status;
        let job = status.start_time.zip(status.completion_time);

        let created = pod
            .metadata
            .creation_timestamp
            .ok_or_else(|| Error::MissingField("pod.metadata.creationTimestamp".to_string()))?;

        // A pod that never became Ready (crashed, evicted) ends with the job.
        let pod_end = match pod.status.condition_time(READY_CONDITION) {
            Some(ready) => ready,
            None => artifacts
                .finished
                .finished_at()
                .ok_or_else(|| Error::MissingField("finished.timestamp".to_string()))?,
        };

        let clones = match clonerefs_window(&pod.status.init_container_statuses) {
            Some((start, _)) => schedule_clones(start, &artifacts.clone_records)?,
            None => Vec::new(),
        };

        Ok(Self {
            pod,
            job,
            pod_window: (created, pod_end),
            scheduled_at: pod.status.condition_time(SCHEDULED_CONDITION),
            clones,
        })
    }
}

fn clonerefs_window(statuses: &[ContainerStatus]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    statuses
        .iter()
        .find(|s| s.name == CLONEREFS)
        .and_then(|s| s.terminated())
        .and_then(|t| t.window())
}

/// Counts reported after a reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblySummary {
    pub spans: usize,
    pub events: usize,
    pub skipped_containers: usize,
    /// Pod events with neither a first-seen nor an event time.
    pub skipped_events: usize,
    pub unknown_commands: usize,
}

/// Emit the span tree for `artifacts` into `sink`.
pub fn assemble<S: SpanSink>(sink: &S, mode: &Mode, artifacts: &ArtifactSet) -> Result<AssemblySummary> {
    let timeline = Timeline::resolve(artifacts)?;
    let mut summary = AssemblySummary::default();

    let parent = match mode {
        Mode::Root(identity) => {
            let (start, end) = timeline.job.ok_or_else(|| {
                Error::MissingField("prowjob.status.startTime/completionTime".to_string())
            })?;
            let mut job = SpanContext::root(sink, identity, JOB_SPAN, start);
            summary.spans += 1;

            if let Some(started_at) = artifacts.started.started_at() {
                let mut attrs = vec![("node", artifacts.started.node.clone())];
                if !artifacts.started.repo_commit.is_empty() {
                    attrs.push(("repo_commit", artifacts.started.repo_commit.clone()));
                }
                job.event("started", started_at, &attrs);
                summary.events += 1;
            }
            if let Some(finished_at) = artifacts.finished.finished_at() {
                let passed = artifacts
                    .finished
                    .passed
                    .map_or_else(|| "unknown".to_string(), |p| p.to_string());
                job.event("finished", finished_at, &[("passed", passed)]);
                summary.events += 1;
            }
            job.end(end)
        }
        Mode::Attach(identity) => SpanContext::attached(sink, identity)?,
    };

    let (pod_start, pod_end) = timeline.pod_window;
    let mut pod_recording = parent.recording(POD_SPAN, pod_start);
    summary.spans += 1;
    for event in &artifacts.pod_report.events {
        let Some(seen) = event.first_seen() else {
            warn!(reason = %event.reason, message = %event.message, "pod event has no timestamp, skipping");
            summary.skipped_events += 1;
            continue;
        };
        pod_recording.event(&event.reason, seen, &[("message", event.message.clone())]);
        summary.events += 1;
    }
    let pod = pod_recording.end(pod_end);

    if let Some(scheduled) = timeline.scheduled_at {
        pod.record(SCHEDULE_SPAN, pod_start, scheduled);
        summary.spans += 1;
    }

    let mut clones = Some(&timeline.clones);
    for status in &timeline.pod.status.init_container_statuses {
        let Some((start, end)) = terminated_window(status, &mut summary) else {
            continue;
        };
        let init = pod.record(&format!("init/{}", status.name), start, end);
        summary.spans += 1;

        if status.name == CLONEREFS {
            if let Some(clones) = clones.take() {
                record_clones(&init, clones, &mut summary);
            }
        }
    }

    for status in &timeline.pod.status.container_statuses {
        if let Some((start, end)) = terminated_window(status, &mut summary) {
            pod.record(&format!("container/{}", status.name), start, end);
            summary.spans += 1;
        }
    }

    Ok(summary)
}

fn terminated_window(
    status: &ContainerStatus,
    summary: &mut AssemblySummary,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let Some(terminated) = status.terminated() else {
        debug!(container = %status.name, "container has not terminated, skipping");
        summary.skipped_containers += 1;
        return None;
    };
    let window = terminated.window();
    if window.is_none() {
        warn!(container = %status.name, "terminated container is missing start or finish time");
        summary.skipped_containers += 1;
    }
    window
}

fn record_clones<S: SpanSink>(
    init: &SpanContext<'_, S>,
    clones: &[ScheduledClone],
    summary: &mut AssemblySummary,
) {
    for clone in clones {
        let repo = init.record(&clone.name, clone.start, clone.end);
        summary.spans += 1;

        for command in &clone.commands {
            if command.label == UNKNOWN_COMMAND {
                summary.unknown_commands += 1;
            }
            match &command.error {
                None => {
                    repo.record(&command.label, command.start, command.end);
                }
                Some(error) => {
                    let mut recording = repo.recording(&command.label, command.start);
                    recording.event("error", command.end, &[("error", error.clone())]);
                    recording.end(command.end);
                    summary.events += 1;
                }
            }
            summary.spans += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{CloneCommand, Refs};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 30, 23, 0, 0).unwrap()
    }

    fn record(org: &str, repo: &str, secs: i64) -> CloneRecord {
        CloneRecord {
            refs: Refs {
                org: org.to_string(),
                repo: repo.to_string(),
                ..Default::default()
            },
            duration: Duration::seconds(secs),
            ..Default::default()
        }
    }

    #[test]
    fn test_clones_are_back_to_back() {
        let records = [record("a", "1", 10), record("b", "2", 0), record("c", "3", 25)];
        let scheduled = schedule_clones(t0(), &records).unwrap();

        let windows: Vec<_> = scheduled.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(
            windows,
            vec![
                (t0(), t0() + Duration::seconds(10)),
                (t0() + Duration::seconds(10), t0() + Duration::seconds(10)),
                (t0() + Duration::seconds(10), t0() + Duration::seconds(35)),
            ]
        );
    }

    #[test]
    fn test_empty_org_takes_no_time() {
        let records = [record("a", "1", 10), record("", "", 600), record("c", "3", 5)];
        let scheduled = schedule_clones(t0(), &records).unwrap();

        assert_eq!(scheduled.len(), 2);
        assert_eq!(scheduled[1].name, "clone/c/3");
        assert_eq!(scheduled[1].start, t0() + Duration::seconds(10));
    }

    #[test]
    fn test_commands_start_at_clone_start() {
        let mut rec = record("o", "r", 60);
        rec.commands = vec![
            CloneCommand {
                command: "git init".to_string(),
                duration: Duration::seconds(1),
                ..Default::default()
            },
            CloneCommand {
                command: "git fetch https://github.com/o/r.git".to_string(),
                error: "exit status 128".to_string(),
                duration: Duration::seconds(2),
                ..Default::default()
            },
        ];
        let scheduled = schedule_clones(t0(), &[record("x", "y", 30), rec]).unwrap();
        let commands = &scheduled[1].commands;

        assert_eq!(commands[0].start, t0() + Duration::seconds(30));
        assert_eq!(commands[1].start, t0() + Duration::seconds(31));
        assert_eq!(commands[1].end, t0() + Duration::seconds(33));
        assert_eq!(commands[1].label, "git fetch");
        assert_eq!(commands[1].error.as_deref(), Some("exit status 128"));
    }

    #[test]
    fn test_schedule_overflow_is_an_error() {
        let mut rec = record("o", "r", 0);
        rec.duration = Duration::days(100_000_000);
        let err = schedule_clones(t0(), &[rec]).unwrap_err();
        assert!(matches!(err, Error::TimestampOverflow(_)));
    }

    #[test]
    fn test_attach_rejects_nil_identifier() {
        let err = Mode::attach("00000000-0000-0000-0000-000000000000").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }
}

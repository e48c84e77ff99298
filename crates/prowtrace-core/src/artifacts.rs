//! Archived job artifacts.
//!
//! Only the fields reconstruction reads are modelled; unknown fields are
//! ignored on decode. Kubernetes timestamps that may be `null` in the archive
//! are `Option`s.

use crate::ids::JobId;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The full set of documents one reconstruction consumes.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub prow_job: ProwJob,
    pub started: Started,
    pub finished: Finished,
    pub pod_report: PodReport,
    pub clone_records: Vec<CloneRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// `prowjob.json`: the job object as the controller last saw it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProwJob {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: ProwJobStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProwJobStatus {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: Option<String>,
}

impl ProwJob {
    /// Parse the job id out of the given label.
    pub fn job_id(&self, label: &str) -> Result<JobId> {
        let value = self
            .metadata
            .labels
            .get(label)
            .ok_or_else(|| Error::MissingLabel(label.to_string()))?;
        JobId::parse(value)
    }

    /// Labels whose key starts with `prefix`, in key order.
    pub fn labels_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.metadata
            .labels
            .iter()
            .filter(move |(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// `started.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Started {
    /// Epoch seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub pull: Option<String>,
    #[serde(default)]
    pub repos: BTreeMap<String, String>,
    #[serde(rename = "repo-commit", default)]
    pub repo_commit: String,
}

impl Started {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// `finished.json`. A missing timestamp means the job never finished.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finished {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub passed: Option<bool>,
}

impl Finished {
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// `podinfo.json`: the pod object plus the events recorded against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodReport {
    #[serde(default)]
    pub pod: Option<Pod>,
    #[serde(default)]
    pub events: Vec<PodEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub init_container_statuses: Vec<ContainerStatus>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
}

impl PodStatus {
    /// First condition of the given type, in sequence order.
    pub fn condition(&self, kind: &str) -> Option<&PodCondition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }

    /// Transition time of the first condition of the given type.
    pub fn condition_time(&self, kind: &str) -> Option<DateTime<Utc>> {
        self.condition(kind).and_then(|c| c.last_transition_time)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodEvent {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub first_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: i32,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl PodEvent {
    /// When the event was first seen. Events written through the newer
    /// events API only carry `eventTime`.
    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.first_timestamp.or(self.event_time)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub restart_count: i32,
    #[serde(default)]
    pub image: String,
}

impl ContainerStatus {
    pub fn terminated(&self) -> Option<&Terminated> {
        match &self.state {
            ContainerState::Terminated(t) => Some(t),
            _ => None,
        }
    }
}

/// Container state; Kubernetes populates at most one of its variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContainerState", into = "RawContainerState")]
pub enum ContainerState {
    #[default]
    Absent,
    Waiting(Waiting),
    Running(Running),
    Terminated(Terminated),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waiting {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Running {
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminated {
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub signal: i32,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Terminated {
    /// Start and finish, when both were recorded.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.started_at?, self.finished_at?))
    }
}

/// Wire shape of a container state: independently nullable members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawContainerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    waiting: Option<Waiting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    running: Option<Running>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    terminated: Option<Terminated>,
}

impl TryFrom<RawContainerState> for ContainerState {
    type Error = String;

    fn try_from(raw: RawContainerState) -> std::result::Result<Self, Self::Error> {
        match (raw.waiting, raw.running, raw.terminated) {
            (None, None, None) => Ok(ContainerState::Absent),
            (Some(w), None, None) => Ok(ContainerState::Waiting(w)),
            (None, Some(r), None) => Ok(ContainerState::Running(r)),
            (None, None, Some(t)) => Ok(ContainerState::Terminated(t)),
            _ => Err("container state sets more than one of waiting, running, terminated".into()),
        }
    }
}

impl From<ContainerState> for RawContainerState {
    fn from(state: ContainerState) -> Self {
        let mut raw = RawContainerState::default();
        match state {
            ContainerState::Absent => {}
            ContainerState::Waiting(w) => raw.waiting = Some(w),
            ContainerState::Running(r) => raw.running = Some(r),
            ContainerState::Terminated(t) => raw.terminated = Some(t),
        }
        raw
    }
}

/// One entry of `clone-records.json`: a repository checkout and the git
/// commands it ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloneRecord {
    #[serde(default)]
    pub refs: Refs,
    #[serde(default)]
    pub commands: Vec<CloneCommand>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub final_sha: String,
    #[serde(default, with = "duration_nanos")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Refs {
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub base_ref: String,
    #[serde(default)]
    pub base_sha: String,
    #[serde(default)]
    pub path_alias: String,
    #[serde(default)]
    pub clone_uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloneCommand {
    pub command: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, with = "duration_nanos")]
    pub duration: Duration,
}

/// Durations are archived as integer nanoseconds.
mod duration_nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_nanoseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::nanoseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_state_variants() {
        let terminated: ContainerStatus = serde_json::from_str(
            r#"{"name":"test","state":{"terminated":{"exitCode":1,"reason":"Error",
                "startedAt":"2023-06-30T23:00:10Z","finishedAt":"2023-06-30T23:02:00Z"}}}"#,
        )
        .unwrap();
        let t = terminated.terminated().unwrap();
        assert_eq!(t.exit_code, 1);
        assert!(t.window().is_some());

        let running: ContainerStatus =
            serde_json::from_str(r#"{"name":"sidecar","state":{"running":{}}}"#).unwrap();
        assert!(matches!(running.state, ContainerState::Running(_)));
        assert!(running.terminated().is_none());

        let absent: ContainerStatus = serde_json::from_str(r#"{"name":"bare"}"#).unwrap();
        assert_eq!(absent.state, ContainerState::Absent);
    }

    #[test]
    fn test_container_state_rejects_two_variants() {
        let err = serde_json::from_str::<ContainerStatus>(
            r#"{"name":"x","state":{"running":{},"terminated":{"exitCode":0}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn test_terminated_without_times_has_no_window() {
        let t = Terminated {
            started_at: None,
            ..Default::default()
        };
        assert!(t.window().is_none());
    }

    #[test]
    fn test_condition_first_match_wins() {
        let status: PodStatus = serde_json::from_str(
            r#"{"conditions":[
                {"type":"Ready","lastTransitionTime":"2023-06-30T23:05:00Z"},
                {"type":"Ready","lastTransitionTime":"2023-06-30T23:09:00Z"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            status.condition_time("Ready").unwrap().to_rfc3339(),
            "2023-06-30T23:05:00+00:00"
        );
        assert!(status.condition("PodScheduled").is_none());
    }

    #[test]
    fn test_clone_record_durations_are_nanoseconds() {
        let record: CloneRecord = serde_json::from_str(
            r#"{"refs":{"org":"istio","repo":"istio"},"duration":1500000000,
                "commands":[{"command":"git init","duration":250000000}]}"#,
        )
        .unwrap();
        assert_eq!(record.duration, Duration::milliseconds(1500));
        assert_eq!(record.commands[0].duration, Duration::milliseconds(250));
    }

    #[test]
    fn test_job_id_from_label() {
        let mut job = ProwJob::default();
        assert!(matches!(
            job.job_id("prow.k8s.io/id"),
            Err(Error::MissingLabel(_))
        ));

        job.metadata.labels.insert(
            "prow.k8s.io/id".to_string(),
            "6ba7b810-9dad-11d1-80b4-00c04fd430c8".to_string(),
        );
        job.metadata
            .labels
            .insert("prow.k8s.io/job".to_string(), "integ-pilot".to_string());
        job.metadata
            .labels
            .insert("created-by-prow".to_string(), "true".to_string());

        assert!(job.job_id("prow.k8s.io/id").is_ok());
        let prow: Vec<_> = job.labels_with_prefix("prow.k8s.io/").collect();
        assert_eq!(prow.len(), 2);
        assert_eq!(prow[1], ("prow.k8s.io/job", "integ-pilot"));
    }

    #[test]
    fn test_finished_without_timestamp() {
        let finished: Finished = serde_json::from_str(r#"{"passed":null}"#).unwrap();
        assert!(finished.finished_at().is_none());
    }
}

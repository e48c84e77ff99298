//! Artifact store tests against a mock HTTP bucket and a temp directory.

use prowtrace_core::artifacts::Started;
use prowtrace_store::{
    CLONE_RECORDS_PATH, FINISHED_PATH, FilesystemStore, GcsStore, PODINFO_PATH, PROWJOB_PATH,
    STARTED_PATH, StoreError, fetch, fetch_artifacts,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOB_PATH: &str = "istio-prow/logs/integ-pilot/1674927910177214464";

fn write_fixtures(dir: &std::path::Path) {
    let docs = [
        (
            PROWJOB_PATH,
            r#"{"metadata":{"labels":{"prow.k8s.io/id":"6ba7b810-9dad-11d1-80b4-00c04fd430c8"}},
                "status":{"startTime":"2023-06-30T23:00:00Z","completionTime":"2023-06-30T23:10:00Z"}}"#,
        ),
        (STARTED_PATH, r#"{"timestamp":1688166003,"node":"n1"}"#),
        (FINISHED_PATH, r#"{"timestamp":1688166540,"passed":true}"#),
        (
            PODINFO_PATH,
            r#"{"pod":{"metadata":{"creationTimestamp":"2023-06-30T23:00:05Z"},"status":{}}}"#,
        ),
        (CLONE_RECORDS_PATH, r#"[{"refs":{"org":"o","repo":"r"},"duration":1000}]"#),
    ];
    for (name, body) in docs {
        std::fs::write(dir.join(name), body).unwrap();
    }
}

#[tokio::test]
async fn test_gcs_fetch_decodes_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{JOB_PATH}/started.json")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"timestamp":1688166003,"node":"n1"}"#),
        )
        .mount(&server)
        .await;

    let store = GcsStore::new(&server.uri(), JOB_PATH).unwrap();
    let started: Started = fetch(&store, STARTED_PATH).await.unwrap();

    assert_eq!(started.timestamp, 1688166003);
    assert_eq!(started.node, "n1");
}

#[tokio::test]
async fn test_gcs_missing_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = GcsStore::new(&server.uri(), JOB_PATH).unwrap();
    let err = fetch::<Started, _>(&store, STARTED_PATH).await.unwrap_err();

    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_gcs_server_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = GcsStore::new(&server.uri(), JOB_PATH).unwrap();
    let err = fetch::<Started, _>(&store, STARTED_PATH).await.unwrap_err();

    assert!(matches!(err, StoreError::Transport(_)));
}

#[tokio::test]
async fn test_malformed_document_names_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(STARTED_PATH), "{not json").unwrap();

    let store = FilesystemStore::new(dir.path().to_path_buf());
    let err = fetch::<Started, _>(&store, STARTED_PATH).await.unwrap_err();

    match err {
        StoreError::Malformed { path, .. } => assert_eq!(path, STARTED_PATH),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_artifacts_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let store = FilesystemStore::new(dir.path().to_path_buf());
    let artifacts = fetch_artifacts(&store).await.unwrap();

    assert_eq!(artifacts.started.node, "n1");
    assert_eq!(artifacts.finished.passed, Some(true));
    assert_eq!(artifacts.clone_records.len(), 1);
    assert!(artifacts.pod_report.pod.is_some());
}

#[tokio::test]
async fn test_fetch_artifacts_fails_on_first_missing_document() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    std::fs::remove_file(dir.path().join(PODINFO_PATH)).unwrap();

    let store = FilesystemStore::new(dir.path().to_path_buf());
    let err = fetch_artifacts(&store).await.unwrap_err();

    match err {
        StoreError::NotFound(path) => assert!(path.ends_with(PODINFO_PATH)),
        other => panic!("unexpected error: {other}"),
    }
}

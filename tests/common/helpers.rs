use comfy_fetch::http::{create_http_client, HttpClientConfig};
use comfy_fetch::task::{TaskId, TaskSnapshot};
use comfy_fetch::transfer::{EngineConfig, Progress, TransferEngine};
use comfy_fetch::{TransferService, TransferServiceBuilder};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Upper bound for any condition a test waits on.
pub const WAIT_LIMIT: Duration = Duration::from_secs(15);

/// Installs a test-friendly subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a temporary directory for testing purposes
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Creates test file content of specified size
pub fn create_test_content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Asserts that a file holds exactly `expected`
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let actual = fs::read(path).unwrap_or_else(|e| panic!("cannot read {:?}: {}", path, e));
    assert_eq!(actual.len(), expected.len(), "File size mismatch at {:?}", path);
    assert!(actual == expected, "File content mismatch at {:?}", path);
}

/// Size of the file at `path`, 0 when missing
pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Engine with default settings
pub fn create_test_engine() -> TransferEngine {
    create_test_engine_with(EngineConfig::default())
}

pub fn create_test_engine_with(config: EngineConfig) -> TransferEngine {
    let client = create_http_client(HttpClientConfig::default()).expect("client");
    TransferEngine::new(client, config)
}

/// Service builder with short retry delays
pub fn create_test_service_builder() -> TransferServiceBuilder {
    TransferService::builder()
        .retry_delay(Duration::from_millis(10))
        .read_timeout(Duration::from_secs(5))
}

pub fn create_test_service() -> TransferService {
    create_test_service_builder().build().expect("service")
}

/// Polls until `condition` holds for the task, panicking after [`WAIT_LIMIT`].
pub async fn wait_for<F>(service: &TransferService, id: &TaskId, condition: F) -> TaskSnapshot
where
    F: Fn(&TaskSnapshot) -> bool,
{
    let poll = async {
        loop {
            if let Some(snapshot) = service.poll(id) {
                if condition(&snapshot) {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT_LIMIT, poll)
        .await
        .unwrap_or_else(|_| panic!("task {} never reached the expected state: {:?}", id, service.poll(id)))
}

/// Waits until the task is terminal.
pub async fn wait_terminal(service: &TransferService, id: &TaskId) -> TaskSnapshot {
    wait_for(service, id, |s| s.status.is_terminal()).await
}

/// A sink recording every progress report, and the list it records into.
pub fn recording_sink() -> (impl FnMut(Progress) + Send, Arc<Mutex<Vec<Progress>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let reports = reports.clone();
        move |progress: Progress| reports.lock().unwrap().push(progress)
    };
    (sink, reports)
}

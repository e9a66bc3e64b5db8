//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, OnceLock};

use allure::{InMemoryResultsWriter, Lifecycle};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Routes library logs to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("allure_commons=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Installs an in-memory sink behind the process-wide lifecycle and returns it.
pub fn recording() -> &'static Arc<InMemoryResultsWriter> {
    static WRITER: OnceLock<Arc<InMemoryResultsWriter>> = OnceLock::new();
    WRITER.get_or_init(|| {
        init_tracing();
        let writer = Arc::new(InMemoryResultsWriter::new());
        allure::set_lifecycle(Lifecycle::new(Arc::clone(&writer)))
            .expect("global lifecycle installed twice");
        writer
    })
}

/// A lifecycle over a fresh in-memory sink.
pub fn in_memory() -> (Arc<InMemoryResultsWriter>, Arc<Lifecycle>) {
    init_tracing();
    let writer = Arc::new(InMemoryResultsWriter::new());
    let lifecycle = Arc::new(Lifecycle::new(Arc::clone(&writer)));
    (writer, lifecycle)
}

/// Reads all `-result.json` files from a results directory.
pub fn read_result_files(dir: &Path) -> Vec<Value> {
    let mut results = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.to_string_lossy().ends_with("-result.json") {
            let content = fs::read_to_string(&path).unwrap();
            results.push(serde_json::from_str(&content).unwrap());
        }
    }
    results
}

/// Lists attachment files in a results directory.
pub fn attachment_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.to_string_lossy().contains("-attachment"))
        .collect()
}

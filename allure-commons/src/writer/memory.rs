use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::enums::TestResultType;
use crate::error::{AllureError, AllureResult};
use crate::model::TestResult;

use super::{AttachmentContentWriter, ResultsWriter};

/// Results sink that keeps everything in memory.
///
/// Intended for adapter tests: results and attachment bytes can be inspected
/// after the code under test has run. Share it with the lifecycle through an
/// `Arc` to keep a handle for assertions.
#[derive(Debug, Default)]
pub struct InMemoryResultsWriter {
    results: Mutex<Vec<TestResult>>,
    attachments: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    requested_attachments: Mutex<Vec<String>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryResultsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All written results in write order.
    pub fn results(&self) -> Vec<TestResult> {
        locked(&self.results).clone()
    }

    /// Written results of type [`TestResultType::Test`].
    pub fn test_results(&self) -> Vec<TestResult> {
        self.results_of_kind(TestResultType::Test)
    }

    /// Written set-up fixtures.
    pub fn set_up_results(&self) -> Vec<TestResult> {
        self.results_of_kind(TestResultType::SetUp)
    }

    /// Written tear-down fixtures.
    pub fn tear_down_results(&self) -> Vec<TestResult> {
        self.results_of_kind(TestResultType::TearDown)
    }

    fn results_of_kind(&self, kind: TestResultType) -> Vec<TestResult> {
        locked(&self.results)
            .iter()
            .filter(|result| result.kind == kind)
            .cloned()
            .collect()
    }

    /// Finds a written result by uuid.
    pub fn result(&self, uuid: &str) -> Option<TestResult> {
        locked(&self.results)
            .iter()
            .find(|result| result.uuid.as_deref() == Some(uuid))
            .cloned()
    }

    /// Finds a written result by name.
    pub fn result_named(&self, name: &str) -> Option<TestResult> {
        locked(&self.results)
            .iter()
            .find(|result| result.name == name)
            .cloned()
    }

    /// Attachment content by source.
    pub fn attachment(&self, source: &str) -> Option<Vec<u8>> {
        locked(&self.attachments).get(source).cloned()
    }

    /// All attachment content keyed by source.
    pub fn attachments(&self) -> HashMap<String, Vec<u8>> {
        locked(&self.attachments).clone()
    }

    /// Sources for which a content writer was requested, in request order.
    pub fn requested_attachments(&self) -> Vec<String> {
        locked(&self.requested_attachments).clone()
    }
}

impl ResultsWriter for InMemoryResultsWriter {
    fn write_result(&self, result: &TestResult) -> AllureResult<()> {
        locked(&self.results).push(result.clone());
        Ok(())
    }

    fn write_attachment(&self, source: &str) -> AllureResult<Box<dyn AttachmentContentWriter>> {
        locked(&self.requested_attachments).push(source.to_string());
        Ok(Box::new(InMemoryContentWriter {
            source: source.to_string(),
            attachments: Arc::clone(&self.attachments),
        }))
    }
}

struct InMemoryContentWriter {
    source: String,
    attachments: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl AttachmentContentWriter for InMemoryContentWriter {
    fn write_bytes(self: Box<Self>, content: &[u8]) -> AllureResult<()> {
        let mut attachments = locked(&self.attachments);
        if attachments.contains_key(&self.source) {
            return Err(AllureError::invalid_attachment(format!(
                "content for {} already written",
                self.source
            )));
        }
        attachments.insert(self.source.clone(), content.to_vec());
        Ok(())
    }
}

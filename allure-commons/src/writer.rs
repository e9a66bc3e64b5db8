//! Results sinks: where finished test results and attachment content go.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::AllureResult;
use crate::model::{Parameter, TestResult};

mod memory;

pub use memory::InMemoryResultsWriter;

/// Default directory for Allure results.
pub const DEFAULT_RESULTS_DIR: &str = "allure-results";

/// Destination for finished test results and attachment content.
///
/// Implementations are shared by every thread running tests, so they must be
/// safe for concurrent use. Failures are returned to the lifecycle, which
/// logs them and carries on.
pub trait ResultsWriter: Send + Sync {
    /// Persists a finished test or fixture result.
    fn write_result(&self, result: &TestResult) -> AllureResult<()>;

    /// Allocates a content writer for the attachment stored under `source`.
    fn write_attachment(&self, source: &str) -> AllureResult<Box<dyn AttachmentContentWriter>>;
}

impl<W: ResultsWriter + ?Sized> ResultsWriter for Arc<W> {
    fn write_result(&self, result: &TestResult) -> AllureResult<()> {
        (**self).write_result(result)
    }

    fn write_attachment(&self, source: &str) -> AllureResult<Box<dyn AttachmentContentWriter>> {
        (**self).write_attachment(source)
    }
}

/// One-shot handle that accepts the content of a single attachment.
///
/// Every method consumes the handle, so content is written at most once and
/// any underlying resource is released when the call returns.
pub trait AttachmentContentWriter: Send {
    /// Writes raw bytes.
    fn write_bytes(self: Box<Self>, content: &[u8]) -> AllureResult<()>;

    /// Writes UTF-8 text.
    fn write_text(self: Box<Self>, content: &str) -> AllureResult<()> {
        self.write_bytes(content.as_bytes())
    }

    /// Drains a reader into the attachment. The reader is dropped afterwards.
    fn write_stream(self: Box<Self>, mut content: Box<dyn Read + Send + '_>) -> AllureResult<()> {
        let mut buffer = Vec::new();
        content.read_to_end(&mut buffer)?;
        self.write_bytes(&buffer)
    }
}

/// Content writer that accepts and drops everything.
///
/// Handed out when there is nothing to attach to, or when the sink could not
/// allocate a real writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardContentWriter;

impl AttachmentContentWriter for DiscardContentWriter {
    fn write_bytes(self: Box<Self>, _content: &[u8]) -> AllureResult<()> {
        Ok(())
    }

    fn write_stream(self: Box<Self>, content: Box<dyn Read + Send + '_>) -> AllureResult<()> {
        drop(content);
        Ok(())
    }
}

/// Writer for Allure result files in a results directory.
#[derive(Debug, Clone)]
pub struct FileSystemResultsWriter {
    results_dir: PathBuf,
}

impl FileSystemResultsWriter {
    /// Creates a new writer with the default results directory.
    pub fn new() -> Self {
        Self::with_results_dir(DEFAULT_RESULTS_DIR)
    }

    /// Creates a new writer with a custom results directory.
    pub fn with_results_dir(path: impl AsRef<Path>) -> Self {
        Self {
            results_dir: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the results directory path.
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Initializes the results directory, optionally cleaning it first.
    pub fn init(&self, clean: bool) -> io::Result<()> {
        if clean && self.results_dir.exists() {
            fs::remove_dir_all(&self.results_dir)?;
        }
        fs::create_dir_all(&self.results_dir)
    }

    fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.results_dir)
    }

    /// Path of the result file for the given uuid.
    pub fn result_path(&self, uuid: &str) -> PathBuf {
        self.results_dir.join(format!("{}-result.json", uuid))
    }
}

impl Default for FileSystemResultsWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsWriter for FileSystemResultsWriter {
    fn write_result(&self, result: &TestResult) -> AllureResult<()> {
        self.ensure_dir()?;
        let uuid = result.uuid.clone().unwrap_or_else(generate_uuid);
        let path = self.result_path(&uuid);
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), "wrote test result");
        Ok(())
    }

    fn write_attachment(&self, source: &str) -> AllureResult<Box<dyn AttachmentContentWriter>> {
        self.ensure_dir()?;
        Ok(Box::new(FileSystemAttachmentContentWriter::new(
            self.results_dir.join(source),
        )))
    }
}

/// Writes attachment content to a single file that must not exist yet.
#[derive(Debug)]
pub struct FileSystemAttachmentContentWriter {
    output_file: PathBuf,
}

impl FileSystemAttachmentContentWriter {
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
        }
    }

    fn create(&self) -> io::Result<fs::File> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.output_file)
    }
}

impl AttachmentContentWriter for FileSystemAttachmentContentWriter {
    fn write_bytes(self: Box<Self>, content: &[u8]) -> AllureResult<()> {
        let mut file = self.create()?;
        file.write_all(content)?;
        Ok(())
    }

    fn write_stream(self: Box<Self>, mut content: Box<dyn Read + Send + '_>) -> AllureResult<()> {
        let mut file = self.create()?;
        io::copy(&mut content, &mut file)?;
        Ok(())
    }
}

/// Generates a new UUID v4 string.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns the lowercase hex MD5 digest of the given parts fed in order.
pub fn md5_hex<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

/// Computes a history id from a full name and parameters.
///
/// Parameters are sorted by name, then value, so the id does not depend on
/// the order in which they were recorded.
pub fn compute_history_id<'a>(
    full_name: &str,
    parameters: impl IntoIterator<Item = &'a Parameter>,
) -> String {
    let mut sorted: Vec<&Parameter> = parameters.into_iter().collect();
    sorted.sort();

    let mut parts: Vec<&[u8]> = vec![full_name.as_bytes()];
    for param in sorted {
        parts.push(param.name.as_bytes());
        parts.push(param.value.as_bytes());
    }
    md5_hex(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Status;
    use crate::error::AllureError;
    use crate::model::Executable;
    use tempfile::TempDir;

    #[test]
    fn test_writer_init_cleans_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("results");
        let writer = FileSystemResultsWriter::with_results_dir(&dir);
        writer.init(true).unwrap();
        fs::write(dir.join("stale.json"), "{}").unwrap();

        writer.init(true).unwrap();
        assert!(dir.exists());
        assert!(!dir.join("stale.json").exists());
    }

    #[test]
    fn test_write_test_result() {
        let temp = TempDir::new().unwrap();
        let writer = FileSystemResultsWriter::with_results_dir(temp.path());

        let mut result = TestResult::new("My Test").with_uuid("test-123");
        result.set_status(Status::Passed, None, None);
        writer.write_result(&result).unwrap();

        let path = writer.result_path("test-123");
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"uuid\": \"test-123\""));
        assert!(content.contains("\"status\": \"passed\""));
    }

    #[test]
    fn test_results_dir_that_is_a_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("results");
        fs::write(&file, "not a directory").unwrap();
        let writer = FileSystemResultsWriter::with_results_dir(&file);

        assert!(matches!(
            writer.write_attachment("a-attachment.txt"),
            Err(AllureError::Io(_))
        ));
        assert!(matches!(
            writer.write_result(&TestResult::new("t").with_uuid("u")),
            Err(AllureError::Io(_))
        ));
    }

    #[test]
    fn test_attachment_is_written_once() {
        let temp = TempDir::new().unwrap();
        let writer = FileSystemResultsWriter::with_results_dir(temp.path());

        writer
            .write_attachment("a-attachment.txt")
            .unwrap()
            .write_text("first")
            .unwrap();
        let second = writer
            .write_attachment("a-attachment.txt")
            .unwrap()
            .write_text("second");

        assert!(second.is_err());
        let content = fs::read_to_string(temp.path().join("a-attachment.txt")).unwrap();
        assert_eq!(content, "first");
    }

    #[test]
    fn test_stream_attachment() {
        let temp = TempDir::new().unwrap();
        let writer = FileSystemResultsWriter::with_results_dir(temp.path());

        let reader = io::Cursor::new(b"streamed bytes".to_vec());
        writer
            .write_attachment("s-attachment.bin")
            .unwrap()
            .write_stream(Box::new(reader))
            .unwrap();

        let content = fs::read(temp.path().join("s-attachment.bin")).unwrap();
        assert_eq!(content, b"streamed bytes");
    }

    #[test]
    fn test_discard_writer_accepts_everything() {
        let writer: Box<dyn AttachmentContentWriter> = Box::new(DiscardContentWriter);
        assert!(writer.write_text("ignored").is_ok());
        let writer: Box<dyn AttachmentContentWriter> = Box::new(DiscardContentWriter);
        assert!(writer.write_stream(Box::new(io::empty())).is_ok());
    }

    #[test]
    fn test_compute_history_id_is_order_independent() {
        let forward = vec![Parameter::new("a", "1"), Parameter::new("b", "2")];
        let reversed = vec![Parameter::new("b", "2"), Parameter::new("a", "1")];

        let id1 = compute_history_id("Suite.test", &forward);
        let id2 = compute_history_id("Suite.test", &reversed);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 32);

        let id3 = compute_history_id("Suite.other", &forward);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_md5_hex_known_value() {
        assert_eq!(md5_hex([b"".as_slice()]), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_generate_uuid() {
        let uuid1 = generate_uuid();
        let uuid2 = generate_uuid();
        assert_ne!(uuid1, uuid2);
        assert_eq!(uuid1.len(), 36);
    }
}

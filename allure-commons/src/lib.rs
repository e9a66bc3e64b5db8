//! Allure Commons - lifecycle and context tracking for Allure test reporting.
//!
//! This crate records what instrumented tests do and hands the results to a
//! sink for the Allure report generator. It includes:
//!
//! - The Allure data model (test results, steps, attachments, labels, links)
//! - A [`Lifecycle`] that tracks the open test and nested steps of every
//!   thread or task, with explicit propagation into spawned work
//! - Results sinks writing to the `allure-results` directory or to memory
//! - The instrumented call boundary ([`runtime`]) that turns panics and
//!   errors into statuses
//! - Adapters for fixture graphs and BDD scenarios
//!
//! # Example
//!
//! ```
//! use allure_commons::{runtime, InMemoryResultsWriter, Lifecycle, Status, StepResult, TestResult};
//! use std::sync::Arc;
//!
//! let writer = Arc::new(InMemoryResultsWriter::new());
//! let lifecycle = Lifecycle::new(Arc::clone(&writer));
//!
//! runtime::run_test(&lifecycle, TestResult::new("checkout"), || {
//!     runtime::run_step(&lifecycle, StepResult::new("Add item"), || {
//!         lifecycle.update_test(|test| test.add_label("feature", "cart"));
//!     });
//! });
//!
//! let result = writer.result_named("checkout").unwrap();
//! assert_eq!(result.status, Some(Status::Passed));
//! assert_eq!(result.steps.len(), 1);
//! ```

pub mod adapter;
pub mod config;
pub mod context;
pub mod enums;
pub mod error;
pub mod lifecycle;
pub mod listener;
pub mod model;
pub mod outcome;
pub mod runtime;
pub mod writer;

pub use adapter::{FixtureScope, FixtureTracker, ScenarioRecorder};
pub use config::{configure, AllureConfig, AllureConfigBuilder};
pub use context::{ContextHandoff, ExecutionId};
pub use enums::{ContentType, LabelName, LinkType, Severity, Stage, Status, TestResultType};
pub use error::{AllureError, AllureResult};
pub use lifecycle::{depends_on, step_outcome, step_passed, test_outcome, Current, Lifecycle, LifecycleBuilder};
pub use listener::{LifecycleNotifier, StepLifecycleListener, TestLifecycleListener};
pub use model::{Attachment, Executable, Label, Link, Parameter, StepResult, TestResult};
pub use outcome::Outcome;
pub use writer::{
    compute_history_id, generate_uuid, AttachmentContentWriter, DiscardContentWriter,
    FileSystemResultsWriter, InMemoryResultsWriter, ResultsWriter, DEFAULT_RESULTS_DIR,
};

// Re-export futures for async panic handling
#[cfg(feature = "async")]
pub use futures;

//! # Allure
//!
//! Thread-aware [Allure](https://allurereport.org/) reporting for Rust tests.
//!
//! The free functions in this crate act on the process-wide [`lifecycle()`]
//! and the test or step currently open on the calling thread:
//!
//! - Test metadata (epic, feature, story, severity, owner, tags, links)
//! - Nested steps, including BDD-style given/when/then
//! - Attachments, written synchronously or from a background producer
//! - Propagation of the current test into spawned threads and tasks
//!
//! ## Quick Start
//!
//! ```no_run
//! use allure::prelude::*;
//!
//! allure::run_test("login", "auth::login", || {
//!     epic("User Management");
//!     severity(Severity::Critical);
//!
//!     step("Open the login page", || {
//!         attach_text("url", "https://example.com/login");
//!     });
//!     bdd::then("the user is signed in", || assert!(true));
//! });
//! ```
//!
//! ## Configuration
//!
//! The fallback lifecycle writes into `ALLURE_RESULTS_DIRECTORY`
//! (`allure-results` by default). Install an explicit one before the first
//! test touches the API:
//!
//! ```no_run
//! let lifecycle = allure::configure()
//!     .results_dir("target/allure-results")
//!     .build_lifecycle()
//!     .unwrap();
//! allure::set_lifecycle(lifecycle).unwrap();
//! ```

use std::io::Read;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use tracing::{error, warn};

pub use allure_commons::runtime;
pub use allure_commons::*;

static LIFECYCLE: OnceLock<Arc<Lifecycle>> = OnceLock::new();

/// Returns the process-wide lifecycle, creating it from the environment on
/// first use.
pub fn lifecycle() -> &'static Arc<Lifecycle> {
    LIFECYCLE.get_or_init(|| Arc::new(fallback_lifecycle()))
}

fn fallback_lifecycle() -> Lifecycle {
    let config = AllureConfig::from_env().unwrap_or_else(|err| {
        warn!(error = %err, "invalid Allure configuration, using defaults");
        AllureConfig {
            clean_results: false,
            ..AllureConfig::default()
        }
    });
    if let Err(err) = config.init() {
        error!(results_dir = %config.results_dir, error = %err, "could not prepare results directory");
    }
    Lifecycle::new(config.writer())
}

/// Installs the process-wide lifecycle.
///
/// Fails if a lifecycle was already installed or the fallback was already
/// created by an earlier call.
pub fn set_lifecycle(lifecycle: impl Into<Arc<Lifecycle>>) -> AllureResult<()> {
    LIFECYCLE
        .set(lifecycle.into())
        .map_err(|_| AllureError::configuration("the Allure lifecycle is already initialized"))
}

fn update_test<F>(update: F)
where
    F: FnOnce(&mut TestResult),
{
    lifecycle().update_test(update);
}

/// Runs `body` as a test named `name` and writes its result.
///
/// A panic marks the test failed and is resumed after the result is written.
pub fn run_test<F, R>(name: &str, full_name: &str, body: F) -> R
where
    F: FnOnce() -> R,
{
    runtime::run_test(
        lifecycle(),
        TestResult::new(name).with_full_name(full_name),
        body,
    )
}

// === Metadata ===

/// Adds a label to the current test.
pub fn label(name: impl Into<String>, value: impl Into<String>) {
    let label = Label::new(name, value);
    update_test(|test| {
        test.labels.insert(label);
    });
}

/// Adds several labels to the current test.
pub fn labels<I, K, V>(labels: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let labels: Vec<Label> = labels
        .into_iter()
        .map(|(name, value)| Label::new(name, value))
        .collect();
    update_test(|test| test.labels.extend(labels));
}

/// Adds an epic label to the current test.
pub fn epic(name: impl Into<String>) {
    let label = Label::epic(name);
    update_test(|test| {
        test.labels.insert(label);
    });
}

/// Adds a feature label to the current test.
pub fn feature(name: impl Into<String>) {
    let label = Label::feature(name);
    update_test(|test| {
        test.labels.insert(label);
    });
}

/// Adds a story label to the current test.
pub fn story(name: impl Into<String>) {
    let label = Label::story(name);
    update_test(|test| {
        test.labels.insert(label);
    });
}

/// Adds a suite label to the current test.
pub fn suite(name: impl Into<String>) {
    let label = Label::suite(name);
    update_test(|test| {
        test.labels.insert(label);
    });
}

/// Adds a severity label to the current test.
pub fn severity(severity: Severity) {
    update_test(|test| {
        test.labels.insert(Label::severity(severity));
    });
}

/// Adds an owner label to the current test.
pub fn owner(name: impl Into<String>) {
    let label = Label::owner(name);
    update_test(|test| {
        test.labels.insert(label);
    });
}

/// Adds a tag label to the current test.
pub fn tag(name: impl Into<String>) {
    let label = Label::tag(name);
    update_test(|test| {
        test.labels.insert(label);
    });
}

/// Adds a generic link to the current test.
pub fn link(url: impl Into<String>, name: Option<String>) {
    let link = Link::new(url, name);
    update_test(|test| test.add_link(link));
}

/// Adds an issue link to the current test.
pub fn issue(url: impl Into<String>, name: Option<String>) {
    let link = Link::issue(url, name);
    update_test(|test| test.add_link(link));
}

/// Adds a TMS link to the current test.
pub fn tms(url: impl Into<String>, name: Option<String>) {
    let link = Link::tms(url, name);
    update_test(|test| test.add_link(link));
}

/// Sets the test description (markdown).
pub fn description(text: impl Into<String>) {
    let text = text.into();
    update_test(|test| test.description = Some(text));
}

/// Sets the test description (HTML).
pub fn description_html(html: impl Into<String>) {
    let html = html.into();
    update_test(|test| test.description_html = Some(html));
}

/// Adds a parameter to the current step, or to the test outside of steps.
pub fn parameter(name: impl Into<String>, value: impl ToString) {
    let parameter = Parameter::new(name, value.to_string());
    let lifecycle = lifecycle();
    if lifecycle.current_step().is_some() {
        lifecycle.update_step(|step| {
            step.parameters.insert(parameter);
        });
    } else {
        lifecycle.update_test(|test| {
            test.parameters.insert(parameter);
        });
    }
}

/// Marks the current test as flaky.
pub fn flaky() {
    update_test(|test| test.flaky = true);
}

/// Marks the current test as muted. Muted tests do not count in statistics.
pub fn muted() {
    update_test(|test| test.muted = true);
}

/// Marks the current test as failing because of a known issue, and links it.
pub fn known_issue(issue_id: impl Into<String>) {
    let id = issue_id.into();
    let link = Link::issue(id.clone(), Some(id));
    update_test(|test| {
        test.known = true;
        test.add_link(link);
    });
}

// === Steps ===

/// Executes a step with the given name and body.
///
/// Steps nest: a step started inside another step's body becomes its child.
/// The step is failed if the body panics, and the panic is resumed.
///
/// ```no_run
/// use allure::step;
///
/// let sum = step("Calculate result", || {
///     step("Load operands", || {});
///     2 + 2
/// });
/// assert_eq!(sum, 4);
/// ```
pub fn step<F, R>(name: impl Into<String>, body: F) -> R
where
    F: FnOnce() -> R,
{
    runtime::run_step(lifecycle(), StepResult::new(name), body)
}

/// Executes a fallible step. An `Err` marks the step broken.
pub fn try_step<F, T, E>(name: impl Into<String>, body: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Debug + std::fmt::Display,
{
    runtime::try_step(lifecycle(), StepResult::new(name), body)
}

/// Logs a step without a body.
pub fn log_step(name: impl Into<String>, status: Status) {
    runtime::log_step(lifecycle(), name, status);
}

// === Attachments ===

/// Attaches text content to the current test or step.
pub fn attach_text(name: &str, content: impl AsRef<str>) {
    let writer = lifecycle().add_attachment(
        name,
        Some(ContentType::Text.as_mime()),
        Some(ContentType::Text.extension()),
    );
    if let Err(err) = writer.write_text(content.as_ref()) {
        error!(attachment = %name, error = %err, "could not write attachment content");
    }
}

/// Attaches binary content to the current test or step.
pub fn attach_bytes(name: &str, content: &[u8], content_type: ContentType) {
    let writer = lifecycle().add_attachment(
        name,
        Some(content_type.as_mime()),
        Some(content_type.extension()),
    );
    if let Err(err) = writer.write_bytes(content) {
        error!(attachment = %name, error = %err, "could not write attachment content");
    }
}

/// Attaches everything read from `reader` to the current test or step.
pub fn attach_stream<R>(name: &str, reader: R, content_type: ContentType)
where
    R: Read + Send,
{
    runtime::attach_stream(
        lifecycle(),
        name,
        Some(content_type.as_mime()),
        Some(content_type.extension()),
        reader,
    );
}

/// Attaches a value serialized as pretty JSON.
pub fn attach_json<T: serde::Serialize>(name: &str, value: &T) {
    match serde_json::to_vec_pretty(value) {
        Ok(content) => attach_bytes(name, &content, ContentType::Json),
        Err(err) => error!(attachment = %name, error = %err, "could not serialize attachment"),
    }
}

/// Attaches content produced on a background thread.
///
/// The attachment keeps its position among the current unit's attachments;
/// its content is written when `produce` returns. Join the handle before the
/// test ends if the content must be on disk with the result.
pub fn attach_bytes_async<F, C>(name: &str, content_type: ContentType, produce: F) -> JoinHandle<()>
where
    F: FnOnce() -> C + Send + 'static,
    C: AsRef<[u8]>,
{
    runtime::attach_async(
        lifecycle(),
        name,
        Some(content_type.as_mime()),
        Some(content_type.extension()),
        produce,
    )
}

// === Propagation ===

/// Spawns a thread that reports into the calling thread's current test.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    lifecycle().spawn(f)
}

/// BDD-style step functions for behavior-driven testing.
pub mod bdd {
    use crate::step;

    /// Executes a "Given" step (precondition).
    pub fn given<F, R>(description: impl Into<String>, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        step(format!("Given {}", description.into()), body)
    }

    /// Executes a "When" step (action).
    pub fn when<F, R>(description: impl Into<String>, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        step(format!("When {}", description.into()), body)
    }

    /// Executes a "Then" step (assertion).
    pub fn then<F, R>(description: impl Into<String>, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        step(format!("Then {}", description.into()), body)
    }

    /// Executes an "And" step.
    pub fn and<F, R>(description: impl Into<String>, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        step(format!("And {}", description.into()), body)
    }

    /// Executes a "But" step.
    pub fn but<F, R>(description: impl Into<String>, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        step(format!("But {}", description.into()), body)
    }
}

/// Prelude module for convenient imports.
///
/// Use `use allure::prelude::*;` to import commonly used items.
pub mod prelude {
    pub use crate::{
        attach_bytes, attach_bytes_async, attach_json, attach_stream, attach_text, bdd,
        description, description_html, epic, feature, flaky, issue, known_issue, label, labels,
        lifecycle, link, log_step, muted, owner, parameter, run_test, severity, spawn, step,
        story, suite, tag, tms, try_step,
    };

    pub use allure_commons::{
        ContentType, Label, Lifecycle, Link, Parameter, Severity, Status, StepResult, TestResult,
    };
}

//! The instrumented call boundary.
//!
//! These functions wrap a piece of user code in a test or step: they open the
//! unit, run the body, classify what happened into an [`Outcome`], close the
//! unit and hand control back exactly as the body left it. Panics are
//! recorded and then resumed, so the host framework still sees them.

use std::io::Read;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use tracing::error;

use crate::enums::{LabelName, Stage, Status};
use crate::lifecycle::{step_outcome, Lifecycle};
use crate::model::{Label, StepResult, TestResult};
use crate::outcome::Outcome;
use crate::writer::compute_history_id;

/// Runs `body` as a step of the current test or step.
///
/// The step is passed if `body` returns and failed if it panics; the panic is
/// resumed afterwards. Without an active test the body still runs, nothing
/// is recorded.
///
/// # Example
///
/// ```
/// use allure_commons::{runtime, InMemoryResultsWriter, Lifecycle, StepResult, TestResult};
///
/// let lifecycle = Lifecycle::new(InMemoryResultsWriter::new());
/// runtime::run_test(&lifecycle, TestResult::new("login"), || {
///     let token = runtime::run_step(&lifecycle, StepResult::new("Request token"), || "abc");
///     assert_eq!(token, "abc");
/// });
/// ```
pub fn run_step<F, R>(lifecycle: &Lifecycle, step: StepResult, body: F) -> R
where
    F: FnOnce() -> R,
{
    let started = lifecycle.start_step(step);
    let result = catch_unwind(AssertUnwindSafe(body));

    if started {
        let outcome = match &result {
            Ok(_) => Outcome::Passed,
            Err(payload) => Outcome::from_panic(payload.as_ref()),
        };
        lifecycle.update_step(step_outcome(outcome));
        lifecycle.stop_step();
    }

    match result {
        Ok(value) => value,
        Err(payload) => resume_unwind(payload),
    }
}

/// Runs a fallible `body` as a step. An `Err` marks the step broken and is
/// returned unchanged.
pub fn try_step<F, T, E>(lifecycle: &Lifecycle, step: StepResult, body: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Debug + std::fmt::Display,
{
    let started = lifecycle.start_step(step);
    let result = catch_unwind(AssertUnwindSafe(body));

    if started {
        let outcome = match &result {
            Ok(returned) => Outcome::from_result(returned),
            Err(payload) => Outcome::from_panic(payload.as_ref()),
        };
        lifecycle.update_step(step_outcome(outcome));
        lifecycle.stop_step();
    }

    match result {
        Ok(returned) => returned,
        Err(payload) => resume_unwind(payload),
    }
}

/// Records a step with no body.
pub fn log_step(lifecycle: &Lifecycle, name: impl Into<String>, status: Status) {
    if lifecycle.start_step(StepResult::new(name)) {
        lifecycle.update_step(step_outcome(Outcome::from(status)));
        lifecycle.stop_step();
    }
}

/// Adds the labels every result carries: language, framework, host and thread.
fn add_default_labels(result: &mut TestResult) {
    for (name, label) in [
        (LabelName::Language, Some(Label::from_name(LabelName::Language, "rust"))),
        (LabelName::Framework, Some(Label::from_name(LabelName::Framework, "allure-rs"))),
        (LabelName::Host, Label::current_host()),
        (LabelName::Thread, Some(Label::current_thread())),
    ] {
        if result.label_values(name.as_str()).next().is_none() {
            if let Some(label) = label {
                result.labels.insert(label);
            }
        }
    }
}

fn finish_test(lifecycle: &Lifecycle, uuid: &str, outcome: Outcome) {
    lifecycle.update_test_by_uuid(uuid, |test| {
        // An explicit status set by the body wins over a plain pass.
        if outcome != Outcome::Passed || test.status.is_none() {
            outcome.apply(test);
        }
        test.stage = Stage::Finished;
        if test.history_id.is_none() {
            if let Some(full_name) = &test.full_name {
                test.history_id = Some(compute_history_id(full_name, &test.parameters));
            }
        }
    });
    lifecycle.stop_test();
    lifecycle.write_test(uuid);
}

/// Runs `body` as a complete test: start, outcome, stop and write.
///
/// A panic marks the test failed and is resumed after the result is written.
pub fn run_test<F, R>(lifecycle: &Lifecycle, mut result: TestResult, body: F) -> R
where
    F: FnOnce() -> R,
{
    add_default_labels(&mut result);
    let uuid = lifecycle.start_test(result);
    let returned = catch_unwind(AssertUnwindSafe(body));

    let outcome = match &returned {
        Ok(_) => Outcome::Passed,
        Err(payload) => Outcome::from_panic(payload.as_ref()),
    };
    finish_test(lifecycle, &uuid, outcome);

    match returned {
        Ok(value) => value,
        Err(payload) => resume_unwind(payload),
    }
}

/// Attaches content produced on a background thread.
///
/// The attachment is recorded on the caller's innermost active unit right
/// away, so it keeps its place in the tree; the content is written when
/// `produce` finishes. A panicking producer leaves the content empty.
pub fn attach_async<F, C>(
    lifecycle: &Lifecycle,
    name: &str,
    content_type: Option<&str>,
    extension: Option<&str>,
    produce: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> C + Send + 'static,
    C: AsRef<[u8]>,
{
    let writer = lifecycle.add_attachment(name, content_type, extension);
    let name = name.to_string();
    std::thread::spawn(move || match catch_unwind(AssertUnwindSafe(produce)) {
        Ok(content) => {
            if let Err(err) = writer.write_bytes(content.as_ref()) {
                error!(attachment = %name, error = %err, "could not write attachment content");
            }
        }
        Err(_) => error!(attachment = %name, "attachment producer panicked"),
    })
}

/// Attaches content read from `reader` to the innermost active unit.
pub fn attach_stream<R>(
    lifecycle: &Lifecycle,
    name: &str,
    content_type: Option<&str>,
    extension: Option<&str>,
    reader: R,
) where
    R: Read + Send,
{
    let writer = lifecycle.add_attachment(name, content_type, extension);
    if let Err(err) = writer.write_stream(Box::new(reader)) {
        error!(attachment = %name, error = %err, "could not write attachment content");
    }
}

/// Attaches the output of a future, written once it resolves on the tokio
/// runtime.
#[cfg(feature = "tokio")]
pub fn attach_future<F>(
    lifecycle: &Lifecycle,
    name: &str,
    content_type: Option<&str>,
    extension: Option<&str>,
    content: F,
) -> tokio::task::JoinHandle<()>
where
    F: std::future::Future + Send + 'static,
    F::Output: AsRef<[u8]> + Send,
{
    let writer = lifecycle.add_attachment(name, content_type, extension);
    let name = name.to_string();
    tokio::spawn(async move {
        let content = content.await;
        if let Err(err) = writer.write_bytes(content.as_ref()) {
            error!(attachment = %name, error = %err, "could not write attachment content");
        }
    })
}

/// Async counterpart of [`run_step`].
///
/// Every poll must happen on the same execution context, so on a
/// multi-threaded runtime run the enclosing task inside
/// [`Lifecycle::scope_current`].
#[cfg(feature = "async")]
pub async fn run_step_async<Fut, R>(lifecycle: &Lifecycle, step: StepResult, body: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    use futures::FutureExt;

    let started = lifecycle.start_step(step);
    let result = AssertUnwindSafe(body).catch_unwind().await;

    if started {
        let outcome = match &result {
            Ok(_) => Outcome::Passed,
            Err(payload) => Outcome::from_panic(payload.as_ref()),
        };
        lifecycle.update_step(step_outcome(outcome));
        lifecycle.stop_step();
    }

    match result {
        Ok(value) => value,
        Err(payload) => resume_unwind(payload),
    }
}

/// Async counterpart of [`run_test`], with the same execution context
/// requirement as [`run_step_async`].
#[cfg(feature = "async")]
pub async fn run_test_async<Fut, R>(lifecycle: &Lifecycle, mut result: TestResult, body: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    use futures::FutureExt;

    add_default_labels(&mut result);
    let uuid = lifecycle.start_test(result);
    let returned = AssertUnwindSafe(body).catch_unwind().await;

    let outcome = match &returned {
        Ok(_) => Outcome::Passed,
        Err(payload) => Outcome::from_panic(payload.as_ref()),
    };
    finish_test(lifecycle, &uuid, outcome);

    match returned {
        Ok(value) => value,
        Err(payload) => resume_unwind(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::InMemoryResultsWriter;
    use std::sync::Arc;

    fn lifecycle() -> (Arc<InMemoryResultsWriter>, Lifecycle) {
        let writer = Arc::new(InMemoryResultsWriter::new());
        let lifecycle = Lifecycle::new(Arc::clone(&writer));
        (writer, lifecycle)
    }

    #[test]
    fn test_run_test_passes_and_writes() {
        let (writer, lifecycle) = lifecycle();
        let value = run_test(
            &lifecycle,
            TestResult::new("adds").with_full_name("math::adds"),
            || {
                run_step(&lifecycle, StepResult::new("add"), || 2 + 2)
            },
        );
        assert_eq!(value, 4);

        let result = writer.result_named("adds").unwrap();
        assert_eq!(result.status, Some(Status::Passed));
        assert_eq!(result.stage, Stage::Finished);
        assert!(result.history_id.is_some());
        assert!(result.stop.is_some());
        assert_eq!(result.label_values("language").collect::<Vec<_>>(), vec!["rust"]);
        assert_eq!(result.steps[0].status, Some(Status::Passed));
        assert!(lifecycle.current().is_none());
    }

    #[test]
    fn test_panic_fails_step_and_test() {
        let (writer, lifecycle) = lifecycle();
        let caught = catch_unwind(AssertUnwindSafe(|| {
            run_test(&lifecycle, TestResult::new("fails"), || {
                run_step(&lifecycle, StepResult::new("check"), || {
                    assert_eq!(1, 2, "numbers differ");
                });
            })
        }));
        assert!(caught.is_err());

        let result = writer.result_named("fails").unwrap();
        assert_eq!(result.status, Some(Status::Failed));
        assert!(result.status_message.unwrap().contains("numbers differ"));
        assert_eq!(result.steps[0].status, Some(Status::Failed));
    }

    #[test]
    fn test_try_step_err_is_broken() {
        let (writer, lifecycle) = lifecycle();
        run_test(&lifecycle, TestResult::new("io"), || {
            let read: Result<(), std::io::Error> = try_step(&lifecycle, StepResult::new("read"), || {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing config"))
            });
            assert!(read.is_err());
        });

        let result = writer.result_named("io").unwrap();
        assert_eq!(result.status, Some(Status::Passed));
        assert_eq!(result.steps[0].status, Some(Status::Broken));
        assert_eq!(result.steps[0].status_message.as_deref(), Some("missing config"));
    }

    #[test]
    fn test_explicit_status_survives_pass() {
        let (writer, lifecycle) = lifecycle();
        run_test(&lifecycle, TestResult::new("skipped"), || {
            lifecycle.update_test(crate::lifecycle::test_outcome(Outcome::skipped("not today")));
        });
        assert_eq!(
            writer.result_named("skipped").unwrap().status,
            Some(Status::Skipped)
        );
    }

    #[test]
    fn test_log_step_and_step_without_test() {
        let (writer, lifecycle) = lifecycle();
        assert_eq!(run_step(&lifecycle, StepResult::new("orphan"), || 7), 7);
        log_step(&lifecycle, "orphan log", Status::Passed);
        assert!(writer.results().is_empty());

        run_test(&lifecycle, TestResult::new("logged"), || {
            log_step(&lifecycle, "cache cleared", Status::Skipped);
        });
        let result = writer.result_named("logged").unwrap();
        assert_eq!(result.steps[0].name, "cache cleared");
        assert_eq!(result.steps[0].status, Some(Status::Skipped));
    }

    #[test]
    fn test_attach_async_keeps_slot_order() {
        let (writer, lifecycle) = lifecycle();
        run_test(&lifecycle, TestResult::new("async attach"), || {
            let handle = attach_async(&lifecycle, "slow", Some("text/plain"), Some("txt"), || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                "late content"
            });
            attach_stream(
                &lifecycle,
                "fast",
                Some("text/plain"),
                Some("txt"),
                std::io::Cursor::new("early content"),
            );
            handle.join().unwrap();
        });

        let result = writer.result_named("async attach").unwrap();
        let names: Vec<_> = result.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        assert_eq!(
            writer.attachment(&result.attachments[0].source).unwrap(),
            b"late content"
        );
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_async_step_records_panic() {
        let (writer, lifecycle) = lifecycle();
        run_test_async(&lifecycle, TestResult::new("async"), async {
            let value = run_step_async(&lifecycle, StepResult::new("await"), async { 5 }).await;
            assert_eq!(value, 5);
            let failed = AssertUnwindSafe(run_step_async(
                &lifecycle,
                StepResult::new("explode"),
                async { panic!("async boom") },
            ));
            assert!(futures::FutureExt::catch_unwind(failed).await.is_err());
        })
        .await;

        let result = writer.result_named("async").unwrap();
        assert_eq!(result.status, Some(Status::Passed));
        assert_eq!(result.steps[1].status, Some(Status::Failed));
    }
}

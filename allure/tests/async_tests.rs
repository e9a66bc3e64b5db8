//! Context propagation into tokio tasks.

#![cfg(feature = "tokio")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use allure::{runtime, Status, StepResult, TestResult};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scoped_tasks_report_into_parent_test() {
    let (writer, lifecycle) = common::in_memory();
    let uuid = lifecycle.start_test(TestResult::new("fan out"));

    let tasks: Vec<_> = (0..4)
        .map(|n| {
            let task_lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(lifecycle.scope_current(async move {
                task_lifecycle.start_step(StepResult::new(format!("request {}", n)));
                tokio::time::sleep(Duration::from_millis(5)).await;
                task_lifecycle.start_step(StepResult::new(format!("decode {}", n)));
                task_lifecycle.stop_step();
                task_lifecycle.stop_step();
                task_lifecycle.current_test_uuid()
            }))
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().as_deref(), Some(uuid.as_str()));
    }
    lifecycle.stop_test();
    lifecycle.write_test(&uuid);

    let result = writer.result(&uuid).unwrap();
    assert_eq!(result.steps.len(), 4);
    for step in &result.steps {
        let n = step.name.trim_start_matches("request ");
        assert_eq!(step.steps.len(), 1);
        assert_eq!(step.steps[0].name, format!("decode {}", n));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unscoped_task_sees_nothing() {
    let (writer, lifecycle) = common::in_memory();
    let uuid = lifecycle.start_test(TestResult::new("unscoped"));

    let task_lifecycle = Arc::clone(&lifecycle);
    let seen = tokio::spawn(async move { task_lifecycle.current_test_uuid() })
        .await
        .unwrap();
    assert!(seen.is_none());

    lifecycle.stop_test();
    lifecycle.write_test(&uuid);
    assert!(writer.result(&uuid).unwrap().steps.is_empty());
}

#[tokio::test]
async fn test_attach_future_writes_when_resolved() {
    let (writer, lifecycle) = common::in_memory();
    let uuid = lifecycle.start_test(TestResult::new("future attachment"));

    let pending = runtime::attach_future(&lifecycle, "metrics", Some("text/csv"), Some("csv"), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        b"p50,p99\n12,80\n".to_vec()
    });
    lifecycle.stop_test();
    lifecycle.write_test(&uuid);
    pending.await.unwrap();

    let result = writer.result(&uuid).unwrap();
    let source = &result.attachments[0].source;
    assert!(source.ends_with("-attachment.csv"));
    assert_eq!(writer.attachment(source).unwrap(), b"p50,p99\n12,80\n");
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_async_test_and_steps() {
    let (writer, lifecycle) = common::in_memory();

    let value = runtime::run_test_async(&lifecycle, TestResult::new("async body"), async {
        let a = runtime::run_step_async(&lifecycle, StepResult::new("fetch"), async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            20
        })
        .await;
        a + 22
    })
    .await;
    assert_eq!(value, 42);

    let result = writer.result_named("async body").unwrap();
    assert_eq!(result.status, Some(Status::Passed));
    assert_eq!(result.steps[0].name, "fetch");
    assert_eq!(result.steps[0].status, Some(Status::Passed));
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_async_step_panic_fails_test() {
    use allure::futures::FutureExt;

    let (writer, lifecycle) = common::in_memory();
    let outcome = std::panic::AssertUnwindSafe(runtime::run_test_async(
        &lifecycle,
        TestResult::new("async panic"),
        async {
            runtime::run_step_async(&lifecycle, StepResult::new("explode"), async {
                let ack: Option<()> = None;
                ack.expect("timeout waiting for ack")
            })
            .await
        },
    ))
    .catch_unwind()
    .await;
    assert!(outcome.is_err());

    let result = writer.result_named("async panic").unwrap();
    assert_eq!(result.status, Some(Status::Failed));
    assert_eq!(result.steps[0].status, Some(Status::Failed));
    assert_eq!(result.status_message.as_deref(), Some("timeout waiting for ack"));
}

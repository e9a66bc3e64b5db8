//! Hooks around lifecycle operations.
//!
//! Listeners observe results as they move through the lifecycle. They are
//! invoked while the lifecycle lock is held, so they must be quick and must
//! not call back into the lifecycle.

use crate::model::{StepResult, TestResult};

/// Observer of test and fixture results. All hooks default to no-ops.
#[allow(unused_variables)]
pub trait TestLifecycleListener: Send + Sync {
    fn before_test_start(&self, result: &TestResult) {}
    fn after_test_start(&self, result: &TestResult) {}
    fn before_test_update(&self, result: &TestResult) {}
    fn after_test_update(&self, result: &TestResult) {}
    fn before_test_stop(&self, result: &TestResult) {}
    fn after_test_stop(&self, result: &TestResult) {}
    fn before_test_write(&self, result: &TestResult) {}
    fn after_test_write(&self, result: &TestResult) {}
}

/// Observer of step results. All hooks default to no-ops.
#[allow(unused_variables)]
pub trait StepLifecycleListener: Send + Sync {
    fn before_step_start(&self, result: &StepResult) {}
    fn after_step_start(&self, result: &StepResult) {}
    fn before_step_update(&self, result: &StepResult) {}
    fn after_step_update(&self, result: &StepResult) {}
    fn before_step_stop(&self, result: &StepResult) {}
    fn after_step_stop(&self, result: &StepResult) {}
}

/// Fans every hook out to the registered listeners, in registration order.
#[derive(Default)]
pub struct LifecycleNotifier {
    test_listeners: Vec<Box<dyn TestLifecycleListener>>,
    step_listeners: Vec<Box<dyn StepLifecycleListener>>,
}

impl LifecycleNotifier {
    pub fn new(
        test_listeners: Vec<Box<dyn TestLifecycleListener>>,
        step_listeners: Vec<Box<dyn StepLifecycleListener>>,
    ) -> Self {
        Self {
            test_listeners,
            step_listeners,
        }
    }

    pub fn add_test_listener(&mut self, listener: Box<dyn TestLifecycleListener>) {
        self.test_listeners.push(listener);
    }

    pub fn add_step_listener(&mut self, listener: Box<dyn StepLifecycleListener>) {
        self.step_listeners.push(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.test_listeners.is_empty() && self.step_listeners.is_empty()
    }
}

impl std::fmt::Debug for LifecycleNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleNotifier")
            .field("test_listeners", &self.test_listeners.len())
            .field("step_listeners", &self.step_listeners.len())
            .finish()
    }
}

impl TestLifecycleListener for LifecycleNotifier {
    fn before_test_start(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.before_test_start(result));
    }

    fn after_test_start(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.after_test_start(result));
    }

    fn before_test_update(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.before_test_update(result));
    }

    fn after_test_update(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.after_test_update(result));
    }

    fn before_test_stop(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.before_test_stop(result));
    }

    fn after_test_stop(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.after_test_stop(result));
    }

    fn before_test_write(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.before_test_write(result));
    }

    fn after_test_write(&self, result: &TestResult) {
        self.test_listeners.iter().for_each(|l| l.after_test_write(result));
    }
}

impl StepLifecycleListener for LifecycleNotifier {
    fn before_step_start(&self, result: &StepResult) {
        self.step_listeners.iter().for_each(|l| l.before_step_start(result));
    }

    fn after_step_start(&self, result: &StepResult) {
        self.step_listeners.iter().for_each(|l| l.after_step_start(result));
    }

    fn before_step_update(&self, result: &StepResult) {
        self.step_listeners.iter().for_each(|l| l.before_step_update(result));
    }

    fn after_step_update(&self, result: &StepResult) {
        self.step_listeners.iter().for_each(|l| l.after_step_update(result));
    }

    fn before_step_stop(&self, result: &StepResult) {
        self.step_listeners.iter().for_each(|l| l.before_step_stop(result));
    }

    fn after_step_stop(&self, result: &StepResult) {
        self.step_listeners.iter().for_each(|l| l.after_step_stop(result));
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::context::ExecutionId;
use crate::enums::{Stage, TestResultType};
use crate::lifecycle::{depends_on, Lifecycle};
use crate::model::TestResult;
use crate::outcome::Outcome;
use crate::writer::generate_uuid;

/// Extent a fixture applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FixtureScope {
    /// A whole suite, by name.
    Suite(String),
    /// A named test context inside a suite.
    Context(String),
    /// Every test of a class or module.
    Class(String),
    /// Every test tagged with a group.
    Group(String),
    /// The single next test on the same execution context.
    Method,
}

#[derive(Debug, Default)]
struct TrackerState {
    set_ups: HashMap<FixtureScope, Vec<String>>,
    tests: HashMap<FixtureScope, Vec<String>>,
    method_set_ups: HashMap<ExecutionId, Vec<String>>,
    /// Last test per context, the child of a method tear-down. Dropped when
    /// the method scope or a scope holding that test finishes.
    current_tests: HashMap<ExecutionId, String>,
    tear_downs: HashMap<ExecutionId, FixtureScope>,
}

/// Builds the fixture dependency graph while fixtures and tests run.
///
/// Set-up fixtures are started and stopped as they run but only written once
/// the tests they gate are known: scoped set-ups when [`finish_scope`] is
/// called, method set-ups when the next test on the same execution context
/// starts. Tear-down fixtures receive their children before they are written.
///
/// [`finish_scope`]: FixtureTracker::finish_scope
#[derive(Debug)]
pub struct FixtureTracker {
    lifecycle: Arc<Lifecycle>,
    state: Mutex<TrackerState>,
}

fn ensure_uuid(result: &mut TestResult) -> String {
    match &result.uuid {
        Some(uuid) if !uuid.is_empty() => uuid.clone(),
        _ => {
            let uuid = generate_uuid();
            result.uuid = Some(uuid.clone());
            uuid
        }
    }
}

impl FixtureTracker {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_current(&self, outcome: Outcome) -> Option<String> {
        let uuid = self.lifecycle.current_test_uuid();
        self.lifecycle.update_test(|result| {
            outcome.apply(result);
            result.stage = Stage::Finished;
        });
        uuid
    }

    /// Starts a set-up fixture for `scope` on the calling execution context.
    pub fn start_set_up(&self, scope: FixtureScope, mut result: TestResult) -> String {
        result.kind = TestResultType::SetUp;
        let uuid = ensure_uuid(&mut result);
        {
            let mut state = self.state();
            match scope {
                FixtureScope::Method => state
                    .method_set_ups
                    .entry(ExecutionId::current())
                    .or_default()
                    .push(uuid.clone()),
                scope => state.set_ups.entry(scope).or_default().push(uuid.clone()),
            }
        }
        self.lifecycle.start_test(result)
    }

    /// Records the set-up's outcome and stops it. It stays in flight.
    pub fn finish_set_up(&self, outcome: Outcome) {
        self.finish_current(outcome);
        self.lifecycle.stop_test();
    }

    /// Starts a test belonging to `scopes`.
    ///
    /// Method set-ups that ran on this execution context since the previous
    /// test now gate this one and are written.
    pub fn start_test(&self, scopes: &[FixtureScope], mut result: TestResult) -> String {
        let uuid = ensure_uuid(&mut result);
        let id = ExecutionId::current();
        let pending = {
            let mut state = self.state();
            for scope in scopes.iter().filter(|scope| **scope != FixtureScope::Method) {
                state
                    .tests
                    .entry(scope.clone())
                    .or_default()
                    .push(uuid.clone());
            }
            state.current_tests.insert(id, uuid.clone());
            state.method_set_ups.remove(&id).unwrap_or_default()
        };

        for set_up in pending {
            self.lifecycle
                .update_test_by_uuid(&set_up, depends_on(uuid.clone()));
            self.lifecycle.write_test(&set_up);
        }
        self.lifecycle.start_test(result)
    }

    /// Records the test's outcome, then stops and writes it.
    pub fn finish_test(&self, outcome: Outcome) {
        let uuid = self.finish_current(outcome);
        self.lifecycle.stop_test();
        if let Some(uuid) = uuid {
            self.lifecycle.write_test(&uuid);
        }
    }

    /// Starts a tear-down fixture for `scope` on the calling execution context.
    pub fn start_tear_down(&self, scope: FixtureScope, mut result: TestResult) -> String {
        result.kind = TestResultType::TearDown;
        self.state().tear_downs.insert(ExecutionId::current(), scope);
        self.lifecycle.start_test(result)
    }

    /// Links the tear-down to every test of its scope, records its outcome,
    /// then stops and writes it.
    pub fn finish_tear_down(&self, outcome: Outcome) {
        let id = ExecutionId::current();
        let children = {
            let mut state = self.state();
            match state.tear_downs.remove(&id) {
                Some(FixtureScope::Method) => state.current_tests.get(&id).cloned().into_iter().collect(),
                Some(scope) => state.tests.get(&scope).cloned().unwrap_or_default(),
                None => {
                    warn!("finishing a tear-down that was not started through the tracker");
                    Vec::new()
                }
            }
        };

        self.lifecycle.update_test(|fixture| {
            for child in children {
                fixture.add_child(child);
            }
        });
        let uuid = self.finish_current(outcome);
        self.lifecycle.stop_test();
        if let Some(uuid) = uuid {
            self.lifecycle.write_test(&uuid);
        }
    }

    /// Ends a scope: its pending set-ups gain every test recorded in it and
    /// are written. Call after the scope's tear-downs have finished.
    ///
    /// For [`FixtureScope::Method`] this writes set-ups of the calling
    /// execution context that no test followed.
    pub fn finish_scope(&self, scope: FixtureScope) {
        let id = ExecutionId::current();
        let (set_ups, tests) = {
            let mut state = self.state();
            match scope {
                FixtureScope::Method => {
                    state.current_tests.remove(&id);
                    (state.method_set_ups.remove(&id).unwrap_or_default(), Vec::new())
                }
                scope => {
                    let tests = state.tests.remove(&scope).unwrap_or_default();
                    state.current_tests.retain(|_, uuid| !tests.contains(uuid));
                    (state.set_ups.remove(&scope).unwrap_or_default(), tests)
                }
            }
        };

        debug!(set_ups = set_ups.len(), tests = tests.len(), "fixture scope finished");
        for set_up in set_ups {
            self.lifecycle.update_test_by_uuid(&set_up, |fixture| {
                for test in &tests {
                    fixture.add_child(test.clone());
                }
            });
            self.lifecycle.write_test(&set_up);
        }
    }
}

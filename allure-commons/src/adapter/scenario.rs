use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::context::ExecutionId;
use crate::enums::{Stage, Status};
use crate::lifecycle::{step_outcome, Lifecycle};
use crate::model::{Executable, Label, StepResult, TestResult};
use crate::outcome::Outcome;
use crate::writer::{generate_uuid, md5_hex};

#[derive(Debug)]
struct Scenario {
    uuid: String,
    status: Option<Status>,
}

/// Records BDD scenarios as tests and their steps as steps.
///
/// The scenario status is the worst status of its steps, or passed when no
/// step reported anything. A broken step fails its scenario; the step itself
/// stays broken.
#[derive(Debug)]
pub struct ScenarioRecorder {
    lifecycle: Arc<Lifecycle>,
    scenarios: Mutex<HashMap<ExecutionId, Scenario>>,
}

impl ScenarioRecorder {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            scenarios: Mutex::new(HashMap::new()),
        }
    }

    fn scenarios(&self) -> MutexGuard<'_, HashMap<ExecutionId, Scenario>> {
        self.scenarios.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a scenario of `story` on the calling execution context.
    pub fn before_scenario(&self, story: &str, title: &str, description: Option<&str>) -> String {
        let uuid = generate_uuid();
        let full_name = format!("{}: {}", story, title);

        let mut result = TestResult::new(title)
            .with_uuid(uuid.clone())
            .with_history_id(md5_hex([full_name.as_bytes()]))
            .with_full_name(full_name)
            .with_stage(Stage::Scheduled)
            .with_label(Label::story(story))
            .with_label(Label::current_thread());
        if let Some(host) = Label::current_host() {
            result.labels.insert(host);
        }
        result.description = description.map(str::to_string);

        self.scenarios().insert(
            ExecutionId::current(),
            Scenario {
                uuid: uuid.clone(),
                status: None,
            },
        );
        self.lifecycle.start_test(result)
    }

    pub fn before_step(&self, name: &str) -> bool {
        self.lifecycle.start_step(StepResult::new(name))
    }

    /// Closes the current step with `outcome` and folds its status into the
    /// scenario. Does nothing to the scenario when no step was open.
    pub fn step_finished(&self, outcome: Outcome) {
        let status = match outcome.status() {
            Status::Broken => Status::Failed,
            status => status,
        };
        self.lifecycle.update_step(step_outcome(outcome));
        if !self.lifecycle.stop_step() {
            return;
        }

        match self.scenarios().get_mut(&ExecutionId::current()) {
            Some(scenario) => scenario.status = Some(Status::merge(scenario.status, status)),
            None => error!("step finished outside of a scenario"),
        }
    }

    /// Records the merged status, then stops and writes the scenario.
    pub fn after_scenario(&self) {
        let Some(scenario) = self.scenarios().remove(&ExecutionId::current()) else {
            error!("could not finish scenario: there is no scenario run at the moment");
            return;
        };

        let status = scenario.status.unwrap_or(Status::Passed);
        self.lifecycle.update_test(|result| {
            result.set_status(status, None, None);
            result.stage = Stage::Finished;
        });
        self.lifecycle.stop_test();
        self.lifecycle.write_test(&scenario.uuid);
    }
}

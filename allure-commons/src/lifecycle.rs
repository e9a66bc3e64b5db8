//! The lifecycle: in-flight test registry plus per-context step tracking.
//!
//! A [`Lifecycle`] owns every test result between `start_test` and
//! `write_test`, and one [`ContextStack`] per execution context describing
//! which test and which nested steps are currently open there. All mutations
//! go through a single lock, so they are totally ordered.
//!
//! Protocol misuse (updating with no active test, stopping a step that was
//! never started, ...) is logged and ignored. Instrumentation must never break
//! the test run it observes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, error, warn};

use crate::context::{ContextHandoff, ContextStack, ExecutionId, Frame};
use crate::enums::{Stage, Status};
use crate::listener::{LifecycleNotifier, StepLifecycleListener, TestLifecycleListener};
use crate::model::{current_time_ms, Attachment, Executable, StepResult, TestResult};
use crate::outcome::Outcome;
use crate::writer::{generate_uuid, AttachmentContentWriter, DiscardContentWriter, ResultsWriter};

/// Snapshot of the innermost active unit of an execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Current {
    Test(TestResult),
    Step(StepResult),
}

impl Current {
    pub fn name(&self) -> &str {
        match self {
            Current::Test(test) => &test.name,
            Current::Step(step) => &step.name,
        }
    }
}

#[derive(Debug, Default)]
struct LifecycleState {
    results: HashMap<String, TestResult>,
    contexts: HashMap<ExecutionId, ContextStack>,
}

impl LifecycleState {
    fn stack_mut(&mut self, id: ExecutionId) -> &mut ContextStack {
        self.contexts.entry(id).or_default()
    }

    fn current_test_uuid(&self, id: ExecutionId) -> Option<&str> {
        self.contexts.get(&id)?.current_test()
    }

    fn current_test_mut(&mut self, id: ExecutionId) -> Option<&mut TestResult> {
        let uuid = self.contexts.get(&id)?.current_test()?;
        self.results.get_mut(uuid)
    }

    /// Resolves the test and, if a step is open, the innermost step.
    fn locate(&self, id: ExecutionId) -> Option<(&TestResult, Option<&StepResult>)> {
        let stack = self.contexts.get(&id)?;
        let test = self.results.get(stack.current_test()?)?;
        let path = stack.step_path();
        if path.is_empty() {
            return Some((test, None));
        }
        let mut steps = &test.steps;
        let mut step = None;
        for index in path {
            let found = steps.get(index)?;
            steps = &found.steps;
            step = Some(found);
        }
        Some((test, step))
    }

    fn current_step_mut(&mut self, id: ExecutionId) -> Option<&mut StepResult> {
        let stack = self.contexts.get(&id)?;
        let path = stack.step_path();
        let test = self.results.get_mut(stack.current_test()?)?;
        step_at(test, &path)
    }

    fn current_unit_mut(&mut self, id: ExecutionId) -> Option<&mut dyn Executable> {
        let stack = self.contexts.get(&id)?;
        let path = stack.step_path();
        let test = self.results.get_mut(stack.current_test()?)?;
        if path.is_empty() {
            return Some(test as &mut dyn Executable);
        }
        step_at(test, &path).map(|step| step as &mut dyn Executable)
    }
}

fn step_at<'a>(test: &'a mut TestResult, path: &[usize]) -> Option<&'a mut StepResult> {
    let (first, rest) = path.split_first()?;
    let mut step = test.steps.get_mut(*first)?;
    for index in rest {
        step = step.steps.get_mut(*index)?;
    }
    Some(step)
}

/// Step paths open on any execution context whose current test is `uuid`.
fn open_step_paths(contexts: &HashMap<ExecutionId, ContextStack>, uuid: &str) -> Vec<Vec<usize>> {
    contexts
        .values()
        .filter(|stack| stack.current_test() == Some(uuid) && stack.has_active_step())
        .map(ContextStack::step_path)
        .collect()
}

/// Name and start of each step along `path`, or `None` once the path no
/// longer resolves.
fn path_signature(steps: &[StepResult], path: &[usize]) -> Option<Vec<(String, Option<i64>)>> {
    let mut steps = steps;
    let mut signature = Vec::with_capacity(path.len());
    for &index in path {
        let step = steps.get(index)?;
        signature.push((step.name.clone(), step.start));
        steps = &step.steps;
    }
    Some(signature)
}

fn attachment_source(uuid: &str, extension: Option<&str>) -> String {
    match extension
        .map(|ext| ext.trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
    {
        Some(ext) => format!("{}-attachment.{}", uuid, ext),
        None => format!("{}-attachment", uuid),
    }
}

/// Tracks tests and steps across execution contexts and hands finished
/// results to a [`ResultsWriter`].
///
/// Mutator closures passed to the `update_*` methods run under the lifecycle
/// lock and must not call back into the same lifecycle.
pub struct Lifecycle {
    writer: Box<dyn ResultsWriter>,
    notifier: LifecycleNotifier,
    state: Mutex<LifecycleState>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Lifecycle")
            .field("in_flight", &state.results.len())
            .field("contexts", &state.contexts.len())
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl Lifecycle {
    /// Creates a lifecycle writing to the given sink, with no listeners.
    pub fn new(writer: impl ResultsWriter + 'static) -> Self {
        Self::builder(writer).build()
    }

    pub fn builder(writer: impl ResultsWriter + 'static) -> LifecycleBuilder {
        LifecycleBuilder {
            writer: Box::new(writer),
            notifier: LifecycleNotifier::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Tests ===

    /// Starts a test (or fixture) on the calling execution context.
    ///
    /// Assigns a uuid if the result has none, stamps the start time, moves it
    /// to [`Stage::Running`] and makes it the context's only open unit. Any
    /// previous stack of this context is discarded. Returns the uuid.
    pub fn start_test(&self, mut result: TestResult) -> String {
        let uuid = match result.uuid.take().filter(|uuid| !uuid.is_empty()) {
            Some(uuid) => uuid,
            None => generate_uuid(),
        };
        result.uuid = Some(uuid.clone());
        result.start = Some(current_time_ms());
        result.stage = Stage::Running;

        let id = ExecutionId::current();
        let mut state = self.state();
        self.notifier.before_test_start(&result);

        let stack = state.stack_mut(id);
        stack.clear();
        stack.push(Frame::Test(uuid.clone()));

        if state.results.contains_key(&uuid) {
            warn!(uuid = %uuid, "test already in flight, replacing it");
        }
        self.notifier.after_test_start(&result);
        state.results.insert(uuid.clone(), result);
        debug!(uuid = %uuid, execution = id.as_u64(), "test started");
        uuid
    }

    /// Applies `update` to the calling context's current test.
    ///
    /// Returns false (and logs) if there is no current test.
    pub fn update_test<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut TestResult),
    {
        let id = ExecutionId::current();
        let mut state = self.state();
        let LifecycleState { results, contexts } = &mut *state;
        let current = contexts
            .get(&id)
            .and_then(ContextStack::current_test)
            .and_then(|uuid| Some((open_step_paths(contexts, uuid), results.get_mut(uuid)?)));
        match current {
            Some((open, result)) => {
                self.apply_test_update(result, &open, update);
                true
            }
            None => {
                error!("could not update test: there is no test run at the moment");
                false
            }
        }
    }

    /// Applies `update` to the in-flight test with the given uuid, from any
    /// execution context.
    ///
    /// Returns false (and logs) if the uuid is unknown or already written.
    pub fn update_test_by_uuid<F>(&self, uuid: &str, update: F) -> bool
    where
        F: FnOnce(&mut TestResult),
    {
        let mut state = self.state();
        let LifecycleState { results, contexts } = &mut *state;
        let open = open_step_paths(contexts, uuid);
        match results.get_mut(uuid) {
            Some(result) => {
                self.apply_test_update(result, &open, update);
                true
            }
            None => {
                error!(uuid = %uuid, "could not update test: no test with this uuid is in flight");
                false
            }
        }
    }

    /// Runs a test mutator, then undoes what it may not change: the uuid, a
    /// stage regression, and the position of steps still open somewhere.
    fn apply_test_update<F>(&self, result: &mut TestResult, open: &[Vec<usize>], update: F)
    where
        F: FnOnce(&mut TestResult),
    {
        let uuid = result.uuid.clone();
        let stage = result.stage;
        let signatures: Vec<_> = open
            .iter()
            .map(|path| path_signature(&result.steps, path))
            .collect();
        let steps = (!open.is_empty()).then(|| result.steps.clone());

        self.notifier.before_test_update(result);
        update(result);

        if let Some(steps) = steps {
            let moved = open
                .iter()
                .zip(&signatures)
                .any(|(path, before)| path_signature(&result.steps, path) != *before);
            if moved {
                warn!(uuid = ?uuid, "open steps cannot be moved or removed, restoring the step tree");
                result.steps = steps;
            }
        }

        if result.uuid != uuid {
            warn!(uuid = ?uuid, "test uuid is immutable once started, restoring it");
            result.uuid = uuid;
        }
        if stage.is_regression_to(result.stage) {
            warn!(
                uuid = ?result.uuid,
                from = %stage,
                to = %result.stage,
                "test stage cannot move backwards, keeping the current stage"
            );
            result.stage = stage;
        }
        self.notifier.after_test_update(result);
    }

    /// Stamps the stop time on the calling context's current test and
    /// releases the context. The result stays in flight until written.
    pub fn stop_test(&self) {
        let id = ExecutionId::current();
        let mut state = self.state();
        match state.current_test_mut(id) {
            Some(result) => {
                self.notifier.before_test_stop(result);
                result.stop = Some(current_time_ms());
                self.notifier.after_test_stop(result);
            }
            None => error!("could not stop test: there is no test run at the moment"),
        }
        state.contexts.remove(&id);
    }

    /// Removes the result with the given uuid from the registry and hands it
    /// to the sink. Unknown or already written uuids are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `uuid` is empty.
    pub fn write_test(&self, uuid: &str) {
        assert!(!uuid.is_empty(), "uuid should not be empty");

        let mut state = self.state();
        let Some(result) = state.results.remove(uuid) else {
            debug!(uuid = %uuid, "nothing to write");
            return;
        };

        self.notifier.before_test_write(&result);
        match self.writer.write_result(&result) {
            Ok(()) => debug!(uuid = %uuid, "test written"),
            Err(err) => error!(uuid = %uuid, error = %err, "could not write test result"),
        }
        self.notifier.after_test_write(&result);
    }

    // === Steps ===

    /// Opens a step under the innermost active unit of the calling context.
    ///
    /// Stamps the start time if the step has none. Returns false (and logs)
    /// if there is no active test.
    pub fn start_step(&self, mut step: StepResult) -> bool {
        if step.start.is_none() {
            step.start = Some(current_time_ms());
        }

        let id = ExecutionId::current();
        let mut state = self.state();
        let Some(parent) = state.current_unit_mut(id) else {
            error!(step = %step.name, "could not start step: there is no test run at the moment");
            return false;
        };

        self.notifier.before_step_start(&step);
        let steps = parent.steps_mut();
        steps.push(step);
        let index = steps.len() - 1;
        self.notifier.after_step_start(&steps[index]);

        state.stack_mut(id).push(Frame::Step(index));
        true
    }

    /// Applies `update` to the calling context's innermost open step.
    pub fn update_step<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut StepResult),
    {
        let id = ExecutionId::current();
        let mut state = self.state();
        if !state.contexts.get(&id).is_some_and(ContextStack::has_active_step) {
            error!("could not update step: there is no step run at the moment");
            return false;
        }
        match state.current_step_mut(id) {
            Some(step) => {
                self.notifier.before_step_update(step);
                update(step);
                self.notifier.after_step_update(step);
                true
            }
            None => {
                error!("could not update step: its test is no longer in flight");
                false
            }
        }
    }

    /// Closes the innermost open step, stamping its stop time if unset.
    /// The step stays in its parent's tree.
    pub fn stop_step(&self) -> bool {
        let id = ExecutionId::current();
        let mut state = self.state();
        if !state.contexts.get(&id).is_some_and(ContextStack::has_active_step) {
            error!("could not stop step: there is no step run at the moment");
            return false;
        }
        if let Some(step) = state.current_step_mut(id) {
            self.notifier.before_step_stop(step);
            if step.stop.is_none() {
                step.stop = Some(current_time_ms());
            }
            self.notifier.after_step_stop(step);
        }
        state.stack_mut(id).pop_top();
        true
    }

    // === Attachments ===

    /// Records an attachment on the innermost active unit and returns a
    /// writer for its content.
    ///
    /// With nothing active, or when the sink cannot allocate a writer, the
    /// returned writer discards its content.
    pub fn add_attachment(
        &self,
        name: &str,
        content_type: Option<&str>,
        extension: Option<&str>,
    ) -> Box<dyn AttachmentContentWriter> {
        let id = ExecutionId::current();
        let mut state = self.state();
        let Some(unit) = state.current_unit_mut(id) else {
            error!(attachment = %name, "could not add attachment: there is no test run at the moment");
            return Box::new(DiscardContentWriter);
        };

        let uuid = generate_uuid();
        let source = attachment_source(&uuid, extension);
        unit.attachments_mut().push(Attachment {
            uuid,
            name: name.to_string(),
            source: source.clone(),
            content_type: content_type.map(str::to_string),
            timestamp: current_time_ms(),
        });

        match self.writer.write_attachment(&source) {
            Ok(writer) => writer,
            Err(err) => {
                error!(source = %source, error = %err, "could not allocate attachment writer");
                Box::new(DiscardContentWriter)
            }
        }
    }

    // === Queries ===

    /// Copy of the calling context's current test.
    pub fn current_test(&self) -> Option<TestResult> {
        let state = self.state();
        let test = state
            .current_test_uuid(ExecutionId::current())
            .and_then(|uuid| state.results.get(uuid))
            .cloned();
        test
    }

    /// Uuid of the calling context's current test, even if it was already
    /// written.
    pub fn current_test_uuid(&self) -> Option<String> {
        self.state()
            .current_test_uuid(ExecutionId::current())
            .map(str::to_string)
    }

    /// Copy of the innermost active unit of the calling context.
    pub fn current(&self) -> Option<Current> {
        self.state()
            .locate(ExecutionId::current())
            .map(|(test, step)| match step {
                Some(step) => Current::Step(step.clone()),
                None => Current::Test(test.clone()),
            })
    }

    /// Copy of the calling context's innermost open step.
    pub fn current_step(&self) -> Option<StepResult> {
        self.state()
            .locate(ExecutionId::current())
            .and_then(|(_, step)| step.cloned())
    }

    /// Returns true if a result with this uuid was started and not yet written.
    pub fn is_in_flight(&self, uuid: &str) -> bool {
        self.state().results.contains_key(uuid)
    }

    // === Context propagation ===

    /// Captures what a derived execution context should inherit: the current
    /// test, never the open steps.
    pub fn handoff(&self) -> ContextHandoff {
        self.state()
            .contexts
            .get(&ExecutionId::current())
            .map(ContextStack::handoff)
            .unwrap_or_default()
    }

    /// Seeds the calling context from a handoff taken on another context.
    /// Replaces whatever the calling context had open.
    pub fn adopt(&self, handoff: &ContextHandoff) {
        self.adopt_as(ExecutionId::current(), handoff);
    }

    fn adopt_as(&self, id: ExecutionId, handoff: &ContextHandoff) {
        let mut state = self.state();
        if handoff.is_empty() {
            state.contexts.remove(&id);
            return;
        }
        if let Some(uuid) = handoff.test_uuid() {
            if !state.results.contains_key(uuid) {
                warn!(uuid = %uuid, "adopting a test that is no longer in flight");
            }
        }
        state.contexts.insert(id, ContextStack::from_handoff(handoff));
    }

    /// Forgets the calling context's stack without touching any result.
    pub fn release_context(&self) {
        self.release(ExecutionId::current());
    }

    fn release(&self, id: ExecutionId) {
        self.state().contexts.remove(&id);
    }

    /// Spawns a thread that inherits the caller's current test.
    ///
    /// The child starts with the parent's test as its only frame, so updates
    /// and steps in the child land in that test. The child's context is
    /// released when `f` returns or panics.
    pub fn spawn<F, T>(self: &Arc<Self>, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handoff = self.handoff();
        let lifecycle = Arc::clone(self);
        std::thread::spawn(move || {
            let id = ExecutionId::current();
            lifecycle.adopt_as(id, &handoff);
            let _release = ReleaseOnDrop {
                lifecycle: &lifecycle,
                id,
            };
            f()
        })
    }

    /// Runs `fut` in a fresh execution context that inherits the caller's
    /// current test.
    ///
    /// The handoff is captured when this is called, so the returned future
    /// can be moved to `tokio::spawn` and polled on any worker.
    #[cfg(feature = "tokio")]
    pub fn scope_current<F>(self: &Arc<Self>, fut: F) -> impl std::future::Future<Output = F::Output>
    where
        F: std::future::Future,
    {
        let handoff = self.handoff();
        let lifecycle = Arc::clone(self);
        async move {
            let id = ExecutionId::next();
            lifecycle.adopt_as(id, &handoff);
            let _release = ReleaseOnDrop {
                lifecycle: &lifecycle,
                id,
            };
            crate::context::scope_execution(id, fut).await
        }
    }
}

struct ReleaseOnDrop<'a> {
    lifecycle: &'a Lifecycle,
    id: ExecutionId,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.lifecycle.release(self.id);
    }
}

/// Builder for a [`Lifecycle`] with listeners.
pub struct LifecycleBuilder {
    writer: Box<dyn ResultsWriter>,
    notifier: LifecycleNotifier,
}

impl LifecycleBuilder {
    pub fn test_listener(mut self, listener: impl TestLifecycleListener + 'static) -> Self {
        self.notifier.add_test_listener(Box::new(listener));
        self
    }

    pub fn step_listener(mut self, listener: impl StepLifecycleListener + 'static) -> Self {
        self.notifier.add_step_listener(Box::new(listener));
        self
    }

    pub fn build(self) -> Lifecycle {
        Lifecycle {
            writer: self.writer,
            notifier: self.notifier,
            state: Mutex::new(LifecycleState::default()),
        }
    }
}

// === Update helpers ===

/// Marks a step as passed.
pub fn step_passed() -> impl FnOnce(&mut StepResult) {
    |step| step.set_status(Status::Passed, None, None)
}

/// Records an outcome on a step.
pub fn step_outcome(outcome: Outcome) -> impl FnOnce(&mut StepResult) {
    move |step| outcome.apply(step)
}

/// Records an outcome on a test.
pub fn test_outcome(outcome: Outcome) -> impl FnOnce(&mut TestResult) {
    move |test| outcome.apply(test)
}

/// Makes a fixture gate the test with the given uuid.
pub fn depends_on(uuid: impl Into<String>) -> impl FnOnce(&mut TestResult) {
    let uuid = uuid.into();
    move |fixture| fixture.add_child(uuid)
}

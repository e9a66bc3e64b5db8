//! Execution context tracking.
//!
//! Every thread (or tokio task scope, with the `tokio` feature) is an
//! execution context identified by an [`ExecutionId`]. The lifecycle keeps one
//! [`ContextStack`] per execution context: the active test at the bottom and
//! the chain of open steps above it.
//!
//! Derived contexts do not inherit anything implicitly. A [`ContextHandoff`]
//! taken on the parent carries the parent's current test (never its steps) and
//! is adopted once by the child; there is no later resync.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_EXECUTION: Cell<Option<ExecutionId>> = const { Cell::new(None) };
}

#[cfg(feature = "tokio")]
tokio::task_local! {
    static TASK_EXECUTION: ExecutionId;
}

/// Identity of a logical thread of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(u64);

impl ExecutionId {
    /// Returns the execution context of the caller.
    ///
    /// Inside a task scope created by `Lifecycle::scope_current` this is the
    /// scope's id, otherwise it is the id of the calling thread.
    pub fn current() -> Self {
        task_execution().unwrap_or_else(Self::current_thread)
    }

    fn current_thread() -> Self {
        THREAD_EXECUTION.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = Self::next();
                cell.set(Some(id));
                id
            }
        })
    }

    pub(crate) fn next() -> Self {
        ExecutionId(NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

#[cfg(feature = "tokio")]
fn task_execution() -> Option<ExecutionId> {
    TASK_EXECUTION.try_with(|id| *id).ok()
}

#[cfg(not(feature = "tokio"))]
fn task_execution() -> Option<ExecutionId> {
    None
}

/// Runs `fut` with `id` as its execution context.
#[cfg(feature = "tokio")]
pub(crate) fn scope_execution<F>(id: ExecutionId, fut: F) -> impl std::future::Future<Output = F::Output>
where
    F: std::future::Future,
{
    TASK_EXECUTION.scope(id, fut)
}

/// One entry on a context stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Active test, identified by uuid. Only ever the bottom frame.
    Test(String),
    /// Active step, identified by its index in the parent's `steps`.
    Step(usize),
}

/// Ordered chain of active units for one execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Innermost active unit: the open step if any, else the test.
    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Uuid of the bottom frame if it is a test. Steps never count.
    pub fn current_test(&self) -> Option<&str> {
        match self.frames.first() {
            Some(Frame::Test(uuid)) => Some(uuid),
            _ => None,
        }
    }

    /// Returns true if the top frame is a step.
    pub fn has_active_step(&self) -> bool {
        matches!(self.current(), Some(Frame::Step(_)))
    }

    /// Step indices from the test down to the innermost open step.
    pub fn step_path(&self) -> Vec<usize> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Step(index) => Some(*index),
                Frame::Test(_) => None,
            })
            .collect()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Removes the top frame. The unit itself stays in its parent's tree.
    pub fn pop_top(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Snapshot of what a derived context inherits: the current test only.
    pub fn handoff(&self) -> ContextHandoff {
        ContextHandoff {
            test_uuid: self.current_test().map(str::to_owned),
        }
    }

    /// Initial stack of a derived context.
    pub fn from_handoff(handoff: &ContextHandoff) -> Self {
        let mut stack = Self::new();
        if let Some(uuid) = &handoff.test_uuid {
            stack.push(Frame::Test(uuid.clone()));
        }
        stack
    }
}

/// What a child execution context inherits from its parent at spawn time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextHandoff {
    test_uuid: Option<String>,
}

impl ContextHandoff {
    /// Uuid of the inherited test, if the parent had one.
    pub fn test_uuid(&self) -> Option<&str> {
        self.test_uuid.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.test_uuid.is_none()
    }
}

//! Framework-agnostic adapters built on the lifecycle.
//!
//! Host test frameworks report events in their own vocabulary. These adapters
//! translate two common shapes of those events into lifecycle calls:
//! xUnit-style fixtures around tests ([`FixtureTracker`]) and BDD scenarios made
//! of steps ([`ScenarioRecorder`]).

mod fixtures;
mod scenario;

pub use fixtures::{FixtureScope, FixtureTracker};
pub use scenario::ScenarioRecorder;

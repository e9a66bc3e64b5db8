//! Allure data model: test results, steps, attachments and their metadata.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enums::{LabelName, LinkType, Severity, Stage, Status, TestResultType};

/// Capabilities shared by every execution unit (tests, fixtures and steps).
///
/// The lifecycle works against this trait when it resolves "the innermost
/// active unit", which may be either a [`TestResult`] or a nested
/// [`StepResult`].
pub trait Executable {
    /// Display name of the unit.
    fn name(&self) -> &str;

    /// Start time in milliseconds since epoch.
    fn start(&self) -> Option<i64>;

    /// Stop time in milliseconds since epoch.
    fn stop(&self) -> Option<i64>;

    /// Sets the start time.
    fn set_start(&mut self, millis: i64);

    /// Sets the stop time.
    fn set_stop(&mut self, millis: i64);

    /// Child steps in start order.
    fn steps(&self) -> &[StepResult];

    /// Mutable access to child steps.
    fn steps_mut(&mut self) -> &mut Vec<StepResult>;

    /// Attachments in insertion order.
    fn attachments(&self) -> &[Attachment];

    /// Mutable access to attachments.
    fn attachments_mut(&mut self) -> &mut Vec<Attachment>;

    /// Mutable access to parameters.
    fn parameters_mut(&mut self) -> &mut BTreeSet<Parameter>;

    /// Outcome, if already known.
    fn status(&self) -> Option<Status>;

    /// Records an outcome with optional message and trace.
    fn set_status(&mut self, status: Status, message: Option<String>, trace: Option<String>);
}

macro_rules! impl_executable {
    ($ty:ty) => {
        impl Executable for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn start(&self) -> Option<i64> {
                self.start
            }

            fn stop(&self) -> Option<i64> {
                self.stop
            }

            fn set_start(&mut self, millis: i64) {
                self.start = Some(millis);
            }

            fn set_stop(&mut self, millis: i64) {
                self.stop = Some(millis);
            }

            fn steps(&self) -> &[StepResult] {
                &self.steps
            }

            fn steps_mut(&mut self) -> &mut Vec<StepResult> {
                &mut self.steps
            }

            fn attachments(&self) -> &[Attachment] {
                &self.attachments
            }

            fn attachments_mut(&mut self) -> &mut Vec<Attachment> {
                &mut self.attachments
            }

            fn parameters_mut(&mut self) -> &mut BTreeSet<Parameter> {
                &mut self.parameters
            }

            fn status(&self) -> Option<Status> {
                self.status
            }

            fn set_status(&mut self, status: Status, message: Option<String>, trace: Option<String>) {
                self.status = Some(status);
                self.status_message = message;
                self.status_trace = trace;
            }
        }
    };
}

/// Test or fixture result written to `{uuid}-result.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Test, set-up, tear-down or data generator
    #[serde(rename = "type", default)]
    pub kind: TestResultType,

    /// Process-unique identifier, assigned at start if absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Test name (display title)
    pub name: String,

    /// Fully qualified test name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Stable cross-run identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,

    /// Identifier in a test management system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,

    /// Start time (Unix timestamp in milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    /// Stop time (Unix timestamp in milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,

    /// Markdown description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// HTML description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_html: Option<String>,

    /// Lifecycle position
    #[serde(default)]
    pub stage: Stage,

    /// Outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Human readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    /// Failure details, usually a backtrace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_trace: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub flaky: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flaky_message: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub muted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted_message: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub known: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_message: Option<String>,

    /// Test steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,

    /// Test attachments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Test parameters
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub parameters: BTreeSet<Parameter>,

    /// Labels (suite, tag, severity, owner, ...)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<Label>,

    /// External links (issues, TMS, ...)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub links: BTreeSet<Link>,

    /// For fixtures: uuids of the tests this result gates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl_executable!(TestResult);

impl TestResult {
    /// Creates a test result with the given name and no identity yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates a result of the given kind.
    pub fn of_kind(kind: TestResultType, name: impl Into<String>) -> Self {
        Self {
            kind,
            ..Self::new(name)
        }
    }

    /// Sets an explicit uuid.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Sets the fully qualified name.
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the history id.
    pub fn with_history_id(mut self, history_id: impl Into<String>) -> Self {
        self.history_id = Some(history_id.into());
        self
    }

    /// Sets the initial stage.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Adds a label.
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.insert(label);
        self
    }

    /// Adds a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_parameter(name, value);
        self
    }

    /// Adds a label.
    pub fn add_label(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(Label::new(name, value));
    }

    /// Adds a label using a reserved name.
    pub fn add_label_name(&mut self, name: LabelName, value: impl Into<String>) {
        self.add_label(name.as_str(), value);
    }

    /// Adds a link.
    pub fn add_link(&mut self, link: Link) {
        self.links.insert(link);
    }

    /// Adds a parameter.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(Parameter::new(name, value));
    }

    /// Records that this result gates the test with the given uuid.
    ///
    /// Duplicate edges are ignored.
    pub fn add_child(&mut self, uuid: impl Into<String>) {
        let uuid = uuid.into();
        if !self.children.contains(&uuid) {
            self.children.push(uuid);
        }
    }

    /// Returns all values of labels with the given name.
    pub fn label_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.labels
            .iter()
            .filter(move |label| label.name == name)
            .map(|label| label.value.as_str())
    }
}

/// Step result nested inside a test or another step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Step name (display title)
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_trace: Option<String>,

    /// Nested steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,

    /// Step attachments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Step parameters
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub parameters: BTreeSet<Parameter>,
}

impl_executable!(StepResult);

impl StepResult {
    /// Creates a new step with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(Parameter::new(name, value));
        self
    }
}

/// Label for categorizing and filtering tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a label from a reserved label name.
    pub fn from_name(name: LabelName, value: impl Into<String>) -> Self {
        Self::new(name.as_str(), value)
    }

    pub fn epic(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Epic, value)
    }

    pub fn feature(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Feature, value)
    }

    pub fn story(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Story, value)
    }

    pub fn suite(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Suite, value)
    }

    pub fn severity(severity: Severity) -> Self {
        Self::from_name(LabelName::Severity, severity.as_str())
    }

    pub fn owner(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Owner, value)
    }

    pub fn tag(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Tag, value)
    }

    pub fn package(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Package, value)
    }

    pub fn thread(value: impl Into<String>) -> Self {
        Self::from_name(LabelName::Thread, value)
    }

    /// Creates a host label for the machine running the tests.
    ///
    /// `HOSTNAME` wins over the OS lookup; returns `None` if neither resolves.
    pub fn current_host() -> Option<Self> {
        if let Ok(name) = std::env::var("HOSTNAME") {
            return Some(Self::from_name(LabelName::Host, name));
        }
        hostname::get()
            .ok()
            .and_then(|name| name.to_str().map(|name| Self::from_name(LabelName::Host, name)))
    }

    /// Creates a thread label for the calling thread.
    pub fn current_thread() -> Self {
        let thread = std::thread::current();
        let name = match thread.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", thread.id()),
        };
        Self::thread(name)
    }
}

/// External link associated with a test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub url: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<LinkType>,
}

impl Link {
    /// Creates a plain link.
    pub fn new(url: impl Into<String>, name: Option<String>) -> Self {
        Self {
            name,
            url: url.into(),
            kind: Some(LinkType::Default),
        }
    }

    /// Creates an issue link.
    pub fn issue(url: impl Into<String>, name: Option<String>) -> Self {
        Self {
            kind: Some(LinkType::Issue),
            ..Self::new(url, name)
        }
    }

    /// Creates a test management system link.
    pub fn tms(url: impl Into<String>, name: Option<String>) -> Self {
        Self {
            kind: Some(LinkType::Tms),
            ..Self::new(url, name)
        }
    }
}

/// Name/value parameter of a test or step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    /// Creates a new parameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Reference to attachment content stored by the results sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub uuid: String,

    /// Attachment display name
    pub name: String,

    /// Content handle understood by the sink (a file name for file sinks)
    pub source: String,

    /// MIME type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    pub timestamp: i64,
}

/// Returns the current time in milliseconds since Unix epoch.
pub fn current_time_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_result_new() {
        let result = TestResult::new("Test Name");
        assert_eq!(result.uuid, None);
        assert_eq!(result.name, "Test Name");
        assert_eq!(result.status, None);
        assert_eq!(result.stage, Stage::NotImplemented);
        assert_eq!(result.kind, TestResultType::Test);
    }

    #[test]
    fn test_labels_collapse_duplicates() {
        let mut result = TestResult::new("labels");
        result.add_label_name(LabelName::Tag, "smoke");
        result.add_label_name(LabelName::Tag, "smoke");
        result.add_label_name(LabelName::Tag, "api");

        assert_eq!(result.labels.len(), 2);
        let tags: Vec<_> = result.label_values("tag").collect();
        assert_eq!(tags, vec!["api", "smoke"]);
    }

    #[test]
    fn test_children_ignore_duplicates() {
        let mut fixture = TestResult::of_kind(TestResultType::SetUp, "setUp");
        fixture.add_child("t1");
        fixture.add_child("t2");
        fixture.add_child("t1");
        assert_eq!(fixture.children, vec!["t1", "t2"]);
    }

    #[test]
    fn test_serialization_shape() {
        let mut result = TestResult::of_kind(TestResultType::TearDown, "cleanup").with_uuid("uuid-123");
        result.add_label_name(LabelName::Epic, "Identity");
        result.set_status(Status::Broken, Some("boom".to_string()), None);
        result.flaky = true;

        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["uuid"], "uuid-123");
        assert_eq!(json["type"], "tearDown");
        assert_eq!(json["status"], "broken");
        assert_eq!(json["statusMessage"], "boom");
        assert_eq!(json["stage"], "not_implemented");
        assert_eq!(json["flaky"], true);
        assert!(json.get("muted").is_none());
        assert!(json.get("steps").is_none());
        assert!(json.get("statusTrace").is_none());
    }

    #[test]
    fn test_executable_through_trait_object() {
        let mut step = StepResult::new("outer");
        {
            let unit: &mut dyn Executable = &mut step;
            unit.set_start(10);
            unit.steps_mut().push(StepResult::new("inner"));
            unit.parameters_mut().insert(Parameter::new("a", "1"));
            unit.set_status(Status::Passed, None, None);
            unit.set_stop(20);
        }
        assert_eq!(step.start, Some(10));
        assert_eq!(step.stop, Some(20));
        assert_eq!(step.steps.len(), 1);
        assert_eq!(step.status, Some(Status::Passed));
    }

    #[test]
    fn test_link_constructors() {
        let issue = Link::issue("https://jira.com/PROJ-123", Some("PROJ-123".to_string()));
        assert_eq!(issue.kind, Some(LinkType::Issue));
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "issue");
    }

    #[test]
    fn test_label_constructors() {
        let severity = Label::severity(Severity::Critical);
        assert_eq!(severity.name, "severity");
        assert_eq!(severity.value, "critical");
        assert_eq!(Label::current_thread().name, "thread");
    }
}

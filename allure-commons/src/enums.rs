//! Allure enums for status, stage, result type and other classifications.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome classification of a test, fixture or step.
///
/// Variants are declared worst-first so the derived ordering is
/// `Failed < Broken < Passed < Skipped`. When several statuses are observed
/// for one logical unit the minimum wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Assertion failure (product defect)
    Failed,
    /// Unexpected error (test defect)
    Broken,
    /// Finished successfully
    Passed,
    /// Not executed
    Skipped,
}

impl Status {
    /// Returns the worse of two statuses.
    pub fn worst(self, other: Status) -> Status {
        self.min(other)
    }

    /// Folds a newly observed status into an optional accumulated one.
    pub fn merge(current: Option<Status>, observed: Status) -> Status {
        match current {
            Some(status) => status.worst(observed),
            None => observed,
        }
    }

    /// Returns the string representation used in result files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Failed => "failed",
            Status::Broken => "broken",
            Status::Passed => "passed",
            Status::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle position of a test result, distinct from its [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Created but never scheduled
    #[default]
    NotImplemented,
    /// Test is scheduled but not started
    Scheduled,
    /// Test is currently running
    Running,
    /// Test has finished execution
    Finished,
    /// Test is pending
    Pending,
    /// Test was interrupted
    Interrupted,
}

impl Stage {
    /// Position on the stage progression. A result may only move to a stage
    /// of equal or higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            Stage::NotImplemented => 0,
            Stage::Scheduled | Stage::Pending => 1,
            Stage::Running => 2,
            Stage::Finished | Stage::Interrupted => 3,
        }
    }

    /// Returns true if moving from `self` to `next` would go backwards.
    pub fn is_regression_to(&self, next: Stage) -> bool {
        next.rank() < self.rank()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::NotImplemented => write!(f, "not_implemented"),
            Stage::Scheduled => write!(f, "scheduled"),
            Stage::Running => write!(f, "running"),
            Stage::Finished => write!(f, "finished"),
            Stage::Pending => write!(f, "pending"),
            Stage::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Whether a result is an actual test or a fixture around tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TestResultType {
    /// A test invocation
    #[default]
    Test,
    /// Set-up fixture
    SetUp,
    /// Tear-down fixture
    TearDown,
    /// Data provider invocation
    DataGenerator,
}

impl TestResultType {
    /// Returns true for set-up and tear-down fixtures.
    pub fn is_fixture(&self) -> bool {
        matches!(self, TestResultType::SetUp | TestResultType::TearDown)
    }
}

impl fmt::Display for TestResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestResultType::Test => write!(f, "test"),
            TestResultType::SetUp => write!(f, "setUp"),
            TestResultType::TearDown => write!(f, "tearDown"),
            TestResultType::DataGenerator => write!(f, "dataGenerator"),
        }
    }
}

/// Test severity level for prioritization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// System is unusable, blocker issue
    Blocker,
    /// Major functionality is broken
    Critical,
    /// Standard test importance
    #[default]
    Normal,
    /// Minor issues
    Minor,
    /// Cosmetic or trivial issues
    Trivial,
}

impl Severity {
    /// Returns the string representation used in labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Blocker => "blocker",
            Severity::Critical => "critical",
            Severity::Normal => "normal",
            Severity::Minor => "minor",
            Severity::Trivial => "trivial",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link type for external references.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Plain link
    #[default]
    #[serde(rename = "link")]
    Default,
    /// Link to issue tracker
    Issue,
    /// Link to test management system
    Tms,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::Default => write!(f, "link"),
            LinkType::Issue => write!(f, "issue"),
            LinkType::Tms => write!(f, "tms"),
        }
    }
}

/// Content type for attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    /// Plain text content
    #[default]
    Text,
    /// JSON content
    Json,
    /// XML content
    Xml,
    /// HTML content
    Html,
    /// CSV content
    Csv,
    /// PNG image content
    Png,
    /// JPEG image content
    Jpeg,
    /// ZIP archive content
    Zip,
}

impl ContentType {
    /// Returns the MIME type string.
    pub fn as_mime(&self) -> &'static str {
        match self {
            ContentType::Text => "text/plain",
            ContentType::Json => "application/json",
            ContentType::Xml => "application/xml",
            ContentType::Html => "text/html",
            ContentType::Csv => "text/csv",
            ContentType::Png => "image/png",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Zip => "application/zip",
        }
    }

    /// Returns the file extension for this content type.
    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Text => "txt",
            ContentType::Json => "json",
            ContentType::Xml => "xml",
            ContentType::Html => "html",
            ContentType::Csv => "csv",
            ContentType::Png => "png",
            ContentType::Jpeg => "jpg",
            ContentType::Zip => "zip",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Reserved label names understood by the report generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelName {
    /// Test suite name
    Suite,
    /// Parent suite name
    ParentSuite,
    /// Sub-suite name
    SubSuite,
    /// Epic (top-level business capability)
    Epic,
    /// Feature under epic
    Feature,
    /// User story under feature
    Story,
    /// Test severity
    Severity,
    /// Test tag
    Tag,
    /// Test owner/maintainer
    Owner,
    /// Execution host
    Host,
    /// Thread name
    Thread,
    /// Test method name
    TestMethod,
    /// Test class name
    TestClass,
    /// Package/module name
    Package,
    /// Test framework name
    Framework,
    /// Programming language
    Language,
}

impl LabelName {
    /// Returns the string name used in result files.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelName::Suite => "suite",
            LabelName::ParentSuite => "parentSuite",
            LabelName::SubSuite => "subSuite",
            LabelName::Epic => "epic",
            LabelName::Feature => "feature",
            LabelName::Story => "story",
            LabelName::Severity => "severity",
            LabelName::Tag => "tag",
            LabelName::Owner => "owner",
            LabelName::Host => "host",
            LabelName::Thread => "thread",
            LabelName::TestMethod => "testMethod",
            LabelName::TestClass => "testClass",
            LabelName::Package => "package",
            LabelName::Framework => "framework",
            LabelName::Language => "language",
        }
    }
}

impl fmt::Display for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

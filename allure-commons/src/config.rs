//! Results directory configuration.

use std::env;

use crate::error::{AllureError, AllureResult};
use crate::lifecycle::Lifecycle;
use crate::writer::{FileSystemResultsWriter, DEFAULT_RESULTS_DIR};

/// Environment variable naming the results directory.
pub const RESULTS_DIR_ENV: &str = "ALLURE_RESULTS_DIRECTORY";

/// Environment variable controlling whether the results directory is wiped
/// on initialization.
pub const CLEAN_RESULTS_ENV: &str = "ALLURE_CLEAN_RESULTS";

/// Where results go and how the directory is prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllureConfig {
    /// Directory where results are written.
    pub results_dir: String,
    /// Whether to clean the results directory on init.
    pub clean_results: bool,
}

impl Default for AllureConfig {
    fn default() -> Self {
        Self {
            results_dir: DEFAULT_RESULTS_DIR.to_string(),
            clean_results: true,
        }
    }
}

impl AllureConfig {
    /// Reads the configuration from the environment.
    ///
    /// Results accumulate across processes unless `ALLURE_CLEAN_RESULTS` is
    /// set, since several test binaries usually share one directory.
    pub fn from_env() -> AllureResult<Self> {
        let results_dir = env::var(RESULTS_DIR_ENV)
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RESULTS_DIR.to_string());

        let clean_results = match env::var(CLEAN_RESULTS_ENV) {
            Ok(value) => parse_flag(&value).ok_or_else(|| {
                AllureError::configuration(format!(
                    "{} must be true or false, got {:?}",
                    CLEAN_RESULTS_ENV, value
                ))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            results_dir,
            clean_results,
        })
    }

    /// Prepares the results directory.
    pub fn init(&self) -> AllureResult<()> {
        self.writer().init(self.clean_results)?;
        Ok(())
    }

    /// File system writer for this configuration.
    pub fn writer(&self) -> FileSystemResultsWriter {
        FileSystemResultsWriter::with_results_dir(&self.results_dir)
    }

    /// Prepares the results directory and returns a lifecycle writing into it.
    pub fn build_lifecycle(&self) -> AllureResult<Lifecycle> {
        self.init()?;
        Ok(Lifecycle::new(self.writer()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for [`AllureConfig`].
#[derive(Debug, Default)]
pub struct AllureConfigBuilder {
    config: AllureConfig,
}

impl AllureConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the results directory.
    pub fn results_dir(mut self, path: impl Into<String>) -> Self {
        self.config.results_dir = path.into();
        self
    }

    /// Sets whether to clean the results directory.
    pub fn clean_results(mut self, clean: bool) -> Self {
        self.config.clean_results = clean;
        self
    }

    pub fn build(self) -> AllureConfig {
        self.config
    }

    /// Prepares the results directory and returns the configuration.
    pub fn init(self) -> AllureResult<AllureConfig> {
        self.config.init()?;
        Ok(self.config)
    }

    /// Prepares the results directory and returns a lifecycle writing into it.
    pub fn build_lifecycle(self) -> AllureResult<Lifecycle> {
        self.config.build_lifecycle()
    }
}

/// Starts configuring where results go.
///
/// # Example
///
/// ```no_run
/// let lifecycle = allure_commons::configure()
///     .results_dir("target/allure-results")
///     .clean_results(false)
///     .build_lifecycle()
///     .expect("results directory");
/// ```
pub fn configure() -> AllureConfigBuilder {
    AllureConfigBuilder::new()
}

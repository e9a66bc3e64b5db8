//! Classified result of an instrumented call.

use std::any::Any;
use std::fmt;

use crate::enums::Status;
use crate::model::Executable;

/// What happened when an instrumented unit ran.
///
/// Panics (assertion failures) map to [`Status::Failed`], returned errors map
/// to [`Status::Broken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed {
        message: Option<String>,
        trace: Option<String>,
    },
    Broken {
        message: Option<String>,
        trace: Option<String>,
    },
    Skipped {
        message: Option<String>,
    },
}

impl Outcome {
    /// Assertion-style failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Outcome::Failed {
            message: Some(message.into()),
            trace: None,
        }
    }

    /// Unexpected error with a message.
    pub fn broken(message: impl Into<String>) -> Self {
        Outcome::Broken {
            message: Some(message.into()),
            trace: None,
        }
    }

    /// Unit that did not run.
    pub fn skipped(message: impl Into<String>) -> Self {
        Outcome::Skipped {
            message: Some(message.into()),
        }
    }

    /// Classifies a caught panic payload as a failure.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panicked".to_string()
        };
        Outcome::failed(message)
    }

    /// Classifies a returned error as broken. The `Debug` form becomes the trace.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: fmt::Debug + fmt::Display + ?Sized,
    {
        Outcome::Broken {
            message: Some(err.to_string()),
            trace: Some(format!("{:?}", err)),
        }
    }

    /// `Ok` is passed, `Err` is broken.
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self
    where
        E: fmt::Debug + fmt::Display,
    {
        match result {
            Ok(_) => Outcome::Passed,
            Err(err) => Outcome::from_error(err),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Outcome::Passed => Status::Passed,
            Outcome::Failed { .. } => Status::Failed,
            Outcome::Broken { .. } => Status::Broken,
            Outcome::Skipped { .. } => Status::Skipped,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Passed => None,
            Outcome::Failed { message, .. }
            | Outcome::Broken { message, .. }
            | Outcome::Skipped { message } => message.as_deref(),
        }
    }

    /// Records this outcome as the unit's status, message and trace.
    pub fn apply(self, unit: &mut dyn Executable) {
        let status = self.status();
        match self {
            Outcome::Passed => unit.set_status(status, None, None),
            Outcome::Failed { message, trace } | Outcome::Broken { message, trace } => {
                unit.set_status(status, message, trace)
            }
            Outcome::Skipped { message } => unit.set_status(status, message, None),
        }
    }
}

impl From<Status> for Outcome {
    fn from(status: Status) -> Self {
        match status {
            Status::Passed => Outcome::Passed,
            Status::Failed => Outcome::Failed {
                message: None,
                trace: None,
            },
            Status::Broken => Outcome::Broken {
                message: None,
                trace: None,
            },
            Status::Skipped => Outcome::Skipped { message: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepResult;
    use std::panic::catch_unwind;

    #[derive(Debug)]
    struct Timeout;

    impl fmt::Display for Timeout {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection timed out")
        }
    }

    #[test]
    fn test_panic_is_failed() {
        let payload = catch_unwind(|| panic!("expected 1, got 2")).unwrap_err();
        let outcome = Outcome::from_panic(payload.as_ref());
        assert_eq!(outcome.status(), Status::Failed);
        assert_eq!(outcome.message(), Some("expected 1, got 2"));
    }

    #[test]
    fn test_error_is_broken() {
        let result: Result<(), Timeout> = Err(Timeout);
        let outcome = Outcome::from_result(&result);
        assert_eq!(outcome.status(), Status::Broken);
        assert_eq!(outcome.message(), Some("connection timed out"));

        assert_eq!(Outcome::from_result(&Ok::<_, Timeout>(1)), Outcome::Passed);
    }

    #[test]
    fn test_apply_sets_status_fields() {
        let mut step = StepResult::new("step");
        Outcome::Broken {
            message: Some("boom".to_string()),
            trace: Some("at step".to_string()),
        }
        .apply(&mut step);

        assert_eq!(step.status, Some(Status::Broken));
        assert_eq!(step.status_message.as_deref(), Some("boom"));
        assert_eq!(step.status_trace.as_deref(), Some("at step"));

        Outcome::Passed.apply(&mut step);
        assert_eq!(step.status, Some(Status::Passed));
        assert_eq!(step.status_message, None);
    }

    #[test]
    fn test_from_status() {
        assert_eq!(Outcome::from(Status::Skipped).status(), Status::Skipped);
        assert_eq!(Outcome::from(Status::Failed).message(), None);
    }
}

//! Best-effort teardown bookkeeping.
//!
//! A teardown is an ordered list of independent steps. Each step runs whether
//! or not the previous one failed; failures become warnings in the report and
//! never reach the caller as errors. "Already gone" results count as success.

use std::fmt;

use tracing::{debug, warn};

use ovn_driver_common::DriverResult;

/// One failed teardown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownWarning {
    pub step: String,
    pub message: String,
}

impl fmt::Display for TeardownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// Warnings collected by a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    warnings: Vec<TeardownWarning>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn warnings(&self) -> &[TeardownWarning] {
        &self.warnings
    }

    /// True if the named step failed.
    pub fn failed(&self, step: &str) -> bool {
        self.warnings.iter().any(|w| w.step == step)
    }
}

/// Records step outcomes for one object being torn down.
pub struct Teardown {
    subject: String,
    report: TeardownReport,
}

impl Teardown {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            report: TeardownReport::default(),
        }
    }

    /// Records the outcome of one step.
    pub fn record<T>(&mut self, step: &str, result: DriverResult<T>) {
        match result {
            Ok(_) => debug!(subject = %self.subject, step, "Teardown step done"),
            Err(e) if e.is_teardown_tolerable() => {
                debug!(subject = %self.subject, step, "Teardown step found nothing to do: {}", e)
            }
            Err(e) => {
                warn!(subject = %self.subject, step, error = %e, "Teardown step failed, continuing");
                self.report.warnings.push(TeardownWarning {
                    step: step.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    pub fn finish(self) -> TeardownReport {
        if !self.report.is_clean() {
            warn!(
                subject = %self.subject,
                failed_steps = self.report.warnings.len(),
                "Teardown completed with warnings"
            );
        }
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_driver_common::DriverError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_continues_past_failures() {
        let mut teardown = Teardown::new("endpoint 0123456789ab");
        teardown.record("delete logical port", Err::<(), _>(DriverError::transaction("boom")));
        teardown.record("detach from bridge", Ok(()));
        teardown.record(
            "delete veth pair",
            Err::<(), _>(DriverError::host_wiring("delete link", "Cannot find device")),
        );
        let report = teardown.finish();

        assert_eq!(report.warnings().len(), 2);
        assert!(report.failed("delete logical port"));
        assert!(!report.failed("detach from bridge"));
        assert_eq!(
            report.warnings()[1].to_string(),
            "delete veth pair: host wiring failed during delete link: Cannot find device"
        );
    }

    #[test]
    fn test_not_found_is_not_a_warning() {
        let mut teardown = Teardown::new("network");
        teardown.record("delete switch", Err::<(), _>(DriverError::not_found("logical switch", "ls-x")));
        assert!(teardown.finish().is_clean());
    }
}

//! Caller-visible record of what a lifecycle operation did.
//!
//! Every entry is timestamped and mirrored to tracing, so the same information ends up in the
//! operation result and in the log files.

use crate::errors::LifecycleError;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

/// Step of a lifecycle operation an entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Step {
    Validate,
    Persist,
    Remove,
    Start,
    Configure,
    Enable,
    Teardown,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogEntry {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) step: Step,
    pub(crate) severity: Severity,
    /// Configuration attempt number, only set for handshake attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) attempt: Option<u32>,
    pub(crate) message: String,
}

/// Ordered entries of one lifecycle operation.
#[derive(Clone, Debug, Default)]
pub(crate) struct OperationLog {
    entries: Vec<LogEntry>,
}

impl OperationLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn info<S: Into<String>>(&mut self, step: Step, message: S) {
        self.push(step, Severity::Info, None, message.into());
    }

    pub(crate) fn warn<S: Into<String>>(&mut self, step: Step, message: S) {
        self.push(step, Severity::Warn, None, message.into());
    }

    pub(crate) fn error<S: Into<String>>(&mut self, step: Step, message: S) {
        self.push(step, Severity::Error, None, message.into());
    }

    /// Records the result of one configuration attempt.
    pub(crate) fn attempt<S: Into<String>>(&mut self, attempt: u32, succeeded: bool, message: S) {
        let severity = if succeeded {
            Severity::Info
        } else {
            Severity::Warn
        };
        self.push(Step::Configure, severity, Some(attempt), message.into());
    }

    fn push(&mut self, step: Step, severity: Severity, attempt: Option<u32>, message: String) {
        match severity {
            Severity::Info => info!(?step, attempt, "{}", message),
            Severity::Warn => warn!(?step, attempt, "{}", message),
            Severity::Error => error!(?step, attempt, "{}", message),
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            step,
            severity,
            attempt,
            message,
        });
    }

    pub(crate) fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of configuration attempts recorded.
    pub(crate) fn configuration_attempts(&self) -> usize {
        self.entries.iter().filter(|e| e.attempt.is_some()).count()
    }
}

// -------------------------------------------------------------------------------------------------
// Operation outcome
// -------------------------------------------------------------------------------------------------

/// Result of a lifecycle operation together with its log.
///
/// Serializes as `{"ok": true, "module": ..., "log": [...]}` on success and as
/// `{"ok": false, "error": "...", "kind": "...", "log": [...]}` on failure.
#[derive(Debug)]
pub(crate) struct OperationOutcome<T> {
    pub(crate) result: Result<T, LifecycleError>,
    pub(crate) log: OperationLog,
}

impl<T> OperationOutcome<T> {
    pub(crate) fn new(result: Result<T, LifecycleError>, log: OperationLog) -> Self {
        Self { result, log }
    }

    pub(crate) fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl<T: Serialize> Serialize for OperationOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OperationOutcome", 4)?;
        match &self.result {
            Ok(value) => {
                state.serialize_field("ok", &true)?;
                state.serialize_field("module", value)?;
            }
            Err(e) => {
                state.serialize_field("ok", &false)?;
                state.serialize_field("error", &e.to_string())?;
                state.serialize_field("kind", e.kind().as_str())?;
            }
        }
        state.serialize_field("log", self.log.entries())?;
        state.end()
    }
}

//! Error reporting collaborator
//!
//! Query failures never propagate past the query runner. Instead they are
//! handed to an `ErrorReporter`, which decides how the message reaches the
//! user: logged only, or collected for the current render cycle.

use riskboard_core::Query;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use tracing::warn;

pub trait ErrorReporter: Send + Sync {
    /// Report a non-fatal, user-visible failure for `query`
    fn report(&self, query: &Query, message: &str);
}

/// Reporter that only logs
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, query: &Query, message: &str) {
        warn!(query = %query, "Query failed: {}", message);
    }
}

/// A failure captured by [`CollectingReporter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub query: Query,
    pub message: String,
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query Failed: {}", self.message)
    }
}

/// Reporter that logs and keeps failures until drained
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<ReportedError>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every failure reported since the last drain
    pub fn drain(&self) -> Vec<ReportedError> {
        match self.reports.lock() {
            Ok(mut reports) => std::mem::take(&mut *reports),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, query: &Query, message: &str) {
        warn!(query = %query, "Query failed: {}", message);

        let entry = ReportedError {
            query: query.clone(),
            message: message.to_string(),
        };
        match self.reports.lock() {
            Ok(mut reports) => reports.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_and_drain() {
        let reporter = CollectingReporter::new();
        assert!(reporter.is_empty());

        reporter.report(&Query::new("SELECT * FROM VW_LOCATION_RISK"), "object does not exist");
        reporter.report(&Query::new("SELECT * FROM VW_FRAUD_KPI"), "session expired");
        assert_eq!(reporter.len(), 2);

        let drained = reporter.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "object does not exist");
        assert_eq!(drained[1].to_string(), "Query Failed: session expired");
        assert!(reporter.is_empty());
        assert!(reporter.drain().is_empty());
    }
}

//! Consistency report for a record.
//!
//! The schema implies a handful of relations between fields. Records in the
//! wild do not always honour them, so they are reported, never enforced.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::BuildPhase;
use super::record::BuildRecord;

/// Clusters record `duration` below second precision while timestamps are
/// written in whole seconds.
const DURATION_TOLERANCE_NANOS: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "anomaly", rename_all = "snake_case")]
pub enum Anomaly {
    /// `Complete` with a reason set (e.g. `GenericBuildFailed`).
    PhaseReasonMismatch { phase: BuildPhase, reason: String },

    CompletionBeforeStart {
        start: DateTime<Utc>,
        completion: DateTime<Utc>,
    },

    /// Recorded duration differs from `completion - start` by a second or
    /// more (nanoseconds).
    DurationMismatch { recorded: u64, computed: u64 },

    /// Resolved output reference differs from `spec.output.to.name`.
    OutputReferenceMismatch { requested: String, resolved: String },

    /// Terminal phase without a completion timestamp.
    MissingCompletion { phase: BuildPhase },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::PhaseReasonMismatch { phase, reason } => {
                write!(f, "phase is {phase} but reason is {reason}")
            }
            Anomaly::CompletionBeforeStart { start, completion } => {
                write!(f, "completion {completion} precedes start {start}")
            }
            Anomaly::DurationMismatch { recorded, computed } => {
                write!(f, "duration {recorded}ns differs from elapsed {computed}ns")
            }
            Anomaly::OutputReferenceMismatch { requested, resolved } => {
                write!(f, "output {resolved} differs from requested {requested}")
            }
            Anomaly::MissingCompletion { phase } => {
                write!(f, "phase is {phase} but completionTimestamp is missing")
            }
        }
    }
}

/// Every anomaly found in `record`, in a stable order.
pub fn check(record: &BuildRecord) -> Vec<Anomaly> {
    let status = &record.status;
    let mut found = Vec::new();

    if status.phase == BuildPhase::Complete {
        if let Some(reason) = status.reason.as_ref().filter(|r| !r.is_empty()) {
            found.push(Anomaly::PhaseReasonMismatch {
                phase: status.phase.clone(),
                reason: reason.clone(),
            });
        }
    }

    if status.phase.is_terminal() && status.completion_timestamp.is_none() {
        found.push(Anomaly::MissingCompletion {
            phase: status.phase.clone(),
        });
    }

    if let (Some(start), Some(completion)) = (&status.start_timestamp, &status.completion_timestamp) {
        let (start, completion) = (start.at(), completion.at());
        if completion < start {
            found.push(Anomaly::CompletionBeforeStart { start, completion });
        } else if let Some(recorded) = status.duration {
            let computed = (completion - start)
                .num_nanoseconds()
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(u64::MAX);
            if recorded.abs_diff(computed) >= DURATION_TOLERANCE_NANOS {
                found.push(Anomaly::DurationMismatch { recorded, computed });
            }
        }
    }

    if let (Some(requested), Some(resolved)) = (
        record.spec.output_image(),
        status.output_docker_image_reference.as_deref(),
    ) {
        if requested != resolved {
            found.push(Anomaly::OutputReferenceMismatch {
                requested: requested.to_string(),
                resolved: resolved.to_string(),
            });
        }
    }

    found
}

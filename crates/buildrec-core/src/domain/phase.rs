//! Build phase state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Build phase.
///
/// State transitions:
/// - New -> Pending -> Running -> Complete
/// - New | Pending | Running -> Failed | Error | Cancelled
///
/// Phases this model does not know are kept verbatim in `Other` so that a
/// record from a newer cluster re-encodes unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildPhase {
    /// Created, not yet scheduled.
    New,

    /// Waiting for a pod to start.
    Pending,

    /// Build pod is running.
    Running,

    /// Finished. The `reason` field is independent of this value.
    Complete,

    /// The build itself failed.
    Failed,

    /// The build could not be run (infrastructure problem).
    Error,

    /// Stopped by a user.
    Cancelled,

    Other(String),
}

impl BuildPhase {
    pub fn as_str(&self) -> &str {
        match self {
            BuildPhase::New => "New",
            BuildPhase::Pending => "Pending",
            BuildPhase::Running => "Running",
            BuildPhase::Complete => "Complete",
            BuildPhase::Failed => "Failed",
            BuildPhase::Error => "Error",
            BuildPhase::Cancelled => "Cancelled",
            BuildPhase::Other(raw) => raw,
        }
    }

    /// Is this a terminal phase (record is frozen)?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildPhase::Complete | BuildPhase::Failed | BuildPhase::Error | BuildPhase::Cancelled
        )
    }

    /// Terminal without a successful outcome.
    pub fn is_failed(&self) -> bool {
        matches!(self, BuildPhase::Failed | BuildPhase::Error | BuildPhase::Cancelled)
    }

    /// Is `self -> next` a legal move?
    pub fn can_transition_to(&self, next: &BuildPhase) -> bool {
        use BuildPhase::*;
        match (self, next) {
            (New, Pending) | (Pending, Running) | (Running, Complete) => true,
            (New | Pending | Running, Failed | Error | Cancelled) => true,
            _ => false,
        }
    }
}

impl From<String> for BuildPhase {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "New" => BuildPhase::New,
            "Pending" => BuildPhase::Pending,
            "Running" => BuildPhase::Running,
            "Complete" => BuildPhase::Complete,
            "Failed" => BuildPhase::Failed,
            "Error" => BuildPhase::Error,
            "Cancelled" => BuildPhase::Cancelled,
            _ => BuildPhase::Other(raw),
        }
    }
}

impl From<BuildPhase> for String {
    fn from(phase: BuildPhase) -> Self {
        match phase {
            BuildPhase::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

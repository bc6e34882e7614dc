//! Artifact stages and the transition table
//!
//! Stages: NEW → STAGED → APPROVED → INGESTED, with REJECTED reachable
//! from STAGED or APPROVED. A stage is never stored as a field anywhere:
//! it is the name of the ledger directory holding the artifact's record.

mod transitions;

pub use transitions::{transition_for, Handler, Transition, TRANSITIONS};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle stage of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Present in the bucket, no record in the ledger yet
    New,
    /// Record under `staged/`, waiting for an approval gate
    Staged,
    /// Gate merged, ready for ingestion
    Approved,
    /// Ingestion succeeded
    Ingested,
    /// Gate closed without merging
    Rejected,
}

impl Stage {
    /// Every stage in the order the resolver probes them
    pub const ALL: [Stage; 5] = [
        Stage::New,
        Stage::Staged,
        Stage::Approved,
        Stage::Ingested,
        Stage::Rejected,
    ];

    /// Directory name of this stage in the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::New => "new",
            Stage::Staged => "staged",
            Stage::Approved => "approved",
            Stage::Ingested => "ingested",
            Stage::Rejected => "rejected",
        }
    }

    /// Stages that wait for something outside this process
    pub fn is_resting(&self) -> bool {
        matches!(self, Stage::New | Stage::Ingested | Stage::Rejected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Ingested | Stage::Rejected)
    }

    /// Stage the normal forward chain leads to, if any
    pub fn next(&self) -> Option<Stage> {
        transition_for(*self).next
    }

    /// Check if moving a record from this stage to `target` is a valid edge
    pub fn can_transition_to(&self, target: Stage) -> bool {
        match (self, target) {
            (Stage::New, Stage::Staged) => true,
            (Stage::Staged, Stage::Approved) => true,
            (Stage::Approved, Stage::Ingested) => true,

            // Explicit rejection edges
            (Stage::Staged, Stage::Rejected) => true,
            (Stage::Approved, Stage::Rejected) => true,

            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown stage name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage {0:?}")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

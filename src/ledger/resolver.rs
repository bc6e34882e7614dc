//! State resolver: where is the record right now?

use crate::artifact::Artifact;
use crate::error::LaneError;
use crate::ledger::Ledger;
use crate::stage::Stage;

/// Current stage of `artifact` on the main line.
///
/// Probes stage directories in `Stage::ALL` order and returns the first
/// holding the record; a record found nowhere means `Stage::New`. Failed
/// probes are errors, not absence.
pub fn resolve(ledger: &Ledger<'_>, artifact: &Artifact) -> Result<Stage, LaneError> {
    for stage in Stage::ALL {
        if ledger
            .probe(stage, artifact, ledger.main_branch())?
            .is_some()
        {
            tracing::debug!(artifact = artifact.key(), %stage, "resolved stage");
            return Ok(stage);
        }
    }
    tracing::debug!(artifact = artifact.key(), "no record in ledger, treating as new");
    Ok(Stage::New)
}

/// Every stage directory holding the record on the main line
pub fn locations(ledger: &Ledger<'_>, artifact: &Artifact) -> Result<Vec<Stage>, LaneError> {
    let mut found = Vec::new();
    for stage in Stage::ALL {
        if ledger
            .probe(stage, artifact, ledger.main_branch())?
            .is_some()
        {
            found.push(stage);
        }
    }
    Ok(found)
}

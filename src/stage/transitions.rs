//! Transition table: stage → (handler, next stage)

use super::Stage;

/// Work bound to a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Copy the bucket's record into the ledger under `staged/`
    MarkStaged,
    /// Open or inspect the approval gate
    RequestApproval,
    /// Verify and run the ingestion command
    Ingest,
    ReportIngested,
    ReportRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub stage: Stage,
    pub handler: Handler,
    pub next: Option<Stage>,
    /// Whether reaching `next` continues processing in the same pass
    pub cascades: bool,
}

/// One row per stage, in probe order
pub const TRANSITIONS: [Transition; 5] = [
    Transition {
        stage: Stage::New,
        handler: Handler::MarkStaged,
        next: Some(Stage::Staged),
        cascades: true,
    },
    Transition {
        stage: Stage::Staged,
        handler: Handler::RequestApproval,
        next: Some(Stage::Approved),
        cascades: false,
    },
    Transition {
        stage: Stage::Approved,
        handler: Handler::Ingest,
        next: Some(Stage::Ingested),
        cascades: false,
    },
    Transition {
        stage: Stage::Ingested,
        handler: Handler::ReportIngested,
        next: None,
        cascades: false,
    },
    Transition {
        stage: Stage::Rejected,
        handler: Handler::ReportRejected,
        next: None,
        cascades: false,
    },
];

/// Row of the table for `stage`
pub fn transition_for(stage: Stage) -> &'static Transition {
    // Discriminants follow declaration order, which is also the row order
    &TRANSITIONS[stage as usize]
}

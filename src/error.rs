//! Error taxonomy (§7). Components that handle transient failure internally
//! (retry, degrade, log-and-continue) work in terms of `anyhow::Result`, the
//! way the teacher's controller tick does; component boundaries that callers
//! need to match on (the planner, the coordinator, loadpoint setters) return
//! this concrete enum instead.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("transient I/O failure: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("vehicle {vehicle} already owned by loadpoint {owned_by}, requested by {requested_by}")]
    OwnershipConflict {
        vehicle: String,
        requested_by: String,
        owned_by: String,
    },

    #[error("deadline plan infeasible: short by {shortfall:?}")]
    InfeasiblePlan { shortfall: Duration },

    #[error("safety breach: {0}")]
    SafetyBreach(String),
}

impl ControlError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }
}

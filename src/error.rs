//! Error kinds for the attack core.
//!
//! Fatal variants (`OracleFailure`, `Inconsistent`, `InternalAssert`) bubble up
//! and abort the attack. Soft variants (`Timeout`, `DecisionBudget`) cause the
//! attack loop to break early; the caller is expected to still run the
//! backbone analyzer over whatever I/O evidence was gathered before the break.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AttackError {
    /// The oracle subprocess exited non-zero, or its output did not contain
    /// exactly `expected` whitespace-separated bits.
    #[snafu(display(
        "oracle failure: {source}"
    ))]
    OracleFailure { source: crate::oracle::OracleError },

    /// The rewriter derived a trivially-false clause: the formula plus the
    /// evidence gathered so far is UNSAT even before `l_out` is asserted.
    /// This means the oracle disagrees with every key the circuit structure
    /// can express, which is either an oracle bug or a malformed circuit.
    #[snafu(display(
        "oracle observation (x={x:?}, y={y:?}) is inconsistent with the locked circuit's structure"
    ))]
    Inconsistent { x: Vec<bool>, y: Vec<bool> },

    /// Wall-clock budget exceeded between iterations.
    #[snafu(display("timed out after {iterations} iterations"))]
    Timeout { iterations: usize },

    /// Solver decision budget exceeded during a single solve.
    #[snafu(display("decision budget exceeded during iteration {iteration}"))]
    DecisionBudget { iteration: usize },

    /// An invariant the core relies on was violated, e.g. a frozen variable
    /// had no model value after a SAT result.
    #[snafu(display("internal invariant violated: {what}"))]
    InternalAssert { what: String },
}

/// Outcome of a completed or aborted attack, distinguishing hard failures
/// (caller must stop) from soft ones (caller may still query the backbone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    DecisionBudget,
}

impl AttackError {
    /// Classify a soft failure, if this error is one. Fatal variants return
    /// `None`: they are not recoverable by falling back to the backbone.
    pub fn soft_kind(&self) -> Option<FailureKind> {
        match self {
            AttackError::Timeout { .. } => Some(FailureKind::Timeout),
            AttackError::DecisionBudget { .. } => Some(FailureKind::DecisionBudget),
            _ => None,
        }
    }
}

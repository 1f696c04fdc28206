//! A CEGAR/SAT-based key-recovery attack against combinational logic
//! locking (Subramanyan, Ray & Malik, *Evaluating the Security of Logic
//! Encryption Algorithms*, HOST 2015): given oracle access to an activated
//! chip and the locked (but keyless) netlist, recover a key that reproduces
//! the oracle's behavior on every input.
//!
//! The seven components are laid out one module per file:
//! - [`circuit`]: the gate graph (component A).
//! - [`cnf`]: Tseitin CNF encoding (component B).
//! - [`miter`]: doubled-circuit construction (component C).
//! - [`rewriter`]: per-observation clause rewriting (component D).
//! - [`attack`]: the CEGAR loop and public entry point (component E).
//! - [`backbone`]: post-termination forced-bit analysis (component F).
//! - [`oracle`]: the activated-chip interface (component G).
//!
//! [`netlist`] is a thin convenience reader for tests, the demo binary and
//! benchmarks; [`report`] (de)serializes a finished attack's key and I/O
//! trace; neither is part of the attack core.

pub mod attack;
pub mod backbone;
pub mod circuit;
pub mod cnf;
pub mod error;
pub mod miter;
pub mod netlist;
pub mod oracle;
pub mod report;
pub mod rewriter;

pub use attack::{Attack, AttackConfig, IoRecord, RecoveredKey};
pub use circuit::{Circuit, GateFunc, Node, NodeKind};
pub use error::{AttackError, FailureKind};
pub use miter::Miter;
pub use oracle::{Oracle, OracleError, SimulatorOracle, SubprocessOracle};
pub use report::{deserialize_report, serialize_report, AttackReport};

/// Run an attack to completion, falling back to the backbone analyzer's
/// partial key on a soft failure instead of propagating it. The convenience
/// wrapper most callers want over driving [`Attack`] directly.
///
/// Returns `Ok(Full(key))` on a clean CEGAR termination, `Ok(Partial(bits))`
/// after a `Timeout`/`DecisionBudget` soft failure, and `Err` only for the
/// fatal error kinds.
pub fn recover_key(mut attack: Attack) -> Result<RecoverKeyOutcome, AttackError> {
    match attack.solve() {
        Ok(key) => Ok(RecoverKeyOutcome::Full(key)),
        Err(err) if err.soft_kind().is_some() => {
            let backbone = attack.find_fixed_keys()?;
            Ok(RecoverKeyOutcome::Partial(backbone))
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone)]
pub enum RecoverKeyOutcome {
    Full(RecoveredKey),
    Partial(std::collections::BTreeMap<usize, bool>),
}

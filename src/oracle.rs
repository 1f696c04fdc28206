//! The attack only ever needs to ask an activated but otherwise opaque chip
//! "what does it output for this input".
//!
//! Two implementations are provided: an in-process simulator for testing
//! and for circuits where the correctly-keyed netlist is known, and a
//! subprocess oracle for treating an external binary as the activated chip.
//! The subprocess oracle runs the child directly and reads its stdout,
//! which needs no shell and leaves no temp file behind.

use std::process::Command;

use crate::circuit::Circuit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The child process could not be spawned at all (binary missing, not
    /// executable, ...).
    Spawn { message: String },
    /// The child exited with a non-zero status.
    NonZeroExit { status: Option<i32> },
    /// The child's stdout did not contain exactly `expected` whitespace
    /// separated `0`/`1` tokens.
    MalformedOutput { expected: usize, got: String },
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Spawn { message } => write!(f, "failed to spawn oracle process: {message}"),
            OracleError::NonZeroExit { status } => {
                write!(f, "oracle process exited with status {status:?}")
            }
            OracleError::MalformedOutput { expected, got } => {
                write!(f, "expected {expected} whitespace-separated output bits, got {got:?}")
            }
        }
    }
}

impl std::error::Error for OracleError {}

/// Anything that can answer `eval(x) -> y` for a fixed, unknown key.
/// Implementations must be deterministic: the same `x` must always produce
/// the same `y`, since the attack's soundness depends on it.
pub trait Oracle {
    fn eval(&mut self, x: &[bool]) -> Result<Vec<bool>, OracleError>;
}

/// Queries a [`Circuit`] directly with a fixed key, standing in for a
/// correctly-keyed chip. Used by tests and by the demo binary, where the
/// "activated chip" is just the same netlist evaluated with the real key.
pub struct SimulatorOracle {
    circuit: Circuit,
    key: Vec<bool>,
}

impl SimulatorOracle {
    pub fn new(circuit: Circuit, key: Vec<bool>) -> Self {
        assert_eq!(key.len(), circuit.kis.len(), "key length must match circuit's key-input count");
        Self { circuit, key }
    }
}

impl Oracle for SimulatorOracle {
    fn eval(&mut self, x: &[bool]) -> Result<Vec<bool>, OracleError> {
        Ok(self.circuit.eval_plain(x, &self.key))
    }
}

/// Treats an external binary as the oracle: one `"0"`/`"1"` command-line
/// argument per primary input bit, one line of whitespace-separated `0`/`1`
/// tokens on stdout as the response.
pub struct SubprocessOracle {
    program: String,
    num_outputs: usize,
}

impl SubprocessOracle {
    pub fn new(program: impl Into<String>, num_outputs: usize) -> Self {
        Self { program: program.into(), num_outputs }
    }
}

impl Oracle for SubprocessOracle {
    fn eval(&mut self, x: &[bool]) -> Result<Vec<bool>, OracleError> {
        let args: Vec<&str> = x.iter().map(|&b| if b { "1" } else { "0" }).collect();
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| OracleError::Spawn { message: e.to_string() })?;

        if !output.status.success() {
            return Err(OracleError::NonZeroExit { status: output.status.code() });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let bits: Result<Vec<bool>, ()> = stdout
            .split_whitespace()
            .map(|tok| match tok {
                "0" => Ok(false),
                "1" => Ok(true),
                _ => Err(()),
            })
            .collect();

        match bits {
            Ok(bits) if bits.len() == self.num_outputs => Ok(bits),
            _ => Err(OracleError::MalformedOutput {
                expected: self.num_outputs,
                got: stdout.trim().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{GateFunc, NodeKind};

    fn and_lock() -> Circuit {
        let mut c = Circuit::new();
        let x0 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let k0 = c.add_node(NodeKind::KeyInput, vec![]).unwrap();
        let g = c.add_node(NodeKind::Gate(GateFunc::Xor), vec![x0, k0]).unwrap();
        c.add_node(NodeKind::PrimaryOutput, vec![g]).unwrap();
        c
    }

    #[test]
    fn simulator_oracle_applies_fixed_key() {
        let mut oracle = SimulatorOracle::new(and_lock(), vec![true]);
        assert_eq!(oracle.eval(&[false]).unwrap(), vec![true]);
        assert_eq!(oracle.eval(&[true]).unwrap(), vec![false]);
    }

    #[test]
    fn subprocess_oracle_reports_spawn_failure() {
        let mut oracle = SubprocessOracle::new("/nonexistent/binary/does-not-exist", 1);
        let err = oracle.eval(&[false]).unwrap_err();
        assert!(matches!(err, OracleError::Spawn { .. }));
    }

    #[test]
    fn subprocess_oracle_parses_stdout_bits() {
        // `/bin/echo` stands in for a well-behaved oracle binary that was
        // invoked with one "0"/"1" argument per input bit.
        let mut oracle = SubprocessOracle::new("/bin/echo", 2);
        let out = oracle.eval(&[true, false]).unwrap();
        assert_eq!(out, vec![true, false]);
    }
}

//! Tseitin-encodes a [`Circuit`] into a SAT solver instance, returning a
//! node-index -> literal map (`LitMap`).
//!
//! The solver backend is `rustsat-batsat` (pure Rust, no C/C++ toolchain
//! needed to build against), driven through `rustsat`'s `Solve`/
//! `SolveIncremental` traits. Variable indices are allocated by this
//! encoder (a plain monotonic counter), not by the solver.

use rustsat::solvers::{Solve, SolveIncremental, SolverResult};
use rustsat::types::{Lit, TernaryVal};
use rustsat_batsat::BasicSolver;

use crate::circuit::{Circuit, GateFunc, NodeKind};
use crate::error::AttackError;

/// Injection from source-node index to its literal in the solver. For the
/// miter this covers both copies, since the doubled circuit is just another
/// `Circuit`.
#[derive(Debug, Clone)]
pub struct LitMap(Vec<Option<Lit>>);

impl LitMap {
    fn new(len: usize) -> Self {
        Self(vec![None; len])
    }

    fn set(&mut self, node_index: usize, lit: Lit) {
        self.0[node_index] = Some(lit);
    }

    pub fn get(&self, node_index: usize) -> Lit {
        self.0[node_index].expect("node was not encoded before being referenced")
    }
}

/// Tseitin encoder + the solver it drove. Owns the only mutable handle to
/// the solver; nothing outside this type touches it directly.
pub struct CnfEncoder {
    solver: BasicSolver,
    next_var: u32,
    n_clauses: usize,
    /// Bookkeeping only: `rustsat-batsat` does no variable-elimination
    /// preprocessing, so `freeze` has nothing to *do* today, but callers
    /// still rely on the call existing and being honored if the backend
    /// ever changes.
    frozen: Vec<Lit>,
}

impl CnfEncoder {
    fn new() -> Self {
        Self { solver: BasicSolver::default(), next_var: 0, n_clauses: 0, frozen: Vec::new() }
    }

    /// Allocate a fresh solver variable. Exposed crate-wide since the
    /// rewriter must allocate its own per-record auxiliary variables using
    /// the same counter, not just the encoder's initial structural pass.
    pub(crate) fn fresh_lit(&mut self) -> Lit {
        let idx = self.next_var;
        self.next_var += 1;
        Lit::positive(idx)
    }

    pub(crate) fn add_clause(&mut self, lits: Vec<Lit>) -> Result<(), AttackError> {
        self.solver.add_clause(lits.into_iter().collect()).map_err(|_| {
            AttackError::InternalAssert { what: "solver rejected a well-formed clause".into() }
        })?;
        self.n_clauses += 1;
        Ok(())
    }

    pub fn freeze(&mut self, lits: impl IntoIterator<Item = Lit>) {
        self.frozen.extend(lits);
    }

    pub fn n_vars(&self) -> u32 {
        self.next_var
    }

    pub fn n_clauses(&self) -> usize {
        self.n_clauses
    }

    /// Solver decision count, when the backend reports one. `rustsat-batsat`
    /// surfaces this through its solve statistics; callers use it to enforce
    /// an optional per-solve decision budget.
    pub fn num_decisions(&self) -> u64 {
        self.solver.stats().decisions
    }

    /// Solve under `assumptions`. Used both for "solve under `l_out = true`"
    /// in the main attack loop and for the backbone analyzer's per-bit flip
    /// probes.
    pub fn solve(&mut self, assumptions: &[Lit]) -> Result<bool, AttackError> {
        let result = self.solver.solve_assumps(assumptions.to_vec()).map_err(|_| {
            AttackError::InternalAssert { what: "solver failed to complete a solve call".into() }
        })?;
        Ok(matches!(result, SolverResult::Sat))
    }

    /// Model value of a literal after a SAT result. `None` means the
    /// variable was eliminated or never touched by the formula; callers
    /// treat this as an internal-assertion failure when it happens to a
    /// frozen variable, since that should never occur.
    pub fn model_value(&self, lit: Lit) -> Option<bool> {
        match self.solver.lit_val(lit) {
            Ok(TernaryVal::True) => Some(true),
            Ok(TernaryVal::False) => Some(false),
            _ => None,
        }
    }

    fn encode_and_like(&mut self, y: Lit, ins: &[Lit], invert: bool) -> Result<(), AttackError> {
        let yy = if invert { !y } else { y };
        for &x in ins {
            self.add_clause(vec![!yy, x])?;
        }
        let mut wide = vec![yy];
        wide.extend(ins.iter().map(|&x| !x));
        self.add_clause(wide)
    }

    fn encode_or_like(&mut self, y: Lit, ins: &[Lit], invert: bool) -> Result<(), AttackError> {
        let yy = if invert { !y } else { y };
        for &x in ins {
            self.add_clause(vec![yy, !x])?;
        }
        let mut wide = vec![!yy];
        wide.extend(ins.iter().copied());
        self.add_clause(wide)
    }

    fn encode_binary_xor(&mut self, y: Lit, a: Lit, b: Lit) -> Result<(), AttackError> {
        self.add_clause(vec![!y, a, b])?;
        self.add_clause(vec![!y, !a, !b])?;
        self.add_clause(vec![y, !a, b])?;
        self.add_clause(vec![y, a, !b])
    }

    /// Fold an n-ary XOR into a pairwise tree of fresh auxiliary variables,
    /// each constrained by [`Self::encode_binary_xor`]. Done at the CNF
    /// level rather than the gate-graph level, since [`Circuit`] only ever
    /// stores the n-ary XOR as one node.
    fn fold_xor_tree(&mut self, ins: &[Lit]) -> Result<Lit, AttackError> {
        if ins.len() == 1 {
            return Ok(ins[0]);
        }
        let mut next = Vec::with_capacity(ins.len().div_ceil(2));
        for pair in ins.chunks(2) {
            if pair.len() == 2 {
                let v = self.fresh_lit();
                self.encode_binary_xor(v, pair[0], pair[1])?;
                next.push(v);
            } else {
                next.push(pair[0]);
            }
        }
        self.fold_xor_tree(&next)
    }

    fn encode_xor_like(&mut self, y: Lit, ins: &[Lit], invert: bool) -> Result<(), AttackError> {
        let folded = self.fold_xor_tree(ins)?;
        let yy = if invert { !y } else { y };
        self.add_clause(vec![!yy, folded])?;
        self.add_clause(vec![yy, !folded])
    }

    fn encode_gate(&mut self, func: GateFunc, ins: &[Lit]) -> Result<Lit, AttackError> {
        match func {
            GateFunc::Const(v) => {
                let y = self.fresh_lit();
                self.add_clause(vec![if v { y } else { !y }])?;
                Ok(y)
            }
            GateFunc::Not => Ok(!ins[0]),
            GateFunc::Buf => Ok(ins[0]),
            GateFunc::And => {
                let y = self.fresh_lit();
                self.encode_and_like(y, ins, false)?;
                Ok(y)
            }
            GateFunc::Nand => {
                let y = self.fresh_lit();
                self.encode_and_like(y, ins, true)?;
                Ok(y)
            }
            GateFunc::Or => {
                let y = self.fresh_lit();
                self.encode_or_like(y, ins, false)?;
                Ok(y)
            }
            GateFunc::Nor => {
                let y = self.fresh_lit();
                self.encode_or_like(y, ins, true)?;
                Ok(y)
            }
            GateFunc::Xor => {
                let y = self.fresh_lit();
                self.encode_xor_like(y, ins, false)?;
                Ok(y)
            }
            GateFunc::Xnor => {
                let y = self.fresh_lit();
                self.encode_xor_like(y, ins, true)?;
                Ok(y)
            }
        }
    }
}

/// Encode every node of `circuit` in topological order, freezing PI/KI/PO
/// literals. `NOT`/`BUF` are free: they fold into the literal of their
/// single fanin instead of allocating a fresh variable.
pub fn encode(circuit: &Circuit) -> Result<(CnfEncoder, LitMap), AttackError> {
    let mut enc = CnfEncoder::new();
    let mut lmap = LitMap::new(circuit.num_nodes());

    for node in circuit.topo_iter() {
        let lit = match node.kind {
            NodeKind::PrimaryInput | NodeKind::KeyInput => enc.fresh_lit(),
            NodeKind::Gate(func) => {
                let ins: Vec<Lit> = node.fanins.iter().map(|&f| lmap.get(f)).collect();
                enc.encode_gate(func, &ins)?
            }
            NodeKind::PrimaryOutput => lmap.get(node.fanins[0]),
        };
        lmap.set(node.index, lit);
    }

    enc.freeze(circuit.pis.iter().map(|&i| lmap.get(i)));
    enc.freeze(circuit.kis.iter().map(|&i| lmap.get(i)));
    enc.freeze(circuit.pos.iter().map(|&i| lmap.get(i)));

    Ok((enc, lmap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::NodeKind;

    fn and_gate_circuit() -> Circuit {
        let mut c = Circuit::new();
        let x0 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let x1 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let g = c.add_node(NodeKind::Gate(GateFunc::And), vec![x0, x1]).unwrap();
        c.add_node(NodeKind::PrimaryOutput, vec![g]).unwrap();
        c
    }

    #[test]
    fn and_gate_cnf_matches_truth_table() {
        let circuit = and_gate_circuit();
        let (mut enc, lmap) = encode(&circuit).unwrap();
        let x0 = lmap.get(circuit.pis[0]);
        let x1 = lmap.get(circuit.pis[1]);
        let y = lmap.get(circuit.pos[0]);

        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            let la = if a { x0 } else { !x0 };
            let lb = if b { x1 } else { !x1 };
            assert!(enc.solve(&[la, lb]).unwrap());
            assert_eq!(enc.model_value(y), Some(a && b));
        }
    }

    #[test]
    fn xor3_cnf_matches_truth_table() {
        let mut c = Circuit::new();
        let x0 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let x1 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let x2 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let g = c.add_node(NodeKind::Gate(GateFunc::Xor), vec![x0, x1, x2]).unwrap();
        c.add_node(NodeKind::PrimaryOutput, vec![g]).unwrap();

        let (mut enc, lmap) = encode(&c).unwrap();
        let lits: Vec<Lit> = c.pis.iter().map(|&p| lmap.get(p)).collect();
        let y = lmap.get(c.pos[0]);

        for bits in 0u8..8 {
            let assumps: Vec<Lit> = (0..3)
                .map(|i| {
                    let set = (bits >> i) & 1 == 1;
                    if set { lits[i] } else { !lits[i] }
                })
                .collect();
            assert!(enc.solve(&assumps).unwrap());
            let expected = (0..3).fold(false, |acc, i| acc ^ ((bits >> i) & 1 == 1));
            assert_eq!(enc.model_value(y), Some(expected));
        }
    }
}

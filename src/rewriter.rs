//! I/O clause rewriter.
//!
//! The miter's structural Tseitin clauses (added once, by [`crate::cnf::encode`])
//! state "this gate computes this function of its fanins" for every possible
//! input: they never mention a concrete `x`. Pinning an observed `(x, y)`
//! pair directly as unit clauses on the shared PI/PO variables would corrupt
//! every other recorded pair that used a different `x`, since the formula
//! persists across the whole attack.
//!
//! Instead, for each new pair this module walks the doubled circuit
//! topologically with `x`'s bits substituted for the primary inputs, folding
//! away everything that becomes a plain constant and allocating a fresh
//! auxiliary variable only where a value still genuinely depends on the key.
//! The only variables these fresh clauses ever share with each other (or
//! with the structural clauses) are the persistent key-input literals, so
//! pinning one observation's PI/PO values never leaks into another's.
//!
//! Resubmitting an identical `(x, y)` pair must add no new clauses or
//! variables: subtrees whose fanin cone never touches a primary input
//! compute the same symbolic result on every call (the "purely keyed"
//! case) and are memoized for good in `key_only_lit`. Subtrees that *do*
//! touch a primary input only collapse to a pure function of the key once
//! `x` is fixed, so they're memoized per-`x` in `pi_dependent_cache`
//! instead, keyed by a fingerprint of the current `x`. A hash-based clause
//! dedup set catches anything that still manages to duplicate a clause.

use hashbrown::{HashMap, HashSet};
use rustsat::types::Lit;
use xxhash_rust::xxh3::xxh3_64;

use crate::circuit::{Circuit, GateFunc, NodeKind};
use crate::cnf::{CnfEncoder, LitMap};
use crate::error::AttackError;
use crate::miter::Miter;

/// A value that is either pinned by constant propagation from `x`, or still
/// a live solver literal (key-dependent).
#[derive(Debug, Clone, Copy)]
enum VL {
    Const(bool),
    Var(Lit),
}

impl VL {
    fn neg(self) -> VL {
        match self {
            VL::Const(b) => VL::Const(!b),
            VL::Var(l) => VL::Var(!l),
        }
    }
}

enum ClauseOutcome {
    TriviallyTrue,
    TriviallyFalse,
    Clause(Vec<Lit>),
}

fn simplify_clause(lits: Vec<VL>) -> ClauseOutcome {
    let mut out = Vec::with_capacity(lits.len());
    for l in lits {
        match l {
            VL::Const(true) => return ClauseOutcome::TriviallyTrue,
            VL::Const(false) => {}
            VL::Var(lit) => out.push(lit),
        }
    }
    if out.is_empty() {
        ClauseOutcome::TriviallyFalse
    } else {
        ClauseOutcome::Clause(out)
    }
}

fn clause_hash(lits: &[Lit]) -> u64 {
    let mut ints: Vec<i32> = lits.iter().map(|l| l.to_ipasir()).collect();
    ints.sort_unstable();
    let bytes: Vec<u8> = ints.iter().flat_map(|i| i.to_le_bytes()).collect();
    xxh3_64(&bytes)
}

/// Fingerprint of an `x` pattern, used to tell whether a `pi_dependent_cache`
/// entry from an earlier call is still valid for the current one.
fn x_fingerprint(x: &[bool]) -> u64 {
    let bytes: Vec<u8> = x.iter().map(|&b| b as u8).collect();
    xxh3_64(&bytes)
}

pub struct Rewriter {
    /// Per doubled-circuit-node: does its fanin cone include a primary
    /// input? Computed once at construction from the static graph.
    depends_on_pi: Vec<bool>,
    key_only_lit: HashMap<usize, VL>,
    /// Per PI-dependent gate node: the `x` fingerprint it was last computed
    /// under, and the result. A node whose fanin cone touches a primary
    /// input can still settle into a value that depends only on the key
    /// once `x` is substituted (e.g. `AND(k0, k1)` sitting behind a
    /// PI-dependent ancestor elsewhere in the circuit); without this cache
    /// the same `(x, y)` submitted twice would allocate a fresh auxiliary
    /// variable and clauses for that node every time, instead of reusing
    /// the ones it already added, breaking resubmission idempotence.
    pi_dependent_cache: HashMap<usize, (u64, VL)>,
    seen_clause_hashes: HashSet<u64>,
    /// Reused across calls to `add_io` instead of reallocating per record.
    scratch: Vec<Option<VL>>,
}

impl Rewriter {
    pub fn new(circuit: &Circuit) -> Self {
        let mut depends_on_pi = vec![false; circuit.num_nodes()];
        for node in circuit.topo_iter() {
            depends_on_pi[node.index] = match node.kind {
                NodeKind::PrimaryInput => true,
                NodeKind::KeyInput => false,
                NodeKind::Gate(_) | NodeKind::PrimaryOutput => {
                    node.fanins.iter().any(|&f| depends_on_pi[f])
                }
            };
        }
        let len = circuit.num_nodes();
        Self {
            depends_on_pi,
            key_only_lit: HashMap::new(),
            pi_dependent_cache: HashMap::new(),
            seen_clause_hashes: HashSet::new(),
            scratch: vec![None; len],
        }
    }

    /// Rewrite and assert the clauses implied by observing `(x, y)` on
    /// `miter`. `x` is indexed like the source circuit's PIs (shared in the
    /// miter); `y` is indexed like the source circuit's POs and must hold
    /// for both key copies.
    pub fn add_io_miter(
        &mut self,
        enc: &mut CnfEncoder,
        miter: &Miter,
        lmap: &LitMap,
        x: &[bool],
        y: &[bool],
    ) -> Result<(), AttackError> {
        let targets: Vec<(usize, usize)> =
            pos_of(miter).iter().map(|&source_po| miter.pair_map[source_po]).collect();
        self.rewrite(enc, &miter.circuit, lmap, x, y, &targets)
    }

    /// Same as [`Self::add_io_miter`] but over a plain, un-doubled circuit
    /// with a single key copy, as used by the backbone analyzer once the
    /// CEGAR loop has handed it a candidate key to probe.
    pub fn add_io_single(
        &mut self,
        enc: &mut CnfEncoder,
        circuit: &Circuit,
        lmap: &LitMap,
        x: &[bool],
        y: &[bool],
    ) -> Result<(), AttackError> {
        let targets: Vec<(usize, usize)> = circuit
            .pos
            .iter()
            .map(|&po| {
                let driver = circuit.node(po).fanins[0];
                (driver, driver)
            })
            .collect();
        self.rewrite(enc, circuit, lmap, x, y, &targets)
    }

    /// Shared core: substitute `x` through `circuit`, then force each
    /// `(driver_a, driver_b)` pair in `targets` (identical pair for a
    /// single-copy circuit) to the matching bit of `y`.
    fn rewrite(
        &mut self,
        enc: &mut CnfEncoder,
        circuit: &Circuit,
        lmap: &LitMap,
        x: &[bool],
        y: &[bool],
        targets: &[(usize, usize)],
    ) -> Result<(), AttackError> {
        for v in self.scratch.iter_mut() {
            *v = None;
        }

        let x_fp = x_fingerprint(x);

        for (pi_index, &pi_node) in circuit.pis.iter().enumerate() {
            self.scratch[pi_node] = Some(VL::Const(x[pi_index]));
        }

        for node in circuit.topo_iter() {
            if self.scratch[node.index].is_some() {
                continue;
            }
            self.scratch[node.index] = Some(match node.kind {
                NodeKind::PrimaryInput => unreachable!("every PI was seeded above"),
                NodeKind::KeyInput => VL::Var(lmap.get(node.index)),
                NodeKind::Gate(func) => {
                    if !self.depends_on_pi[node.index] {
                        if let Some(&vl) = self.key_only_lit.get(&node.index) {
                            vl
                        } else {
                            let ins: Vec<VL> =
                                node.fanins.iter().map(|&f| self.scratch[f].unwrap()).collect();
                            let out = self.encode_gate(enc, func, &ins)?;
                            self.key_only_lit.insert(node.index, out);
                            out
                        }
                    } else if let Some(&(cached_fp, vl)) = self.pi_dependent_cache.get(&node.index) {
                        if cached_fp == x_fp {
                            vl
                        } else {
                            let ins: Vec<VL> =
                                node.fanins.iter().map(|&f| self.scratch[f].unwrap()).collect();
                            let out = self.encode_gate(enc, func, &ins)?;
                            self.pi_dependent_cache.insert(node.index, (x_fp, out));
                            out
                        }
                    } else {
                        let ins: Vec<VL> =
                            node.fanins.iter().map(|&f| self.scratch[f].unwrap()).collect();
                        let out = self.encode_gate(enc, func, &ins)?;
                        self.pi_dependent_cache.insert(node.index, (x_fp, out));
                        out
                    }
                }
                NodeKind::PrimaryOutput => self.scratch[node.fanins[0]].unwrap(),
            });
        }

        for (&(driver_a, driver_b), &y_bit) in targets.iter().zip(y) {
            for driver in [driver_a, driver_b] {
                match self.scratch[driver].unwrap() {
                    VL::Const(v) => {
                        if v != y_bit {
                            return Err(AttackError::Inconsistent { x: x.to_vec(), y: y.to_vec() });
                        }
                    }
                    VL::Var(lit) => {
                        let unit = if y_bit { lit } else { !lit };
                        self.push_clause(enc, vec![VL::Var(unit)])?;
                    }
                }
            }
        }

        Ok(())
    }

    fn push_clause(&mut self, enc: &mut CnfEncoder, lits: Vec<VL>) -> Result<(), AttackError> {
        match simplify_clause(lits) {
            ClauseOutcome::TriviallyTrue => Ok(()),
            ClauseOutcome::TriviallyFalse => Err(AttackError::InternalAssert {
                what: "rewriter derived a trivially-false structural clause".into(),
            }),
            ClauseOutcome::Clause(mut c) => {
                c.sort_unstable_by_key(|l| l.to_ipasir());
                c.dedup();
                if self.seen_clause_hashes.insert(clause_hash(&c)) {
                    enc.add_clause(c)?;
                }
                Ok(())
            }
        }
    }

    fn encode_gate(
        &mut self,
        enc: &mut CnfEncoder,
        func: GateFunc,
        ins: &[VL],
    ) -> Result<VL, AttackError> {
        match func {
            GateFunc::Const(v) => Ok(VL::Const(v)),
            GateFunc::Not => Ok(ins[0].neg()),
            GateFunc::Buf => Ok(ins[0]),
            GateFunc::And => self.encode_and_like(enc, ins, false),
            GateFunc::Nand => self.encode_and_like(enc, ins, true),
            GateFunc::Or => self.encode_or_like(enc, ins, false),
            GateFunc::Nor => self.encode_or_like(enc, ins, true),
            GateFunc::Xor => self.encode_xor_like(enc, ins, false),
            GateFunc::Xnor => self.encode_xor_like(enc, ins, true),
        }
    }

    fn encode_and_like(
        &mut self,
        enc: &mut CnfEncoder,
        ins: &[VL],
        invert: bool,
    ) -> Result<VL, AttackError> {
        if ins.iter().any(|v| matches!(v, VL::Const(false))) {
            return Ok(VL::Const(invert));
        }
        let free: Vec<Lit> =
            ins.iter().filter_map(|v| if let VL::Var(l) = v { Some(*l) } else { None }).collect();
        if free.is_empty() {
            return Ok(VL::Const(!invert));
        }
        if free.len() == 1 {
            return Ok(if invert { VL::Var(!free[0]) } else { VL::Var(free[0]) });
        }
        let y = enc.fresh_lit();
        let yy = if invert { !y } else { y };
        for &f in &free {
            self.push_clause(enc, vec![VL::Var(!yy), VL::Var(f)])?;
        }
        let mut wide = vec![VL::Var(yy)];
        wide.extend(free.iter().map(|&f| VL::Var(!f)));
        self.push_clause(enc, wide)?;
        Ok(VL::Var(y))
    }

    fn encode_or_like(
        &mut self,
        enc: &mut CnfEncoder,
        ins: &[VL],
        invert: bool,
    ) -> Result<VL, AttackError> {
        if ins.iter().any(|v| matches!(v, VL::Const(true))) {
            return Ok(VL::Const(!invert));
        }
        let free: Vec<Lit> =
            ins.iter().filter_map(|v| if let VL::Var(l) = v { Some(*l) } else { None }).collect();
        if free.is_empty() {
            return Ok(VL::Const(invert));
        }
        if free.len() == 1 {
            return Ok(if invert { VL::Var(!free[0]) } else { VL::Var(free[0]) });
        }
        let y = enc.fresh_lit();
        let yy = if invert { !y } else { y };
        for &f in &free {
            self.push_clause(enc, vec![VL::Var(yy), VL::Var(!f)])?;
        }
        let mut wide = vec![VL::Var(!yy)];
        wide.extend(free.iter().map(|&f| VL::Var(f)));
        self.push_clause(enc, wide)?;
        Ok(VL::Var(y))
    }

    fn xor2(&mut self, enc: &mut CnfEncoder, a: VL, b: VL) -> Result<VL, AttackError> {
        match (a, b) {
            (VL::Const(x), VL::Const(y)) => Ok(VL::Const(x ^ y)),
            (VL::Const(false), v) | (v, VL::Const(false)) => Ok(v),
            (VL::Const(true), v) | (v, VL::Const(true)) => Ok(v.neg()),
            (VL::Var(a), VL::Var(b)) => {
                let y = enc.fresh_lit();
                self.push_clause(enc, vec![VL::Var(!y), VL::Var(a), VL::Var(b)])?;
                self.push_clause(enc, vec![VL::Var(!y), VL::Var(!a), VL::Var(!b)])?;
                self.push_clause(enc, vec![VL::Var(y), VL::Var(!a), VL::Var(b)])?;
                self.push_clause(enc, vec![VL::Var(y), VL::Var(a), VL::Var(!b)])?;
                Ok(VL::Var(y))
            }
        }
    }

    fn encode_xor_like(
        &mut self,
        enc: &mut CnfEncoder,
        ins: &[VL],
        invert: bool,
    ) -> Result<VL, AttackError> {
        let mut acc = ins[0];
        for &v in &ins[1..] {
            acc = self.xor2(enc, acc, v)?;
        }
        Ok(if invert { acc.neg() } else { acc })
    }
}

/// The source circuit's PO indices, in order, recovered from the miter's
/// pair map rather than stored a second time. `miter.circuit` has no notion
/// of "the source circuit" on its own, so this just walks `pair_map` once.
fn pos_of(miter: &Miter) -> Vec<usize> {
    (0..miter.pair_map.len())
        .filter(|&i| {
            let (a, _b) = miter.pair_map[i];
            matches!(miter.circuit.node(a).kind, NodeKind::PrimaryOutput)
        })
        .collect()
}

//! A directed acyclic circuit with typed, index-stable nodes. Cross-entity
//! references are plain `usize` indices into [`Circuit::nodes`], never
//! pointers: `dup` below returns a remap table instead of rewriting a
//! parallel ownership tree. There are no back-pointers from a node to its
//! fanout; the fanout index (`Circuit::fanout`) is built on demand by
//! whoever needs it (the rewriter, mostly).
//!
//! The graph is append-only: `add_node` requires every fanin to already
//! exist, so the storage order in `nodes` is itself a valid topological order
//! and `topo_iter` is a free function of that invariant rather than a real
//! sort.

/// What kind of circuit entity a [`Node`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    PrimaryInput,
    KeyInput,
    Gate(GateFunc),
    /// A primary output. Always has exactly one fanin: the internal node it
    /// reads. Modeled as its own node (rather than a bare index into
    /// `Circuit::nodes`) so "every PO references exactly one internal node"
    /// is a structural invariant instead of a convention callers must
    /// remember.
    PrimaryOutput,
}

/// The function computed by a [`NodeKind::Gate`] node.
///
/// `And`/`Or`/`Xor`/`Nand`/`Nor`/`Xnor` accept n-ary fanin lists (n >= 1);
/// `Not`/`Buf` are unary; `Const` takes no fanins at all. This is the
/// canonical gate set a logic-locked netlist needs, without the several
/// don't-care two-input shorthands (`AANB`, `AONB`, ...) a garbling-focused
/// `GateType` enum would also carry but this crate has no use for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GateFunc {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Not,
    Buf,
    Const(bool),
}

impl GateFunc {
    pub fn arity(self) -> Option<usize> {
        match self {
            GateFunc::Not | GateFunc::Buf => Some(1),
            GateFunc::Const(_) => Some(0),
            _ => None,
        }
    }

    /// Plain-Boolean evaluation, used by the in-process oracle simulator and
    /// by tests. `inputs` must have at least `arity()` elements when `arity`
    /// is `Some`; n-ary gates fold over however many fanins they were built
    /// with.
    pub fn eval(self, inputs: &[bool]) -> bool {
        match self {
            GateFunc::And => inputs.iter().all(|&b| b),
            GateFunc::Or => inputs.iter().any(|&b| b),
            GateFunc::Xor => inputs.iter().fold(false, |acc, &b| acc ^ b),
            GateFunc::Nand => !inputs.iter().all(|&b| b),
            GateFunc::Nor => !inputs.iter().any(|&b| b),
            GateFunc::Xnor => !inputs.iter().fold(false, |acc, &b| acc ^ b),
            GateFunc::Not => !inputs[0],
            GateFunc::Buf => inputs[0],
            GateFunc::Const(v) => v,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub index: usize,
    pub kind: NodeKind,
    pub fanins: Vec<usize>,
}

/// Errors raised while building a [`Circuit`]. Kept separate from
/// `AttackError`, whose kinds are about the attack itself, not malformed
/// input; construction errors are a programmer/loader-level concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitError {
    UnknownFanin { node_index: usize, fanin: usize },
    WrongArity { node_index: usize, expected: usize, got: usize },
    NonInternalPoFanin { node_index: usize },
}

#[derive(Debug, Default, Clone)]
pub struct Circuit {
    pub pis: Vec<usize>,
    pub kis: Vec<usize>,
    pub pos: Vec<usize>,
    nodes: Vec<Node>,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Nodes in the order they were appended, which (by the append-only
    /// invariant) is already a valid topological order: every fanin index is
    /// strictly less than the index of the node that references it.
    pub fn topo_iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Append a new node. Fanins must reference nodes that already exist
    /// (indices `< self.num_nodes()`); this is what makes the resulting graph
    /// an append-only DAG by construction.
    pub fn add_node(&mut self, kind: NodeKind, fanins: Vec<usize>) -> Result<usize, CircuitError> {
        let index = self.nodes.len();
        for &f in &fanins {
            if f >= index {
                return Err(CircuitError::UnknownFanin { node_index: index, fanin: f });
            }
        }
        if let NodeKind::Gate(func) = kind {
            if let Some(expected) = func.arity() {
                if fanins.len() != expected {
                    return Err(CircuitError::WrongArity {
                        node_index: index,
                        expected,
                        got: fanins.len(),
                    });
                }
            } else if fanins.is_empty() {
                return Err(CircuitError::WrongArity { node_index: index, expected: 1, got: 0 });
            }
        }
        if matches!(kind, NodeKind::PrimaryOutput) && fanins.len() != 1 {
            return Err(CircuitError::NonInternalPoFanin { node_index: index });
        }

        self.nodes.push(Node { index, kind, fanins });
        match kind {
            NodeKind::PrimaryInput => self.pis.push(index),
            NodeKind::KeyInput => self.kis.push(index),
            NodeKind::PrimaryOutput => self.pos.push(index),
            NodeKind::Gate(_) => {}
        }
        Ok(index)
    }

    /// Fanout index, built on demand since nodes carry no back-pointers to
    /// their parents. `fanout[i]` lists the nodes that have `i` as a fanin.
    pub fn fanout(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nodes.len()];
        for node in &self.nodes {
            for &f in &node.fanins {
                out[f].push(node.index);
            }
        }
        out
    }

    /// Plain-Boolean evaluation over this circuit alone (no key duplication).
    /// Used by [`crate::oracle::SimulatorOracle`] and by tests.
    pub fn eval_plain(&self, pi_values: &[bool], ki_values: &[bool]) -> Vec<bool> {
        assert_eq!(pi_values.len(), self.pis.len(), "wrong number of PI values");
        assert_eq!(ki_values.len(), self.kis.len(), "wrong number of KI values");

        let mut values = vec![false; self.nodes.len()];
        let mut pi_iter = pi_values.iter();
        let mut ki_iter = ki_values.iter();
        for node in self.topo_iter() {
            values[node.index] = match node.kind {
                NodeKind::PrimaryInput => *pi_iter.next().unwrap(),
                NodeKind::KeyInput => *ki_iter.next().unwrap(),
                NodeKind::Gate(func) => {
                    let ins: Vec<bool> = node.fanins.iter().map(|&f| values[f]).collect();
                    func.eval(&ins)
                }
                NodeKind::PrimaryOutput => values[node.fanins[0]],
            };
        }
        self.pos.iter().map(|&p| values[p]).collect()
    }
}

/// How [`Circuit::dup`] treats primary/key inputs of the source circuit when
/// building two copies. Gate and PO nodes are always duplicated independently
/// (that is the entire point of making two copies); only PI/KI handling is
/// configurable.
///
/// The two named constants are the two policy variants in their own right
/// (`duplicate-all-keys`, `share-primary-inputs`); [`DupPolicy::MITER`]
/// combines both, which is what [`crate::miter::Miter`] actually needs: a
/// single shared `x`, and independent `kA`/`kB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DupPolicy {
    pub share_primary_inputs: bool,
    pub duplicate_keys: bool,
}

impl DupPolicy {
    pub const DUPLICATE_ALL_KEYS: Self = Self { share_primary_inputs: false, duplicate_keys: true };
    pub const SHARE_PRIMARY_INPUTS: Self =
        Self { share_primary_inputs: true, duplicate_keys: false };
    pub const MITER: Self = Self { share_primary_inputs: true, duplicate_keys: true };
}

/// Per-source-node pair of indices in the doubled circuit produced by
/// [`Circuit::dup`]. When a node is shared (per [`DupPolicy`]) `a == b`.
pub type PairMap = Vec<(usize, usize)>;

impl Circuit {
    /// Build an independent doubled circuit satisfying `policy`, returning
    /// the new circuit and the pair map from source index to `(copy_a, copy_b)`
    /// indices in it.
    pub fn dup(&self, policy: DupPolicy) -> (Circuit, PairMap) {
        let mut doubled = Circuit::new();
        let mut pair_map: PairMap = Vec::with_capacity(self.nodes.len());

        for node in self.topo_iter() {
            let shared = match node.kind {
                NodeKind::PrimaryInput => policy.share_primary_inputs,
                NodeKind::KeyInput => !policy.duplicate_keys,
                NodeKind::Gate(_) | NodeKind::PrimaryOutput => false,
            };

            let fanins_a: Vec<usize> = node.fanins.iter().map(|&f| pair_map[f].0).collect();
            let a = doubled.add_node(node.kind, fanins_a).expect("topological order preserved");

            let b = if shared {
                a
            } else {
                let fanins_b: Vec<usize> = node.fanins.iter().map(|&f| pair_map[f].1).collect();
                doubled.add_node(node.kind, fanins_b).expect("topological order preserved")
            };

            pair_map.push((a, b));
        }

        (doubled, pair_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_and_gate() -> Circuit {
        // y = x0 AND x1
        let mut c = Circuit::new();
        let x0 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let x1 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let g = c.add_node(NodeKind::Gate(GateFunc::And), vec![x0, x1]).unwrap();
        c.add_node(NodeKind::PrimaryOutput, vec![g]).unwrap();
        c
    }

    #[test]
    fn add_node_rejects_forward_fanin() {
        let mut c = Circuit::new();
        let err = c.add_node(NodeKind::Gate(GateFunc::Buf), vec![0]).unwrap_err();
        assert_eq!(err, CircuitError::UnknownFanin { node_index: 0, fanin: 0 });
    }

    #[test]
    fn add_node_rejects_wrong_arity() {
        let mut c = Circuit::new();
        let x0 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let err = c.add_node(NodeKind::Gate(GateFunc::Not), vec![x0, x0]).unwrap_err();
        assert_eq!(err, CircuitError::WrongArity { node_index: 1, expected: 1, got: 2 });
    }

    #[test]
    fn eval_plain_and_gate() {
        let c = build_and_gate();
        assert_eq!(c.eval_plain(&[false, false], &[]), vec![false]);
        assert_eq!(c.eval_plain(&[true, false], &[]), vec![false]);
        assert_eq!(c.eval_plain(&[true, true], &[]), vec![true]);
    }

    #[test]
    fn dup_shares_pis_and_duplicates_gates() {
        let c = build_and_gate();
        let (doubled, pair_map) = c.dup(DupPolicy::SHARE_PRIMARY_INPUTS);

        let (x0a, x0b) = pair_map[c.pis[0]];
        assert_eq!(x0a, x0b, "PI must be shared");

        let gate_index = c.node(c.pos[0]).fanins[0];
        let (ga, gb) = pair_map[gate_index];
        assert_ne!(ga, gb, "gate must be duplicated");

        assert_eq!(doubled.pis.len(), c.pis.len());
        assert_eq!(doubled.num_nodes(), c.num_nodes() * 2 - c.pis.len());
    }

    #[test]
    fn dup_miter_policy_duplicates_keys_shares_inputs() {
        let mut c = Circuit::new();
        let x0 = c.add_node(NodeKind::PrimaryInput, vec![]).unwrap();
        let k0 = c.add_node(NodeKind::KeyInput, vec![]).unwrap();
        let g = c.add_node(NodeKind::Gate(GateFunc::Xor), vec![x0, k0]).unwrap();
        c.add_node(NodeKind::PrimaryOutput, vec![g]).unwrap();

        let (_doubled, pair_map) = c.dup(DupPolicy::MITER);
        let (xa, xb) = pair_map[x0];
        assert_eq!(xa, xb);
        let (ka, kb) = pair_map[k0];
        assert_ne!(ka, kb);
    }

    #[test]
    fn fanout_is_built_on_demand() {
        let c = build_and_gate();
        let fanout = c.fanout();
        let gate_index = c.node(c.pos[0]).fanins[0];
        assert!(fanout[c.pis[0]].contains(&gate_index));
        assert!(fanout[gate_index].contains(&c.pos[0]));
    }
}

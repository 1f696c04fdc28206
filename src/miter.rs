//! Miter construction: double the locked circuit with [`DupPolicy::MITER`]
//! (shared primary inputs, independent key copies), then join every output
//! pair with an XOR and OR all the XORs into a single disagreement literal
//! `l_out`.
//!
//! The OR-of-XORs is built into the [`Circuit`] itself (as ordinary
//! `Xor`/`Or` gate nodes) before encoding, rather than injected as raw
//! clauses after the fact, so it is no different from any other gate as far
//! as [`crate::cnf::encode`] is concerned.

use crate::circuit::{Circuit, DupPolicy, GateFunc, NodeKind, PairMap};

/// A doubled circuit plus the bookkeeping the attack loop and backbone
/// analyzer need to tell the two key copies, and the two PO copies, apart.
pub struct Miter {
    pub circuit: Circuit,
    pub pair_map: PairMap,
    /// Node index of the single disagreement output, `OR_i(poA_i XOR poB_i)`.
    pub l_out: usize,
    /// Key-input node indices in copy A, in the same order as the source
    /// circuit's `kis`.
    pub key_inputs_a: Vec<usize>,
    pub key_inputs_b: Vec<usize>,
}

impl Miter {
    /// Build the miter over `source`. `source` must have at least one
    /// primary output and at least one key input; a locked circuit with no
    /// key inputs has nothing for this attack to recover.
    pub fn build(source: &Circuit) -> Self {
        let (mut circuit, pair_map) = source.dup(DupPolicy::MITER);

        let mut xor_outputs = Vec::with_capacity(source.pos.len());
        for &po in &source.pos {
            let (po_a, po_b) = pair_map[po];
            let driver_a = circuit.node(po_a).fanins[0];
            let driver_b = circuit.node(po_b).fanins[0];
            let xor = circuit
                .add_node(NodeKind::Gate(GateFunc::Xor), vec![driver_a, driver_b])
                .expect("po drivers already exist in the doubled circuit");
            xor_outputs.push(xor);
        }

        let l_out = if xor_outputs.len() == 1 {
            xor_outputs[0]
        } else {
            circuit
                .add_node(NodeKind::Gate(GateFunc::Or), xor_outputs)
                .expect("xor outputs already exist")
        };

        let key_inputs_a = source.kis.iter().map(|&k| pair_map[k].0).collect();
        let key_inputs_b = source.kis.iter().map(|&k| pair_map[k].1).collect();

        Miter { circuit, pair_map, l_out, key_inputs_a, key_inputs_b }
    }
}

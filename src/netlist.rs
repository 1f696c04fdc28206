//! Thin ISCAS-85/Bench format loader.
//!
//! Parsing of arbitrary structural netlists is not this crate's job; the
//! real loader lives in whatever tool hands this crate a [`Circuit`]. This
//! module exists only so tests, the demo binary and small benchmarks have a
//! human-writable source format instead of hand calling
//! [`Circuit::add_node`]. It performs no optimization, technology mapping,
//! or structural hashing, and understands exactly the combinational subset
//! of the bench format:
//!
//! ```text
//! INPUT(x0)
//! INPUT(keyinput0)
//! OUTPUT(y0)
//! g10 = AND(x0, keyinput0)
//! y0 = NOT(g10)
//! ```
//!
//! Any input whose name starts with `key_prefix` (conventionally
//! `"keyinput"`) becomes a [`NodeKind::KeyInput`]; every other `INPUT`
//! becomes a [`NodeKind::PrimaryInput`]. Gate names are free text and are
//! only used to resolve forward references within the same file; the
//! returned [`NetlistNames`] keeps them around so callers can report a
//! recovered key by name instead of by raw index.

use hashbrown::HashMap;

use crate::circuit::{Circuit, GateFunc, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetlistError {
    UnknownIdentifier { line: usize, name: String },
    UnknownGateType { line: usize, gate_type: String },
    MalformedLine { line: usize, text: String },
    DuplicateOutput { line: usize, name: String },
    Sequential { line: usize },
}

/// Name bookkeeping for a circuit loaded by [`load_bench`]: every identifier
/// that appeared as an `INPUT`, a gate assignment, or an `OUTPUT` maps to the
/// node index it was resolved to.
#[derive(Debug, Default, Clone)]
pub struct NetlistNames {
    pub by_name: HashMap<String, usize>,
}

impl NetlistNames {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

fn gate_func(line: usize, token: &str, arity: usize) -> Result<GateFunc, NetlistError> {
    match token.to_ascii_uppercase().as_str() {
        "AND" => Ok(GateFunc::And),
        "OR" => Ok(GateFunc::Or),
        "XOR" => Ok(GateFunc::Xor),
        "NAND" => Ok(GateFunc::Nand),
        "NOR" => Ok(GateFunc::Nor),
        "XNOR" => Ok(GateFunc::Xnor),
        "NOT" | "INV" if arity == 1 => Ok(GateFunc::Not),
        "BUF" | "BUFF" if arity == 1 => Ok(GateFunc::Buf),
        "ZERO" => Ok(GateFunc::Const(false)),
        "ONE" => Ok(GateFunc::Const(true)),
        "DFF" | "DFFE" | "LATCH" => Err(NetlistError::Sequential { line }),
        other => Err(NetlistError::UnknownGateType { line, gate_type: other.to_string() }),
    }
}

/// Parse the combinational subset of the bench format described above.
pub fn load_bench(src: &str, key_prefix: &str) -> Result<(Circuit, NetlistNames), NetlistError> {
    let mut circuit = Circuit::new();
    let mut names = NetlistNames::default();
    let mut pending_outputs: Vec<(usize, String)> = Vec::new();

    for (line_no, raw_line) in src.lines().enumerate() {
        let line_no = line_no + 1;
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = strip_call(line, "INPUT") {
            let name = rest.trim().to_string();
            let kind =
                if name.starts_with(key_prefix) { NodeKind::KeyInput } else { NodeKind::PrimaryInput };
            let idx = circuit
                .add_node(kind, vec![])
                .map_err(|_| NetlistError::MalformedLine { line: line_no, text: line.to_string() })?;
            names.by_name.insert(name, idx);
        } else if let Some(rest) = strip_call(line, "OUTPUT") {
            let name = rest.trim().to_string();
            pending_outputs.push((line_no, name));
        } else if let Some((lhs, call)) = line.split_once('=') {
            let lhs = lhs.trim().to_string();
            let call = call.trim();
            let paren = call.find('(').ok_or_else(|| NetlistError::MalformedLine {
                line: line_no,
                text: line.to_string(),
            })?;
            let gate_type = call[..paren].trim();
            let args_str = call[paren + 1..].trim_end_matches(')').trim();
            let arg_names: Vec<&str> =
                if args_str.is_empty() { vec![] } else { args_str.split(',').map(str::trim).collect() };

            let mut fanins = Vec::with_capacity(arg_names.len());
            for arg in &arg_names {
                let idx = names.index_of(arg).ok_or_else(|| NetlistError::UnknownIdentifier {
                    line: line_no,
                    name: (*arg).to_string(),
                })?;
                fanins.push(idx);
            }

            let func = gate_func(line_no, gate_type, fanins.len())?;
            let idx = circuit
                .add_node(NodeKind::Gate(func), fanins)
                .map_err(|_| NetlistError::MalformedLine { line: line_no, text: line.to_string() })?;
            names.by_name.insert(lhs, idx);
        } else {
            return Err(NetlistError::MalformedLine { line: line_no, text: line.to_string() });
        }
    }

    for (line_no, name) in pending_outputs {
        let driver = names.index_of(&name).ok_or_else(|| NetlistError::UnknownIdentifier {
            line: line_no,
            name: name.clone(),
        })?;
        let po = circuit
            .add_node(NodeKind::PrimaryOutput, vec![driver])
            .map_err(|_| NetlistError::MalformedLine { line: line_no, text: name.clone() })?;
        let output_name = format!("{name}$po");
        if names.by_name.insert(output_name, po).is_some() {
            return Err(NetlistError::DuplicateOutput { line: line_no, name });
        }
    }

    Ok((circuit, names))
}

fn strip_call<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?.trim_start();
    let rest = rest.strip_prefix('(')?;
    rest.strip_suffix(')')
}

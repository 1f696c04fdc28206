//! Build a fresh single-copy solver over the un-doubled circuit, replay every
//! recorded I/O observation into it, solve once for a candidate key, then
//! flip each key bit in turn and re-solve: a bit whose flip makes the
//! formula UNSAT is "backbone", meaning every key consistent with the
//! recorded evidence agrees on it, even if the CEGAR loop broke off before
//! the whole key was pinned.

use std::collections::BTreeMap;

use crate::attack::IoRecord;
use crate::circuit::Circuit;
use crate::cnf;
use crate::error::AttackError;
use crate::rewriter::Rewriter;

/// Replay `io_log` into a fresh single-copy encoding of `source` and return
/// every key bit forced to a single value by that evidence.
pub fn find_fixed_keys(
    source: &Circuit,
    io_log: &[IoRecord],
) -> Result<BTreeMap<usize, bool>, AttackError> {
    let (mut enc, lmap) = cnf::encode(source)?;
    let mut rewriter = Rewriter::new(source);

    for record in io_log {
        let x: Vec<bool> = record.x.iter().by_vals().collect();
        let y: Vec<bool> = record.y.iter().by_vals().collect();
        rewriter.add_io_single(&mut enc, source, &lmap, &x, &y)?;
    }

    if !enc.solve(&[])? {
        return Err(AttackError::InternalAssert {
            what: "recorded evidence is unsatisfiable in the single-copy backbone solver".into(),
        });
    }

    let candidate: Vec<bool> = source
        .kis
        .iter()
        .map(|&ki| {
            enc.model_value(lmap.get(ki)).ok_or_else(|| AttackError::InternalAssert {
                what: "frozen key variable had no model value in the backbone solver".into(),
            })
        })
        .collect::<Result<_, _>>()?;

    let mut backbone = BTreeMap::new();
    for (key_index, &ki) in source.kis.iter().enumerate() {
        let lit = lmap.get(ki);
        let candidate_value = candidate[key_index];
        let flipped = if candidate_value { !lit } else { lit };
        let still_satisfiable = enc.solve(&[flipped])?;
        if !still_satisfiable {
            backbone.insert(key_index, candidate_value);
        }
    }

    Ok(backbone)
}

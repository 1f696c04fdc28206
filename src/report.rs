//! (De)serialization for the two pieces of attack state worth persisting
//! across a process boundary: a finished [`RecoveredKey`] and the
//! accumulated [`IoRecord`] trace. Uses Postcard: msgpack's Rust crates
//! don't work in `no_std`, and prost would mean hand-writing the
//! (de)serialization instead of just deriving it.

use postcard::{from_bytes, to_allocvec};
use serde::{Deserialize, Serialize};

use crate::attack::{IoRecord, RecoveredKey};
use crate::error::AttackError;

/// Everything worth handing to a caller once an attack finishes: the
/// recovered key plus the I/O trace that pinned it, so a report can be
/// re-verified independently of the solver that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackReport {
    pub key: RecoveredKey,
    pub io_log: Vec<IoRecord>,
}

/// # Errors
/// `postcard::Error` wrapped in [`AttackError::InternalAssert`] if encoding
/// fails.
pub fn serialize_report(report: &AttackReport) -> Result<Vec<u8>, AttackError> {
    to_allocvec(report).map_err(|err| AttackError::InternalAssert { what: format!("failed to serialize attack report: {err}") })
}

/// # Errors
/// `postcard::Error` wrapped in [`AttackError::InternalAssert`] if the bytes
/// don't decode to an [`AttackReport`].
pub fn deserialize_report(buf: &[u8]) -> Result<AttackReport, AttackError> {
    from_bytes(buf).map_err(|err| AttackError::InternalAssert { what: format!("failed to deserialize attack report: {err}") })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_report() {
        let report = AttackReport {
            key: RecoveredKey { by_index: vec![true, false, true], by_name: Default::default() },
            io_log: vec![
                IoRecord { x: vec![false, true].into_iter().collect(), y: vec![true].into_iter().collect() },
                IoRecord { x: vec![true, true].into_iter().collect(), y: vec![false].into_iter().collect() },
            ],
        };

        let buf = serialize_report(&report).unwrap();
        let decoded = deserialize_report(&buf).unwrap();

        assert_eq!(decoded.key.by_index, report.key.by_index);
        assert_eq!(decoded.io_log.len(), report.io_log.len());
        assert_eq!(decoded.io_log[0].x, report.io_log[0].x);
        assert_eq!(decoded.io_log[1].y, report.io_log[1].y);
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = deserialize_report(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, AttackError::InternalAssert { .. }));
    }
}

//! The CEGAR attack loop and the crate's public entry point.
//!
//! Repeatedly solve the miter under the assumption `l_out = true` (some key
//! pair still disagrees), extract the distinguishing input pattern (DIP)
//! from the model, query the oracle, fold the new observation into the
//! formula via the rewriter, and stop once no disagreeing pair remains.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bitvec::vec::BitVec;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::circuit::Circuit;
use crate::cnf::{self, CnfEncoder, LitMap};
use crate::error::AttackError;
use crate::miter::Miter;
use crate::oracle::Oracle;
use crate::rewriter::Rewriter;

/// Tunables threaded through the attack loop in place of ad-hoc globals,
/// kept in one plain config struct alongside the data it governs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttackConfig {
    /// Abort with [`AttackError::Timeout`] once this much wall-clock time
    /// has elapsed since `solve` was called. `None` disables the check.
    pub wall_clock_limit: Option<Duration>,
    /// Abort with [`AttackError::DecisionBudget`] once the solver's
    /// cumulative decision count exceeds `factor * n_vars`. `None` disables
    /// the check.
    pub decision_budget_factor: Option<u64>,
    /// Assert the all-zeros and all-ones input patterns as DIPs before the
    /// main loop starts. Off by default: most locked circuits don't need the
    /// nudge, and it costs two oracle queries up front for every attack.
    pub seed_constants: bool,
    /// Number of random oracle queries `Attack::solve` cross-checks the
    /// recovered key against before returning it.
    pub verify_samples: usize,
    /// Seed for the verification RNG. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            wall_clock_limit: None,
            decision_budget_factor: None,
            seed_constants: false,
            verify_samples: 16,
            rng_seed: None,
        }
    }
}

/// One recorded input/output observation, kept around so the backbone
/// analyzer can replay everything the CEGAR loop learned against a fresh
/// single-copy solver.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IoRecord {
    pub x: BitVec,
    pub y: BitVec,
}

/// The key the attack converged on, carrying both the raw per-index view
/// (always available) and an optional by-name view (only populated once a
/// caller supplies names via [`Attack::set_key_names`], since the gate graph
/// itself has no notion of key names).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecoveredKey {
    pub by_index: Vec<bool>,
    pub by_name: HashMap<String, bool>,
}

pub struct Attack {
    source: Circuit,
    miter: Miter,
    enc: CnfEncoder,
    lmap: LitMap,
    rewriter: Rewriter,
    oracle: Box<dyn Oracle>,
    config: AttackConfig,
    io_log: Vec<IoRecord>,
    key_names: Option<Vec<String>>,
    rng: ChaCha8Rng,
}

impl Attack {
    pub fn new(circuit: Circuit, oracle: Box<dyn Oracle>, config: AttackConfig) -> Self {
        let miter = Miter::build(&circuit);
        let (mut enc, lmap) = cnf::encode(&miter.circuit).expect("encoding a freshly built miter");
        // `l_out` is a plain gate node in the doubled circuit, not a
        // `PrimaryOutput`, so `cnf::encode` never froze it on its own; it has
        // to be frozen here since the loop below repeatedly assumes and reads
        // its literal across solver calls.
        enc.freeze([lmap.get(miter.l_out)]);
        let rewriter = Rewriter::new(&miter.circuit);
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Attack { source: circuit, miter, enc, lmap, rewriter, oracle, config, io_log: Vec::new(), key_names: None, rng }
    }

    pub fn set_key_names(&mut self, names: Vec<String>) {
        assert_eq!(names.len(), self.source.kis.len());
        self.key_names = Some(names);
    }

    /// Assert known bits of the key up front, pinning both miter copies so
    /// the solver never wastes a decision exploring a disagreement on a bit
    /// the attacker already has.
    pub fn add_known_keys(&mut self, bits: &[(usize, bool)]) {
        for &(key_index, value) in bits {
            let a = self.lmap.get(self.miter.key_inputs_a[key_index]);
            let b = self.lmap.get(self.miter.key_inputs_b[key_index]);
            self.enc.add_clause(vec![if value { a } else { !a }]).expect("unit clause is never rejected");
            self.enc.add_clause(vec![if value { b } else { !b }]).expect("unit clause is never rejected");
        }
    }

    fn seed_constant_pattern(&mut self, value: bool) -> Result<(), AttackError> {
        let x = vec![value; self.source.pis.len()];
        let y = self.oracle.eval(&x).map_err(|source| AttackError::OracleFailure { source })?;
        self.rewriter.add_io_miter(&mut self.enc, &self.miter, &self.lmap, &x, &y)?;
        self.io_log.push(IoRecord { x: x.into_iter().collect(), y: y.into_iter().collect() });
        Ok(())
    }

    /// Run the CEGAR loop to termination. On success returns the
    /// full recovered key, cross-checked against `config.verify_samples`
    /// random oracle queries. On a soft failure (`Timeout`/`DecisionBudget`)
    /// the caller should fall back to [`Attack::find_fixed_keys`] for a
    /// partial, backbone-restricted key.
    pub fn solve(&mut self) -> Result<RecoveredKey, AttackError> {
        let start = Instant::now();

        if self.config.seed_constants {
            self.seed_constant_pattern(false)?;
            self.seed_constant_pattern(true)?;
        }

        let mut iteration = 0usize;
        loop {
            iteration += 1;

            if let Some(limit) = self.config.wall_clock_limit {
                if start.elapsed() > limit {
                    return Err(AttackError::Timeout { iterations: iteration - 1 });
                }
            }
            if let Some(factor) = self.config.decision_budget_factor {
                let budget = factor * u64::from(self.enc.n_vars());
                if self.enc.num_decisions() > budget {
                    return Err(AttackError::DecisionBudget { iteration });
                }
            }

            let disagreement_possible = self.enc.solve(&[self.lmap.get(self.miter.l_out)])?;
            if !disagreement_possible {
                break;
            }

            let x: Vec<bool> = self
                .miter
                .circuit
                .pis
                .iter()
                .map(|&pi| {
                    self.enc.model_value(self.lmap.get(pi)).ok_or_else(|| AttackError::InternalAssert {
                        what: "frozen PI variable had no model value after SAT".into(),
                    })
                })
                .collect::<Result<_, _>>()?;

            let y = self.oracle.eval(&x).map_err(|source| AttackError::OracleFailure { source })?;

            log::info!(
                "iteration: {iteration}; vars: {}; clauses: {}; decisions: {}; x: {x:?}; y: {y:?}",
                self.enc.n_vars(),
                self.enc.n_clauses(),
                self.enc.num_decisions(),
            );

            self.rewriter.add_io_miter(&mut self.enc, &self.miter, &self.lmap, &x, &y)?;
            self.io_log.push(IoRecord { x: x.into_iter().collect(), y: y.into_iter().collect() });
        }

        // No disagreeing pair remains; solve once more with no assumption to
        // pull a concrete model of the (now-forced-equal) key out.
        if !self.enc.solve(&[])? {
            return Err(AttackError::InternalAssert {
                what: "formula became unsatisfiable after the CEGAR loop terminated".into(),
            });
        }

        let by_index: Vec<bool> = self
            .miter
            .key_inputs_a
            .iter()
            .map(|&ki| {
                self.enc.model_value(self.lmap.get(ki)).ok_or_else(|| AttackError::InternalAssert {
                    what: "frozen key variable had no model value after SAT".into(),
                })
            })
            .collect::<Result<_, _>>()?;

        let verify_samples = self.config.verify_samples;
        let mut verify_rng = self.rng.clone();
        let verified = self.verify_random(verify_samples, &mut verify_rng)?;
        if !verified {
            return Err(AttackError::InternalAssert {
                what: "recovered key failed random oracle verification".into(),
            });
        }

        let by_name = match &self.key_names {
            Some(names) => names.iter().cloned().zip(by_index.iter().copied()).collect(),
            None => HashMap::new(),
        };

        Ok(RecoveredKey { by_index, by_name })
    }

    /// Cross-check the solver's current key-variable model against `n`
    /// random oracle queries. A key that merely satisfies the accumulated
    /// evidence clauses can still be wrong if the CEGAR loop stopped too
    /// early, so this re-simulates the source circuit directly against the
    /// oracle instead of trusting the solver's model alone.
    pub fn verify_random(&mut self, n: usize, rng: &mut impl RngCore) -> Result<bool, AttackError> {
        let key: Vec<bool> = self
            .miter
            .key_inputs_a
            .iter()
            .map(|&ki| {
                self.enc.model_value(self.lmap.get(ki)).ok_or_else(|| AttackError::InternalAssert {
                    what: "frozen key variable had no model value during verification".into(),
                })
            })
            .collect::<Result<_, _>>()?;

        for _ in 0..n {
            let x: Vec<bool> = (0..self.source.pis.len()).map(|_| rng.gen()).collect();
            let expected = self.oracle.eval(&x).map_err(|source| AttackError::OracleFailure { source })?;
            let actual = self.source.eval_plain(&x, &key);
            if actual != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run the backbone analyzer over everything recorded so far, typically
    /// called after a soft failure from [`Attack::solve`].
    pub fn find_fixed_keys(&mut self) -> Result<std::collections::BTreeMap<usize, bool>, AttackError> {
        crate::backbone::find_fixed_keys(&self.source, &self.io_log)
    }
}

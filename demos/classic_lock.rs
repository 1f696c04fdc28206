//! Run with eg:
//! - `cargo run --example=classic_lock -- --bench-path=demos/data/and_lock.bench --key=0`
//!
//! Loads a bench-format locked netlist, stands up an in-process simulator
//! oracle keyed with `--key`, and runs the CEGAR attack to recovery.

use clap::Parser;

use lib_satlock_rs::netlist::load_bench;
use lib_satlock_rs::oracle::SimulatorOracle;
use lib_satlock_rs::{Attack, AttackConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the locked netlist in bench format.
    #[clap(long)]
    bench_path: String,

    /// The real key, as a comma-separated list of 0/1, one per `keyinput*`
    /// in the order they appear in the bench file. Stands in for "the
    /// activated chip": in a real attack this would instead be
    /// `SubprocessOracle` wrapping a physical or emulated device.
    #[clap(long, required = true, num_args = 1.., value_delimiter = ',')]
    key: Vec<u8>,

    /// Prefix identifying a key input among the bench file's `INPUT`s.
    #[clap(long, default_value = "keyinput")]
    key_prefix: String,

    /// Seed for the post-recovery random verification pass.
    #[clap(long, required = false)]
    rng_seed: Option<u64>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let src = std::fs::read_to_string(&args.bench_path).expect("failed to read bench file");
    let (circuit, names) = load_bench(&src, &args.key_prefix).expect("failed to parse bench file");

    let key: Vec<bool> = args.key.iter().map(|&b| b != 0).collect();
    assert_eq!(key.len(), circuit.kis.len(), "--key length must match the netlist's key-input count");

    // `RecoveredKey::by_index` is indexed by *key* position (0..kis.len()),
    // not by node index, so recover the node-index -> key-name mapping
    // before `circuit` moves into the oracle/attack.
    let key_names: Vec<String> = circuit
        .kis
        .iter()
        .map(|&node_index| {
            names
                .by_name
                .iter()
                .find(|&(_, &idx)| idx == node_index)
                .map(|(name, _)| name.clone())
                .unwrap_or_else(|| format!("keyinput{node_index}"))
        })
        .collect();

    let oracle = SimulatorOracle::new(circuit.clone(), key);
    let config = AttackConfig { rng_seed: args.rng_seed, ..AttackConfig::default() };
    let mut attack = Attack::new(circuit, Box::new(oracle), config);
    attack.set_key_names(key_names);

    match attack.solve() {
        Ok(recovered) => {
            println!("recovered key:");
            for (name, &bit) in &recovered.by_name {
                println!("  {name} = {}", bit as u8);
            }
        }
        Err(err) => {
            eprintln!("attack did not converge cleanly: {err}");
            if let Some(kind) = err.soft_kind() {
                eprintln!("falling back to backbone analyzer ({kind:?})");
                let backbone = attack.find_fixed_keys().expect("backbone analysis failed");
                println!("backbone-forced key bits: {backbone:?}");
            }
        }
    }
}

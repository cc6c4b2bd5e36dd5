use clap::Parser;
use log::info;

use bgapps::coloring;
use bgapps::opts::{exit_with, CommonArgs};
use bgraph::BlockEngine;

#[derive(Parser, Debug)]
#[command(version, about = "randomized graph coloring", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// colors are drawn from 0..rand_max
    #[arg(long = "rand_max", default_value_t = 100)]
    rand_max: u32,

    /// give up after this many rounds
    #[arg(long = "max_rounds", default_value_t = 10_000)]
    max_rounds: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let mut cfg = args.common.engine_config().unwrap_or_else(|e| exit_with(e));
    // coloring reads and writes the same array by contract
    cfg.read_only_sync = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap_or_else(|e| exit_with(e));

    let outcome = coloring::run(&engine, args.rand_max, args.max_rounds);
    if let Err(e) = engine.stop() {
        exit_with(e);
    }
    match outcome {
        Some(rounds) => info!("coloring settled after {rounds} rounds"),
        None => exit_with(format!(
            "coloring did not settle within {} rounds",
            args.max_rounds
        )),
    }
}

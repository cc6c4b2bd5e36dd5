use clap::Parser;
use log::info;

use bgapps::opts::{exit_with, CommonArgs};
use bgapps::random_walk;
use bgraph::BlockEngine;

#[derive(Parser, Debug)]
#[command(version, about = "uniform random walks", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// walk length per vertex
    #[arg(long, default_value_t = 5)]
    walk: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let mut cfg = args.common.engine_config().unwrap_or_else(|e| exit_with(e));
    // walks hop across blocks
    cfg.in_memory = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap_or_else(|e| exit_with(e));

    let matrix = random_walk::run(&engine, args.walk);
    let finished = matrix
        .chunks(args.walk.max(1))
        .filter(|w| w.last().is_some_and(|&c| c != random_walk::NO_STEP))
        .count();
    info!(
        "random walk: {finished}/{} walks ran the full {} steps",
        engine.num_vertices(),
        args.walk
    );

    if let Err(e) = engine.stop() {
        exit_with(e);
    }
}

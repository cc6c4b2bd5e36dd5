use clap::Parser;
use log::info;

use bgapps::opts::{exit_with, CommonArgs};
use bgapps::sssp;
use bgraph::BlockEngine;

#[derive(Parser, Debug)]
#[command(version, about = "single-source shortest paths (hop count)", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// source vertex
    #[arg(long, default_value_t = 0)]
    source: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let cfg = args.common.engine_config().unwrap_or_else(|e| exit_with(e));
    let engine = BlockEngine::<u32>::open(cfg).unwrap_or_else(|e| exit_with(e));

    let rounds = sssp::run(&engine, args.source);
    let s = engine.state();
    let reached = (0..engine.num_vertices())
        .filter(|&v| s.read(v) != sssp::UNREACHED)
        .count();
    info!(
        "sssp from {}: {reached} vertices reached in {rounds} supersteps",
        args.source
    );

    if let Err(e) = engine.stop() {
        exit_with(e);
    }
}

use clap::Parser;
use log::info;

use bgapps::opts::{exit_with, CommonArgs};
use bgapps::pagerank;
use bgraph::BlockEngine;

#[derive(Parser, Debug)]
#[command(version, about = "pull-based pagerank", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// number of iterations
    #[arg(long, default_value_t = 10)]
    iter: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let cfg = args.common.engine_config().unwrap_or_else(|e| exit_with(e));
    let engine = BlockEngine::<f32>::open(cfg).unwrap_or_else(|e| exit_with(e));

    pagerank::run(&engine, args.iter);
    let s = engine.state();
    let total: f32 = (0..engine.num_vertices()).map(|v| s.read(v)).sum();
    info!("pagerank: {} iterations, rank mass {total}", args.iter);

    if let Err(e) = engine.stop() {
        exit_with(e);
    }
}

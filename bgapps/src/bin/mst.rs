use clap::Parser;
use log::info;

use bgapps::mst;
use bgapps::opts::{exit_with, CommonArgs};
use bgraph::BlockEngine;

#[derive(Parser, Debug)]
#[command(version, about = "minimum spanning forest (id-weighted)", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let cfg = args.common.engine_config().unwrap_or_else(|e| exit_with(e));
    let engine = BlockEngine::<u32>::open(cfg).unwrap_or_else(|e| exit_with(e));

    let rounds = mst::run(&engine);
    let s = engine.state();
    let trees = (0..engine.num_vertices()).filter(|&v| s.read(v) == v).count();
    info!("mst: {trees} trees after {rounds} rounds");

    if let Err(e) = engine.stop() {
        exit_with(e);
    }
}

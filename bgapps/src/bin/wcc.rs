use clap::Parser;
use log::info;

use bgapps::opts::{exit_with, CommonArgs};
use bgapps::wcc;
use bgraph::BlockEngine;

#[derive(Parser, Debug)]
#[command(version, about = "weakly connected components", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let cfg = args.common.engine_config().unwrap_or_else(|e| exit_with(e));
    let engine = BlockEngine::<u32>::open(cfg).unwrap_or_else(|e| exit_with(e));

    let rounds = wcc::run(&engine);
    let components = wcc::num_components(&engine.state(), engine.num_vertices());
    info!("wcc: {components} components after {rounds} rounds");

    if let Err(e) = engine.stop() {
        exit_with(e);
    }
}

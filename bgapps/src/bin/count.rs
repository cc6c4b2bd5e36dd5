use clap::Parser;
use log::info;

use bgapps::count;
use bgapps::opts::{exit_with, CommonArgs};
use bgraph::BlockEngine;

#[derive(Parser, Debug)]
#[command(version, about = "local structure counting", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// query structure (triangle, path, star)
    #[arg(long, default_value = "triangle")]
    query: String,

    /// path length for --query path
    #[arg(long, default_value_t = 3)]
    length: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if !matches!(args.query.as_str(), "triangle" | "path" | "star") {
        exit_with(format!("unknown query {:?}", args.query));
    }
    let mut cfg = args.common.engine_config().unwrap_or_else(|e| exit_with(e));
    // counting kernels chase neighbours' adjacency across blocks
    cfg.in_memory = true;
    let engine = BlockEngine::<u32>::open(cfg).unwrap_or_else(|e| exit_with(e));

    match args.query.as_str() {
        "triangle" => count::triangles(&engine),
        "path" => count::paths(&engine, args.length),
        _ => count::stars(&engine),
    }
    let s = engine.state();
    let total: u64 = (0..engine.num_vertices()).map(|v| u64::from(s.read(v))).sum();
    info!("{}: total count {total}", args.query);

    if let Err(e) = engine.stop() {
        exit_with(e);
    }
}

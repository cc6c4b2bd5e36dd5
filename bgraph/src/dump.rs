//! Prints a block layout: metadata, per-block index contents and,
//! optionally, the edge lists.

use clap::Parser;
use std::path::PathBuf;

use bgraph::layout;
use bgraph::meta::GraphMeta;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// graph root (holds meta.yaml and graphs/)
    root: PathBuf,

    /// also dump every vertex's edge list
    #[arg(long)]
    edges: bool,

    /// read the mutated (.new) siblings
    #[arg(long)]
    mutated: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let meta = match GraphMeta::load(&args.root) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    println!(
        "{} vertices, {} edges, {} blocks",
        meta.num_vertices, meta.num_edges, meta.num_blocks
    );
    for bm in &meta.blocks {
        let idx = match layout::read_index(&args.root, bm, args.mutated) {
            Ok(i) => i,
            Err(e) => {
                eprintln!("block {}: {e}", bm.id);
                std::process::exit(1);
            }
        };
        println!(
            "block {}: [{}, {}) offset_ratio {} edges {}",
            bm.id, bm.begin_id, bm.end_id, bm.offset_ratio, idx.num_edges
        );
        for sr in &idx.subs {
            println!(
                "  sub [{}, {}): {} edges at offset {}",
                sr.begin_id, sr.end_id, sr.num_edges, sr.begin_offset
            );
        }
        if args.edges {
            for (sid, _) in idx.subs.iter().enumerate() {
                let edges =
                    match layout::read_sub_edges(&args.root, bm.id, sid as u32, args.mutated) {
                        Ok(e) => e,
                        Err(e) => {
                            eprintln!("block {} sub {}: {e}", bm.id, sid);
                            std::process::exit(1);
                        }
                    };
                bgraph::graph::walk_sub(&idx, sid as u32, &edges, |u, v, _| {
                    println!("  {u} -> {v}");
                });
            }
        }
    }
}

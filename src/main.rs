use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use ownergraph::{
    FileStore, GraphSnapshot, KeyValueStore, LayoutEngine, MemoryStore, RenderFrame,
    RenderSurface, SimConfig,
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Discovery snapshot JSON files, applied in order
    #[arg(required = true)]
    snapshots: Vec<PathBuf>,

    /// Directory for persisted layouts; omit for in-memory only
    #[arg(long)]
    layout_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1280.0)]
    width: f32,

    #[arg(long, default_value_t = 800.0)]
    height: f32,

    /// Tick budget per snapshot
    #[arg(long, default_value_t = 600)]
    ticks: u32,
}

struct FrameCounter {
    frames: u32,
}

impl RenderSurface for FrameCounter {
    fn present(&mut self, _frame: &RenderFrame) {
        self.frames += 1;
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let backend: Box<dyn KeyValueStore> = match &args.layout_dir {
        Some(dir) => Box::new(FileStore::new(dir)),
        None => Box::new(MemoryStore::new()),
    };
    let mut engine = LayoutEngine::new(SimConfig::default(), backend);
    let mut surface = FrameCounter { frames: 0 };

    for path in &args.snapshots {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let snapshot: GraphSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;

        engine.submit_snapshot(snapshot);
        engine.drive(&mut surface, args.ticks);
    }

    let frame = engine.render_frame();
    let transform = engine.fit_to_view(args.width, args.height);
    let report = json!({
        "ticks_presented": surface.frames,
        "full_rebuilds": engine.full_rebuilds(),
        "patches": engine.patches(),
        "settled": frame.settled,
        "fit": {
            "scale": transform.scale,
            "translate": [transform.translate.x, transform.translate.y],
        },
        "nodes": frame.nodes.iter().map(|node| json!({
            "id": node.id,
            "name": node.name,
            "kind": node.kind,
            "x": node.pos.x,
            "y": node.pos.y,
            "radius": node.radius,
            "root": node.is_root,
            "pinned": node.pinned,
            "flagged": node.flagged,
        })).collect::<Vec<_>>(),
        "edges": frame.edges.iter().map(|edge| json!({
            "from": [edge.from.x, edge.from.y],
            "to": [edge.to.x, edge.to.y],
            "kind": edge.kind.label(),
            "percentage": edge.percentage,
            "circular": edge.circular,
        })).collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

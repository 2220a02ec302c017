//! Run a small BlockArt network in one process.
//!
//! Starts `BLOCKART_SIM_MINERS` miners (default 3) on an in-memory network,
//! draws a few shapes through the first one and prints the canonical chain.
//! Network settings come from the usual `BLOCKART_*` variables.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use blockart::core::{Keypair, ShapeType};
use blockart::sync::{Gossip, MemoryDiscovery, MemoryNetwork, NodeId};
use blockart::{CanvasService, Node, NodeConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const SHAPES: &[(&str, &str, &str)] = &[
    ("M 10 10 L 60 10", "transparent", "black"),
    ("M 100 100 h 10 v 10 h -10 Z", "blue", "black"),
    ("M 200 50 l 30 0 l -15 25 z", "transparent", "red"),
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NodeConfig::from_env().context("loading configuration")?;
    let miners: usize = match std::env::var("BLOCKART_SIM_MINERS") {
        Ok(raw) => raw.parse().context("BLOCKART_SIM_MINERS must be a number")?,
        Err(_) => 3,
    };
    if miners == 0 {
        bail!("BLOCKART_SIM_MINERS must be positive");
    }

    let network = MemoryNetwork::new();
    let discovery = Arc::new(MemoryDiscovery::new(config.gossip.peer_timeout * 2));
    let mut nodes = Vec::with_capacity(miners);
    let mut keys = Vec::with_capacity(miners);
    for _ in 0..miners {
        let keypair = Keypair::generate();
        let transport = network
            .create_transport(NodeId::from_public_key(&keypair.public_key()))
            .await;
        let gossip = Gossip::new(Arc::new(transport), discovery.clone(), config.gossip.clone());
        let node = Node::new(keypair.clone(), config.clone(), gossip, None).await?;
        node.start().await?;
        nodes.push(node);
        keys.push(keypair);
    }

    let canvas = CanvasService::new(nodes[0].clone());
    let settings = canvas.open_canvas(&keys[0].public_key())?;
    println!(
        "canvas {}x{}, genesis {}",
        settings.canvas.canvas_x_max,
        settings.canvas.canvas_y_max,
        settings.genesis_block_hash
    );

    for (svg, fill, stroke) in SHAPES {
        wait_for_ink(&canvas, 150).await?;
        match canvas.add_shape(2, ShapeType::Path, svg, fill, stroke).await {
            Ok((shape, block, ink)) => {
                println!("added {shape} in block {block}, {ink} ink left");
                println!("  {}", canvas.get_svg_string(&shape)?);
            }
            Err(err) => println!("rejected {svg:?}: {err}"),
        }
    }

    let path = nodes[0]
        .read_chain(|tree| tree.path_from_genesis(&tree.head_hash()))
        .unwrap_or_default();
    println!("canonical chain, {} blocks:", path.len());
    for block in path {
        println!(
            "  #{:<4} {} ops={} miner={}",
            block.height,
            block.hash,
            block.ops.len(),
            block.miner
        );
    }

    canvas.close_canvas()?;
    for node in &nodes {
        node.shutdown().await;
    }
    Ok(())
}

async fn wait_for_ink(canvas: &CanvasService, needed: u64) -> Result<()> {
    for _ in 0..600 {
        if canvas.get_ink()? >= needed {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    bail!("miner did not earn {needed} ink in time")
}

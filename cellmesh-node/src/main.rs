use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use cellmesh_config::MeshConfig;
use cellmesh_p2p::{Cell, CellProfile, RelayNode, ResultCallback};

mod expr;

#[derive(Parser, Debug)]
#[command(name = "cellmesh-node", version, about = "Relay node and arithmetic cells of a cellmesh overlay")]
struct Args {
    /// Mesh configuration (TOML). Defaults are used when absent or invalid
    #[arg(long, env = "CELLMESH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Role {
    /// Relay messages between cells and other nodes
    Node,

    /// Evaluate arithmetic requests
    Server,

    /// Read `a op b` lines from stdin and print their results
    Requester,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = MeshConfig::load_or_default(args.config.as_deref());

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
            on_signal.cancel();
        }
    });

    match args.role {
        Role::Node => run_node(config, shutdown).await,
        Role::Server => run_server(config, shutdown).await,
        Role::Requester => run_requester(config, shutdown).await,
    }
}

async fn run_node(config: MeshConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let node = RelayNode::start(config).await.context("relay node failed to bind")?;
    node.run(shutdown).await?;
    Ok(())
}

async fn run_server(config: MeshConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let cell = Cell::connect(CellProfile::server(), &config)
        .await
        .context("server could not attach to a node")?;

    let ignore: ResultCallback = Arc::new(|_: String| {});
    cell.run(ignore, shutdown).await?;
    Ok(())
}

async fn run_requester(config: MeshConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let cell = Cell::connect(CellProfile::requester(), &config)
        .await
        .context("requester could not attach to a node")?;
    let handle = cell.requester_handle();

    let print: ResultCallback = Arc::new(|text: String| println!("= {}", text));
    let mut running = tokio::spawn(cell.run(print, shutdown.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            ended = &mut running => return Ok(ended??),
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match expr::parse_expression(&line) {
                    Ok((op, lhs, rhs)) => {
                        handle.submit(op, lhs, rhs);
                    }
                    Err(err) => eprintln!("{:#}", err),
                },
                // no more input, wait for outstanding results until interrupted
                None => return Ok(running.await??),
            },
        }
    }
}

use clap::Parser;

use lantern::config::Config;
use lantern::server::Server;
use lantern::server::notify;

/// Serve static files over HTTP/1.1.
#[derive(Debug, Parser)]
#[command(name = "lantern", version)]
struct Args {
    /// Port to listen on
    port: u16,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let mut cfg = Config::load()?;
    cfg.port = args.port;

    let server = Server::bind(cfg)?;
    let _signals = notify::install_handlers(&server.notifier())?;

    server.run()?;

    tracing::info!("Shutdown complete");
    Ok(())
}

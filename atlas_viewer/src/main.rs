use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tracing::{info, warn};

mod api;
mod app;
mod config;
mod fetch;

use app::ViewerApp;
use config::load_viewer_config;
use fetch::ReqwestTransport;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live map viewer data layer", long_about = None)]
struct Cli {
    /// Viewer configuration file. Falls back to `ATLAS_VIEWER_CONFIG_PATH`, then the builtin copy.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Id of the configured server to connect to.
    #[arg(long)]
    server: Option<String>,
    /// Run a single update cycle and exit.
    #[arg(long)]
    once: bool,
    /// Send a chat message once connected.
    #[arg(long)]
    say: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    let cli = Cli::parse();
    let (config, _source) = load_viewer_config(cli.config);

    let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
    let mut app = ViewerApp::new(config, cli.server.as_deref(), transport)?;
    info!("Connecting to {}", app.api().endpoints().configuration);
    app.bootstrap().await?;

    if let Some(message) = cli.say.as_deref() {
        match app.send_chat(message).await {
            Ok(()) => info!(target: "atlas::chat", "chat.sent"),
            Err(err) => warn!(target: "atlas::chat", error = %err, "chat.failed"),
        }
    }

    tokio::select! {
        result = app.run(cli.once) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    app.shutdown();
    Ok(())
}

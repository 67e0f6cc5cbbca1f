use anyhow::Result;
use clap::Parser;
use corebgp_updater::{NetworkBackends, SessionLoop};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod cli;
mod logging;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_format, args.default_level(), args.log_path.as_deref())?;

    info!("Starting corebgp-updater {}", env!("CARGO_PKG_VERSION"));

    let config = args.resolve()?;
    info!(
        api = %config.api_endpoint,
        gobgp = %config.gobgp_endpoint,
        tls = config.gobgp_tls.is_some(),
        mode = %config.reconcile_mode,
        "Configuration loaded"
    );

    let backends = NetworkBackends::new(config.clone())?;
    let updater = SessionLoop::new(backends, config);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    if let Err(e) = updater.run(shutdown).await {
        error!("Updater stopped: {}", e);
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down..."),
            _ = terminate.recv() => info!("SIGTERM received, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Interrupt received, shutting down...");
    }

    shutdown.cancel();
}

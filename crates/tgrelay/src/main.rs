use std::sync::Arc;

use tgrelay_core::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), tgrelay_core::Error> {
    tgrelay_core::logging::init("tgrelay")?;

    let cfg = Arc::new(Config::load()?);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, shutting down");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "failed to listen for interrupt"),
            }
        });
    }

    tgrelay_telegram::router::run_polling(cfg, shutdown)
        .await
        .map_err(|e| tgrelay_core::Error::External(format!("relay failed: {e:#}")))?;

    Ok(())
}

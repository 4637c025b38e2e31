use tarn_core::{error::ErrorContext, mirror::Mirror, MirrorResult};
use tracing::{info, warn};

/// Runs the change-feed consumer until Ctrl-C.
pub async fn replicate(mirror: &Mirror, enabled: bool) -> MirrorResult<()> {
    if !enabled {
        warn!("Replication is disabled in the configuration");
        return Ok(());
    }

    mirror.start_replication();
    info!(
        "Following {} (press Ctrl-C to stop)",
        mirror.replication().source()
    );

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "waiting for Ctrl-C".to_string())?;
    info!("Stopping replication");
    Ok(())
}

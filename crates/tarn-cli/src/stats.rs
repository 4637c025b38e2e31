use nu_ansi_term::Color::{Cyan, Green};
use serde_json::json;
use tarn_core::{error::MirrorError, mirror::Mirror, MirrorResult};
use tracing::info;

use crate::utils::Colored;

pub async fn show_stats(mirror: &Mirror, json: bool) -> MirrorResult<()> {
    let stats = mirror.stats().await?;
    let directory = stats
        .directory
        .as_ref()
        .map(|dir| dir.display().to_string());
    let checkpoint = stats.checkpoint.as_ref().map(ToString::to_string);

    if json {
        let value = json!({
            "directory": directory,
            "documents": stats.documents,
            "tarballs": stats.tarballs,
            "checkpoint": checkpoint,
            "replication": stats.replication.to_string(),
        });
        let rendered = serde_json::to_string_pretty(&value)
            .map_err(|err| MirrorError::Custom(format!("failed to render JSON: {err}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if let Some(directory) = directory {
        info!("Directory: {}", Colored(Cyan, directory));
    }
    info!("Documents: {}", Colored(Green, stats.documents));
    info!("Tarballs: {}", Colored(Green, stats.tarballs));
    info!(
        "Checkpoint: {}",
        checkpoint.as_deref().unwrap_or("none")
    );
    info!("Replication: {}", stats.replication);
    Ok(())
}

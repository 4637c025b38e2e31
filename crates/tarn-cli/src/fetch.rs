use std::path::PathBuf;

use nu_ansi_term::Color::{Cyan, Green};
use tarn_core::{error::ErrorContext, mirror::Mirror, tarball::TarballSource, MirrorResult};
use tarn_utils::bytes::format_bytes;
use tracing::info;

use crate::utils::Colored;

/// Default output file: the last segment of the package name plus the version.
fn default_output(name: &str, version: &str) -> PathBuf {
    let base = name.rsplit('/').next().unwrap_or(name);
    PathBuf::from(format!("{base}-{version}.tgz"))
}

pub async fn fetch_tarball(
    mirror: &Mirror,
    name: &str,
    version: &str,
    output: Option<String>,
) -> MirrorResult<()> {
    let tarball = mirror.tarball(name, version).await?;
    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output(name, version));

    std::fs::write(&path, &tarball.bytes)
        .with_context(|| format!("writing tarball to {}", path.display()))?;

    let source = match tarball.source {
        TarballSource::Upstream => "upstream",
        TarballSource::Cache => "cache",
    };
    info!(
        "Saved {}@{} ({}, from {source}) to {}",
        Colored(Cyan, name),
        Colored(Green, version),
        format_bytes(tarball.bytes.len() as u64, 2),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output("left-pad", "1.3.0"),
            PathBuf::from("left-pad-1.3.0.tgz")
        );
        assert_eq!(
            default_output("@babel/core", "7.0.0"),
            PathBuf::from("core-7.0.0.tgz")
        );
    }
}

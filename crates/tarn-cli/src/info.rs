use nu_ansi_term::Color::{Blue, Cyan, Green};
use tarn_core::{mirror::Mirror, MirrorResult};
use tarn_registry::{PackageDocument, VersionMetadata};
use tracing::info;

use crate::utils::Colored;

pub async fn show_info(
    mirror: &Mirror,
    name: &str,
    version: Option<&str>,
    json: bool,
) -> MirrorResult<()> {
    match version {
        Some(query) => {
            let metadata = mirror.package_version(name, query).await?;
            if json {
                print_json(&metadata)?;
            } else {
                print_version(name, &metadata);
            }
        }
        None => {
            let doc = mirror.package(name).await?;
            if json {
                print_json(&doc)?;
            } else {
                print_document(&doc);
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> MirrorResult<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| {
        tarn_core::error::MirrorError::Custom(format!("failed to render JSON: {err}"))
    })?;
    println!("{rendered}");
    Ok(())
}

fn print_document(doc: &PackageDocument) {
    info!("{}", Colored(Cyan, &doc.name));
    if let Some(latest) = doc.dist_tags.get("latest") {
        info!("  latest: {}", Colored(Green, latest));
    }
    for (tag, version) in doc.dist_tags.iter().filter(|(tag, _)| *tag != "latest") {
        info!("  {tag}: {version}");
    }
    info!("  versions: {}", doc.versions.len());
    if let Some(modified) = doc.modified_at() {
        info!("  modified: {}", modified.to_rfc3339());
    }
}

fn print_version(name: &str, metadata: &VersionMetadata) {
    info!(
        "{}@{}",
        Colored(Cyan, name),
        Colored(Green, metadata.version.as_deref().unwrap_or("?"))
    );
    info!("  tarball: {}", Colored(Blue, &metadata.dist.tarball));
    if let Some(shasum) = &metadata.dist.shasum {
        info!("  shasum: {shasum}");
    }
}

use std::sync::Arc;

use clap::Parser;
use cli::Args;
use events::spawn_event_handler;
use tarn_config::{
    config::{self, generate_default_config, get_config, set_config_path},
    error::ConfigError,
};
use tarn_core::{error::MirrorError, mirror::Mirror, MirrorResult};
use tarn_dl::http_client::configure_http_client;
use tarn_events::ChannelSink;
use tarn_utils::path::resolve_path;
use tracing::debug;
use utils::COLOR;

use crate::logging::setup_logging;

mod cli;
mod events;
mod fetch;
mod info;
mod logging;
mod replicate;
mod stats;
mod utils;

async fn handle_cli() -> MirrorResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        let mut color = COLOR.write().unwrap();
        *color = false;
    }

    if let Some(ref c) = args.config {
        set_config_path(resolve_path(c).map_err(ConfigError::from)?);
    }

    if let cli::Commands::DefConfig = args.command {
        generate_default_config()?;
        return Ok(());
    }

    config::init()?;
    let config = get_config();

    let user_agent = args.user_agent.clone().unwrap_or_else(|| config.user_agent());
    let proxy = match args.proxy.as_deref().or(config.proxy.as_deref()) {
        Some(proxy) => {
            Some(ureq::Proxy::new(proxy).map_err(|err| {
                MirrorError::Custom(format!("invalid proxy `{proxy}`: {err}"))
            })?)
        }
        None => None,
    };
    configure_http_client(|client| {
        client.user_agent = Some(user_agent);
        if proxy.is_some() {
            client.proxy = proxy;
        }
    });

    let (sink, receiver) = ChannelSink::new();
    let guard = spawn_event_handler(receiver);
    let mirror = Mirror::open(&config, Arc::new(sink))?;
    debug!("mirror opened");

    let result = match args.command {
        cli::Commands::DefConfig => Ok(()),
        cli::Commands::Info { name, version } => {
            info::show_info(&mirror, &name, version.as_deref(), args.json).await
        }
        cli::Commands::Fetch {
            name,
            version,
            output,
        } => fetch::fetch_tarball(&mirror, &name, &version, output).await,
        cli::Commands::Replicate => {
            replicate::replicate(&mirror, config.replication.enabled).await
        }
        cli::Commands::Stats => stats::show_stats(&mirror, args.json).await,
    };

    let shutdown = mirror.shutdown().await;
    drop(mirror);
    guard.finish();

    result?;
    shutdown
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}

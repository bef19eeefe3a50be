pub mod args;
pub mod prettylog;

use crate::forwarder::{ForwardInput, ForwardOutput, ForwardWatcher, Forwarder};
use anyhow::anyhow;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() -> crate::Result<()> {
    // On Windows, disable ANSI colors to avoid garbage characters in console
    #[cfg(target_os = "windows")]
    let use_ansi = false;

    #[cfg(not(target_os = "windows"))]
    let use_ansi = true;

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_ansi(use_ansi)
            .with_line_number(true)
            .with_file(true)
            .finish(),
    )?;
    Ok(())
}

/// Parse the command line, wire up the forwarder and run it until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    let cli = args::Args::parse();

    let parsed_input = args::parse_input(&cli.input)?;
    let parsed_outputs = args::parse_outputs(&cli.outputs)?;
    if parsed_input.via_ssh || parsed_outputs.iter().any(|o| o.via_ssh) {
        // SSH session setup lives outside this binary; the library accepts
        // an injected listener factory and dialer for it.
        anyhow::bail!(
            "ssh endpoints need an external SSH dialer; use plain host:port endpoints"
        );
    }

    let mut input_config = parsed_input.config;
    input_config.blacklist = cli
        .block
        .iter()
        .map(|entry| args::parse_match_host(entry))
        .collect::<anyhow::Result<_>>()?;
    input_config.whitelist = cli
        .allow
        .iter()
        .map(|entry| args::parse_match_host(entry))
        .collect::<anyhow::Result<_>>()?;

    tracing::info!(
        "input {}:{} ({})",
        input_config.host,
        input_config.port,
        input_config.protocol
    );

    let input = ForwardInput::new(input_config, None).map_err(|e| anyhow!(e))?;
    let mut outputs = Vec::with_capacity(parsed_outputs.len());
    for parsed in parsed_outputs {
        tracing::info!(
            "output {} ({}){}{}",
            parsed.config.target(),
            parsed.config.protocol,
            if parsed.config.readable { "" } else { " write-only" },
            if parsed.config.writable { "" } else { " read-only" },
        );
        outputs.push(ForwardOutput::new(parsed.config, None).map_err(|e| anyhow!(e))?);
    }

    let verbose = cli.verbose;
    let json = cli.json;
    let watcher: ForwardWatcher = Arc::new(move |message| {
        if json {
            prettylog::print_json(&message);
        } else {
            prettylog::print_message(&message, verbose);
        }
    });

    let forwarder = Forwarder::new(input, outputs, watcher);
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    forwarder.run(cancel).await.map_err(|e| anyhow!(e))
}

mod classify;
mod cli;
mod config;
mod output;
mod runner;
mod session;
mod watcher;

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use config::{AutotestConfig, Settings};
use output::{Palette, Reporter};
use runner::TestCommand;
use watcher::Watcher;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries only the colored report.
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let config = AutotestConfig::load(&cli.path);
    let settings = Settings::resolve(&cli, config)?;
    let palette = Palette::new(cli.color.enabled(), settings.reset);
    let test_command = TestCommand::new(settings.command.clone(), &settings.root);

    if cli.once {
        let mut reporter = Reporter::new(io::stdout(), &settings.classifier, palette);
        return test_command.run(&mut reporter).await;
    }

    let watcher = Watcher::new(&settings.root, settings.rules)
        .with_context(|| format!("cannot watch {}", settings.root.display()))?
        .debounce(settings.debounce)
        .respect_gitignore(settings.respect_gitignore);
    let (handle, rx) = watcher.start().context("failed to start file watcher")?;
    info!(command = %test_command.command(), "ready, press Ctrl-C to stop");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let classifier = &settings.classifier;
    let test_command = &test_command;
    let result = session::run_session(rx, shutdown, |_batch| async move {
        let mut reporter = Reporter::new(io::stdout(), classifier, palette);
        test_command.run(&mut reporter).await
    })
    .await;

    handle.stop().await;
    result.map(|_| ())
}

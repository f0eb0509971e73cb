//! `pump`: run the reciprocating actuator controller, check the setup, edit settings.

mod cli;
mod error_fmt;
mod rt;
mod run;
mod settings_cmd;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: color-eyre not installed: {e}");
    }

    let code = match real_main(&cli) {
        Ok(()) => 0,
        Err(err) => {
            let detail = format!("{err:#}");
            tracing::error!(error = %detail, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let loaded = pump_config::load_file(&cli.config);
    setup_tracing(cli, loaded.as_ref().ok().map(|c| &c.logging));
    let cfg = loaded?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match &cli.cmd {
        Commands::Run(args) => {
            let summary = run::run(cfg, args)?;
            run::print_summary(&summary, cli.json)
        }
        Commands::SelfCheck { sim } => run::self_check(&cfg, *sim, cli.json),
        Commands::Settings { cmd } => settings_cmd::execute(&cfg, cmd, cli.json),
    }
}

/// Console logs go to stderr; stdout carries status lines and results.
fn setup_tracing(cli: &Cli, logging: Option<&pump_config::Logging>) {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if cli.json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(log) = logging
        && let Some(file) = log.file.as_deref()
    {
        match file_appender(file, log.rotation.as_deref()) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let _ = FILE_GUARD.set(guard);
                let level = log.level.as_deref().unwrap_or("info");
                layers.push(
                    fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(writer)
                        .with_filter(EnvFilter::new(level))
                        .boxed(),
                );
            }
            Err(e) => eprintln!("warning: file logging disabled: {e:#}"),
        }
    }

    let _ = tracing_subscriber::registry().with(layers).try_init();
}

fn file_appender(
    file: &str,
    rotation: Option<&str>,
) -> eyre::Result<tracing_appender::rolling::RollingFileAppender> {
    let path = Path::new(file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("create log dir {}", dir.display()))?;
    Ok(match rotation.unwrap_or("never") {
        "daily" => tracing_appender::rolling::daily(dir, name),
        "hourly" => tracing_appender::rolling::hourly(dir, name),
        _ => tracing_appender::rolling::never(dir, name),
    })
}

use std::fs;
use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Value},
    Figment,
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mzpiper::{MZPiper, MZPiperError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// The subset of `args` that was given explicitly on the command line
fn explicit_arguments(args: &MZPiper, matches: &ArgMatches) -> Result<Dict, MZPiperError> {
    let mut values = Value::serialize(args)?.into_dict().unwrap_or_default();
    values.retain(|key, _| matches.value_source(key) == Some(ValueSource::CommandLine));
    Ok(values)
}

fn resolve_configuration() -> Result<MZPiper, MZPiperError> {
    let matches = MZPiper::command().get_matches();
    let args = MZPiper::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let mut config =
        Figment::from(Serialized::defaults(&args)).merge(Toml::file("mzpiper.toml"));
    if let Some(path) = args.config_file.as_ref() {
        config = config.merge(Toml::file_exact(path));
    }
    config = config
        .merge(Serialized::defaults(explicit_arguments(&args, &matches)?))
        .merge(Env::prefixed("MZPIPER_"));
    Ok(config.extract()?)
}

fn main() -> ExitCode {
    let args = match resolve_configuration() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let stderr_layer = fmt::layer()
        .compact()
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        );

    let (file_layer, _guard) = match args.log_file.as_ref() {
        Some(path) => {
            let handle = match fs::File::create(path) {
                Ok(handle) => handle,
                Err(e) => {
                    eprintln!("Failed to create the log file {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
            };
            let (writer, guard) = tracing_appender::non_blocking(handle);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).with_filter(
                EnvFilter::builder()
                    .with_default_directive(tracing::Level::INFO.into())
                    .from_env_lossy(),
            );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    match args.main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

mod cli;
mod exit_codes;
mod output;
mod plan_yaml;
mod run;
mod run_error;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Diagnostics go to stderr so stdout stays clean for summaries and NDJSON.
fn init_logging(filter: Option<&str>) {
    let env_filter = match filter {
        Some(f) => EnvFilter::try_new(f).map_err(|_| ()),
        None => EnvFilter::try_from_default_env().map_err(|_| ()),
    }
    .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    let code = match cli.command {
        cli::Command::Run(args) => {
            init_logging(args.log_level.as_deref());
            match run::run(args).await {
                Ok(code) => code.as_i32(),
                Err(err) => {
                    eprintln!("{err}");
                    err.exit_code().as_i32()
                }
            }
        }
    };

    std::process::exit(code);
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Bare integers are seconds; anything else goes through `humantime` (`250ms`, `10s`, `1m30s`).
fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_positive_duration(input: &str) -> Result<Duration, String> {
    let d = parse_duration(input)?;
    if d.is_zero() {
        return Err(format!("duration '{}' must be greater than zero", input.trim()));
    }
    Ok(d)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar plus a human-readable summary.
    HumanReadable,
    /// Emit NDJSON progress, trend and summary lines to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "Thread-group load test runner",
    long_about = "volley runs a YAML test plan of thread groups against HTTP targets.\n\nEach thread group drives a population of virtual users along a fixed, ramp-up, spike or stairs profile; every virtual user repeatedly runs the group's request chain.\n\nPress Ctrl-C once to stop gracefully (in-flight iterations finish), twice to abort in-flight requests.",
    after_help = "Examples:\n  volley run demos/plan.yaml\n  volley run demos/plan.yaml --output json\n  volley run demos/plan.yaml --var base_url=http://localhost:8080 --data users.csv"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a test plan
    #[command(
        long_about = "Load a YAML test plan and run every enabled thread group concurrently until all profiles end or the run is stopped.\n\nCLI flags override values from the plan file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the test plan (.yaml)
    pub plan: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Trend sampling interval (also the length of each trend window)
    #[arg(long, value_parser = parse_positive_duration, default_value = "1s")]
    pub trend_interval: Duration,

    /// Periodic report interval
    #[arg(long, value_parser = parse_positive_duration, default_value = "1s")]
    pub report_interval: Duration,

    /// How long a stop may take before in-flight requests are cancelled
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub stop_timeout: Duration,

    /// TCP connect timeout for target hosts
    #[arg(long, value_parser = parse_positive_duration, default_value = "3s")]
    pub connect_timeout: Duration,

    /// CSV data file (overrides `data` from the plan)
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Add/override plan variables (repeatable, KEY=VALUE)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Log filter for stderr diagnostics (e.g. `info`, `volley_core=debug`); falls back to RUST_LOG
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("7"), Ok(Duration::from_secs(7)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_positive_duration("0s").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "volley",
            "run",
            "plan.yaml",
            "--output",
            "json",
            "--trend-interval",
            "500ms",
            "--stop-timeout",
            "2s",
            "--data",
            "users.csv",
            "--var",
            "base_url=http://localhost",
            "--var",
            "EMPTY=",
            "--log-level",
            "debug",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.plan, PathBuf::from("plan.yaml"));
        assert_eq!(args.output, OutputFormat::Json);
        assert_eq!(args.trend_interval, Duration::from_millis(500));
        assert_eq!(args.report_interval, Duration::from_secs(1));
        assert_eq!(args.stop_timeout, Duration::from_secs(2));
        assert_eq!(args.connect_timeout, Duration::from_secs(3));
        assert_eq!(args.data, Some(PathBuf::from("users.csv")));
        assert_eq!(
            args.vars,
            vec!["base_url=http://localhost".to_string(), "EMPTY=".to_string()]
        );
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn cli_defaults_to_human_output() {
        let cli = match Cli::try_parse_from(["volley", "run", "plan.yaml"]) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.output, OutputFormat::HumanReadable);
        assert!(args.vars.is_empty());
        assert!(args.data.is_none());
    }
}

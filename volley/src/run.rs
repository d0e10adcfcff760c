use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;

use volley_core::{
    CsvDataSource, DataSource as _, EngineContext, HttpClient, PlanHandle, RunOptions, Variables,
};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan_yaml;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let plan = plan_yaml::load_plan(&args.plan)
        .await
        .map_err(RunError::InvalidInput)?;

    let mut variables = plan.variables;
    apply_var_overrides(&mut variables, &args.vars).map_err(RunError::InvalidInput)?;

    let data_path = args.data.clone().or(plan.data);
    let data = match &data_path {
        Some(path) => Some(load_data(path).map_err(RunError::InvalidInput)?),
        None => None,
    };

    let runnable = plan
        .groups
        .iter()
        .filter(|g| g.enabled)
        .filter(|g| match g.validate() {
            Ok(()) => true,
            Err(err) => {
                eprintln!("warning: {err}; thread group skipped");
                false
            }
        })
        .count();
    if runnable == 0 {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "plan has no runnable thread groups: {}",
            args.plan.display()
        )));
    }

    let http = Arc::new(HttpClient::new(Some(args.connect_timeout)));
    let mut ctx = EngineContext::new(http).with_variables(variables);
    if let Some(data) = data {
        ctx = ctx.with_data(Arc::new(data));
    }

    let options = RunOptions {
        report_interval: args.report_interval,
        trend_interval: args.trend_interval,
        stop_timeout: args.stop_timeout,
        ..RunOptions::default()
    };

    out.print_header(&args.plan, &plan.groups);

    let mut handle = volley_core::start_plan(plan.groups, ctx, options, out.callbacks());
    let stop_result = drive(&mut handle).await;
    let summary = handle.finish().await;

    out.print_summary(&summary)
        .map_err(RunError::RuntimeError)?;

    stop_result.map_err(RunError::RuntimeError)?;
    Ok(ExitCode::from_summary(&summary))
}

/// Wait for the plan to end. The first Ctrl-C requests a graceful stop, a second one aborts
/// in-flight requests.
async fn drive(handle: &mut PlanHandle) -> anyhow::Result<()> {
    let interrupted = tokio::select! {
        () = handle.wait() => false,
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            true
        }
    };
    if !interrupted {
        return Ok(());
    }

    eprintln!("stopping: waiting for in-flight iterations (Ctrl-C again to abort them)");
    handle.request_stop();

    let drained = tokio::select! {
        res = handle.drain() => Some(res),
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            None
        }
    };

    let res = match drained {
        Some(res) => res,
        None => {
            eprintln!("aborting in-flight requests");
            handle.stop();
            handle.drain().await
        }
    };

    res.context("plan did not stop cleanly")
}

fn load_data(path: &Path) -> anyhow::Result<CsvDataSource> {
    let data = CsvDataSource::from_path(path)
        .with_context(|| format!("failed to load CSV data: {}", path.display()))?;
    if data.is_empty() {
        tracing::warn!(path = %path.display(), "CSV data file has no rows");
    }
    Ok(data)
}

fn apply_var_overrides(vars: &mut Variables, overrides: &[String]) -> anyhow::Result<()> {
    for raw in overrides {
        let (k, v) = parse_var_override(raw)?;
        vars.set(k, v);
    }
    Ok(())
}

fn parse_var_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --var (expected KEY=VALUE): {s}"))?;
    let k = k.trim();
    if k.is_empty() {
        anyhow::bail!("invalid --var (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_overrides_replace_plan_values() {
        let mut vars: Variables = [("base", "http://a"), ("user", "x")].into_iter().collect();
        let res = apply_var_overrides(
            &mut vars,
            &["base=http://b".to_string(), "token=a=b".to_string()],
        );
        assert!(res.is_ok());
        assert_eq!(vars.get("base"), Some("http://b"));
        assert_eq!(vars.get("user"), Some("x"));
        assert_eq!(vars.get("token"), Some("a=b"));
    }

    #[test]
    fn malformed_var_override_is_rejected() {
        assert!(parse_var_override("novalue").is_err());
        assert!(parse_var_override("=x").is_err());
        assert!(matches!(
            parse_var_override("EMPTY="),
            Ok((k, v)) if k == "EMPTY" && v.is_empty()
        ));
    }
}

use std::sync::Arc;

use tokio::time::Instant;
use volley_http::HttpResponse;

use crate::assertion::TestResult;
use crate::cancel::CancellationController;
use crate::chain::{RequestChain, Variables};
use crate::data::DataSource;
use crate::executor::HttpExecutor;
use crate::metrics::{MetricsAggregator, RequestResult};
use crate::progress::ResultFn;
use crate::script::{NoScripts, PostResponseContext, PreRequestContext, ScriptPipeline};

/// Collaborators shared by every worker of a plan.
#[derive(Clone)]
pub struct EngineContext {
    pub http: Arc<dyn HttpExecutor>,
    pub scripts: Arc<dyn ScriptPipeline>,
    pub data: Option<Arc<dyn DataSource>>,
    pub variables: Arc<Variables>,
    pub metrics: Arc<MetricsAggregator>,
    pub on_result: Option<ResultFn>,
}

impl EngineContext {
    pub fn new(http: Arc<dyn HttpExecutor>) -> Self {
        Self {
            http,
            scripts: Arc::new(NoScripts),
            data: None,
            variables: Arc::new(Variables::new()),
            metrics: Arc::new(MetricsAggregator::new()),
            on_result: None,
        }
    }

    #[must_use]
    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptPipeline>) -> Self {
        self.scripts = scripts;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Arc<dyn DataSource>) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Arc::new(variables);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("data", &self.data)
            .field("variables", &self.variables.len())
            .field("on_result", &self.on_result.is_some())
            .finish_non_exhaustive()
    }
}

/// Everything known about one recorded request step.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub group: Arc<str>,
    pub endpoint: Arc<str>,
    pub method: http::Method,
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub tests: Vec<TestResult>,
    pub result: RequestResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Recorded { success: bool },
    /// Cancelled mid-flight or skipped because the run is stopping. Nothing was recorded.
    Discarded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    pub recorded: u64,
    pub failed: u64,
    pub discarded: u64,
}

/// Executes iterations of one thread group's request chains.
pub struct RequestIterationRunner {
    group: Arc<str>,
    chains: Arc<[RequestChain]>,
    ctx: EngineContext,
    scope: CancellationController,
}

impl RequestIterationRunner {
    pub fn new(
        group: Arc<str>,
        chains: Arc<[RequestChain]>,
        ctx: EngineContext,
        scope: CancellationController,
    ) -> Self {
        Self {
            group,
            chains,
            ctx,
            scope,
        }
    }

    pub fn group(&self) -> &Arc<str> {
        &self.group
    }

    /// Variables for a fresh iteration: plan variables overlaid with the next data row.
    pub fn bind_variables(&self) -> Variables {
        let mut vars = (*self.ctx.variables).clone();
        if let Some(row) = self.ctx.data.as_ref().and_then(|d| d.next_row()) {
            vars.extend(row.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        vars
    }

    /// One full pass over every chain of the group. `should_stop` is consulted between chains.
    pub async fn run_iteration(&self, should_stop: impl Fn() -> bool) -> IterationOutcome {
        let mut vars = self.bind_variables();
        let mut outcome = IterationOutcome::default();

        for (idx, chain) in self.chains.iter().enumerate() {
            if idx > 0 && should_stop() {
                break;
            }
            match self.run_step(chain, &mut vars).await {
                StepOutcome::Recorded { success } => {
                    outcome.recorded += 1;
                    if !success {
                        outcome.failed += 1;
                    }
                }
                StepOutcome::Discarded => {
                    outcome.discarded += 1;
                    break;
                }
            }
        }

        outcome
    }

    pub async fn run_step(&self, chain: &RequestChain, vars: &mut Variables) -> StepOutcome {
        let mut request = chain.request.render(vars);

        if let Some(script) = chain.pre_script.as_deref() {
            let mut ctx = PreRequestContext {
                request: &mut request,
                variables: vars,
            };
            if let Err(err) = self.ctx.scripts.pre_request(script, &mut ctx).await {
                tracing::debug!(group = %self.group, endpoint = %chain.name, error = %err, "pre-script failed");
                let result = RequestResult {
                    end: Instant::now(),
                    success: false,
                    latency_ms: 0,
                };
                self.record(RequestRecord {
                    group: self.group.clone(),
                    endpoint: chain.name.clone(),
                    method: request.method.clone(),
                    url: request.url.clone(),
                    status: None,
                    error: Some(format!("pre-script: {err}")),
                    tests: Vec::new(),
                    result,
                });
                return StepOutcome::Recorded { success: false };
            }
        }

        if !self.scope.is_running() {
            return StepOutcome::Discarded;
        }

        let started = Instant::now();
        let response = self
            .ctx
            .http
            .execute(request.clone(), self.scope.in_flight_token())
            .await;
        let end = Instant::now();
        let latency_ms = i64::try_from(end.duration_since(started).as_millis()).unwrap_or(i64::MAX);

        let (response, mut error): (Option<HttpResponse>, Option<String>) = match response {
            Ok(res) => (Some(res), None),
            Err(err) if err.is_cancelled() => {
                tracing::trace!(group = %self.group, endpoint = %chain.name, "iteration discarded after cancellation");
                return StepOutcome::Discarded;
            }
            Err(err) => (None, Some(err.to_string())),
        };

        let mut tests = Vec::with_capacity(chain.assertions.len());
        if let Some(res) = &response {
            tests.extend(chain.assertions.iter().map(|a| a.evaluate(res)));

            if let Some(script) = chain.post_script.as_deref() {
                let mut ctx = PostResponseContext {
                    request: &request,
                    response: res,
                    variables: vars,
                    tests: &mut tests,
                };
                if let Err(err) = self.ctx.scripts.post_response(script, &mut ctx).await {
                    error = Some(format!("post-script: {err}"));
                }
            }
        }

        let success = error.is_none() && tests.iter().all(|t| t.passed);
        let result = RequestResult {
            end,
            success,
            latency_ms,
        };

        self.record(RequestRecord {
            group: self.group.clone(),
            endpoint: chain.name.clone(),
            method: request.method,
            url: request.url,
            status: response.as_ref().map(|r| r.status),
            error,
            tests,
            result,
        });

        if let Some(delay) = chain.timer
            && self.scope.is_running()
        {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.scope.stopped() => {}
            }
        }

        StepOutcome::Recorded { success }
    }

    fn record(&self, record: RequestRecord) {
        self.ctx.metrics.record_result(&record.endpoint, record.result);
        if let Some(on_result) = &self.ctx.on_result {
            on_result(&record);
        }
    }
}

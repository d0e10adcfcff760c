mod assertion;
mod cancel;
mod chain;
mod config;
mod data;
mod error;
mod executor;
mod gate;
mod iteration;
mod metrics;
mod plan;
mod progress;
mod schedule;
mod scheduler;
mod script;
mod summary;
mod trend;
mod vu;

pub use assertion::{Assertion, CompareOp, JsonPath, TestResult};
pub use cancel::CancellationController;
pub use chain::{RequestChain, RequestTemplate, Variables, render_template};
pub use config::{LoopLimit, RunOptions, ThreadGroupConfig, ThreadGroupKind, ThreadGroupPlan};
pub use data::{CsvDataSource, DataSource, Row};
pub use error::{Error, Result};
pub use executor::HttpExecutor;
pub use gate::{IterationGate, PlannedEnd, StopReason};
pub use iteration::{
    EngineContext, IterationOutcome, RequestIterationRunner, RequestRecord, StepOutcome,
};
pub use metrics::{EndpointStats, MetricsAggregator, MetricsSnapshot, RequestResult};
pub use plan::{PlanHandle, start_plan};
pub use progress::{PlanCallbacks, ProgressFn, ProgressUpdate, ReportFn, ResultFn, TrendFn};
pub use schedule::{ConcurrencyProfile, Phase};
pub use scheduler::ThreadGroupScheduler;
pub use script::{
    NoScripts, PostResponseContext, PreRequestContext, ScriptError, ScriptPipeline,
};
pub use summary::{EndpointSummary, LatencySummary, PlanSummary, summarize_latencies};
pub use trend::{TrendPoint, TrendSampler, TrendSeries, WindowStats, window_stats};
pub use vu::{ActiveWorkerGuard, GroupActivity, PlanActivity, VirtualUserWorker};

pub use volley_http::{
    Error as HttpError, HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind,
};

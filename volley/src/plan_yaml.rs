use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use volley_core::{
    Assertion, CompareOp, LoopLimit, RequestChain, RequestTemplate, ThreadGroupConfig,
    ThreadGroupKind, ThreadGroupPlan, Variables,
};

/// A parsed plan file, ready to hand to the engine.
#[derive(Debug)]
pub(crate) struct TestPlan {
    pub groups: Vec<ThreadGroupPlan>,
    pub variables: Variables,
    /// CSV data file, resolved against the plan's directory.
    pub data: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PlanYaml {
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    variables: BTreeMap<String, String>,

    #[serde(default)]
    data: Option<PathBuf>,

    thread_groups: Vec<ThreadGroupYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ThreadGroupYaml {
    #[serde(default)]
    name: Option<String>,

    #[serde(default = "default_true")]
    enabled: bool,

    /// fixed | ramp-up | spike | stairs
    mode: String,

    // fixed
    threads: Option<u64>,
    loops: Option<u64>,
    #[serde(default)]
    duration: Option<YamlDuration>,

    // ramp-up / stairs
    start_threads: Option<u64>,
    end_threads: Option<u64>,
    #[serde(default)]
    ramp: Option<YamlDuration>,
    step_size: Option<u64>,
    #[serde(default)]
    hold_per_step: Option<YamlDuration>,

    // spike
    min_threads: Option<u64>,
    max_threads: Option<u64>,
    #[serde(default)]
    ramp_up: Option<YamlDuration>,
    #[serde(default)]
    hold: Option<YamlDuration>,
    #[serde(default)]
    ramp_down: Option<YamlDuration>,

    // every dynamic mode
    #[serde(default)]
    total: Option<YamlDuration>,

    requests: Vec<RequestYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequestYaml {
    #[serde(default)]
    name: Option<String>,

    #[serde(default = "default_method")]
    method: String,

    url: String,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    headers: BTreeMap<String, String>,

    #[serde(default)]
    body: Option<String>,

    #[serde(default)]
    timeout: Option<YamlDuration>,

    #[serde(default)]
    assertions: Vec<AssertionYaml>,

    /// Delay after the request completes.
    #[serde(default)]
    timer: Option<YamlDuration>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum AssertionYaml {
    ResponseCode {
        #[serde(default = "default_op")]
        op: String,
        value: i64,
    },
    BodyContains {
        #[serde(deserialize_with = "deserialize_scalar")]
        value: String,
    },
    JsonPath {
        path: String,
        #[serde(deserialize_with = "deserialize_scalar")]
        value: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_op() -> String {
    "=".to_string()
}

#[derive(Debug, Clone, Copy)]
struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn scalar_to_string(v: serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s),
        _ => None,
    }
}

fn deserialize_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(raw).ok_or_else(|| serde::de::Error::custom("expected a string, number or bool"))
}

/// Maps whose values may be written as any YAML scalar (`port: 8080`); nulls are dropped.
fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        if v.is_null() {
            continue;
        }
        let s = scalar_to_string(v)
            .ok_or_else(|| serde::de::Error::custom(format!("`{k}` must be a scalar value")))?;
        out.insert(k, s);
    }

    Ok(out)
}

pub(crate) async fn load_plan(path: &Path) -> anyhow::Result<TestPlan> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read test plan: {}", path.display()))?;

    parse_plan(&text, path.parent())
        .with_context(|| format!("invalid test plan: {}", path.display()))
}

pub(crate) fn parse_plan(text: &str, base_dir: Option<&Path>) -> anyhow::Result<TestPlan> {
    let doc: PlanYaml = serde_yaml::from_str(text).context("failed to parse YAML")?;

    if doc.thread_groups.is_empty() {
        anyhow::bail!("plan has no thread groups");
    }

    let groups = doc
        .thread_groups
        .into_iter()
        .enumerate()
        .map(|(idx, g)| {
            let name = g
                .name
                .clone()
                .unwrap_or_else(|| format!("group_{}", idx + 1));
            thread_group_into_plan(g, name.clone())
                .with_context(|| format!("thread group `{name}`"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let data = doc.data.map(|p| match base_dir {
        Some(dir) if p.is_relative() => dir.join(p),
        _ => p,
    });

    Ok(TestPlan {
        groups,
        variables: doc.variables.into_iter().collect(),
        data,
    })
}

fn required<T>(value: Option<T>, field: &str) -> anyhow::Result<T> {
    value.with_context(|| format!("missing `{field}`"))
}

fn thread_group_into_plan(g: ThreadGroupYaml, name: String) -> anyhow::Result<ThreadGroupPlan> {
    let kind = ThreadGroupKind::from_str(g.mode.trim())
        .map_err(|_| volley_core::Error::InvalidMode(g.mode.clone()))?;
    let dur = |d: Option<YamlDuration>, field: &str| required(d.map(YamlDuration::into_inner), field);

    let config = match kind {
        ThreadGroupKind::Fixed => {
            let limit = match (g.loops, g.duration) {
                (Some(loops), None) => LoopLimit::Loops(loops),
                (None, Some(d)) => LoopLimit::Duration(d.into_inner()),
                (Some(_), Some(_)) => anyhow::bail!("set either `loops` or `duration`, not both"),
                (None, None) => anyhow::bail!("fixed mode needs `loops` or `duration`"),
            };
            ThreadGroupConfig::Fixed {
                threads: required(g.threads, "threads")?,
                limit,
            }
        }
        ThreadGroupKind::RampUp => ThreadGroupConfig::RampUp {
            start_threads: required(g.start_threads, "startThreads")?,
            end_threads: required(g.end_threads, "endThreads")?,
            ramp: dur(g.ramp, "ramp")?,
            total: dur(g.total, "total")?,
        },
        ThreadGroupKind::Spike => ThreadGroupConfig::Spike {
            min_threads: required(g.min_threads, "minThreads")?,
            max_threads: required(g.max_threads, "maxThreads")?,
            ramp_up: dur(g.ramp_up, "rampUp")?,
            hold: dur(g.hold, "hold")?,
            ramp_down: dur(g.ramp_down, "rampDown")?,
            total: dur(g.total, "total")?,
        },
        ThreadGroupKind::Stairs => ThreadGroupConfig::Stairs {
            start_threads: required(g.start_threads, "startThreads")?,
            end_threads: required(g.end_threads, "endThreads")?,
            step_size: required(g.step_size, "stepSize")?,
            hold_per_step: dur(g.hold_per_step, "holdPerStep")?,
            total: dur(g.total, "total")?,
        },
    };

    let mut plan = ThreadGroupPlan::new(name, config);
    plan.enabled = g.enabled;
    for (idx, r) in g.requests.into_iter().enumerate() {
        let chain = request_into_chain(r).with_context(|| format!("request #{}", idx + 1))?;
        plan = plan.with_chain(chain);
    }
    Ok(plan)
}

fn request_into_chain(r: RequestYaml) -> anyhow::Result<RequestChain> {
    let method = http::Method::from_bytes(r.method.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method `{}`", r.method))?;

    let name = r.name.unwrap_or_else(|| r.url.clone());
    let mut template = RequestTemplate::new(method, r.url);
    for (k, v) in r.headers {
        template = template.with_header(k, v);
    }
    if let Some(body) = r.body {
        template = template.with_body(body);
    }
    if let Some(timeout) = r.timeout {
        template = template.with_timeout(timeout.into_inner());
    }

    let mut chain = RequestChain::new(name, template);
    for a in r.assertions {
        let assertion = match a {
            AssertionYaml::ResponseCode { op, value } => {
                Assertion::response_code(CompareOp::parse(&op)?, value)
            }
            AssertionYaml::BodyContains { value } => Assertion::body_contains(value),
            AssertionYaml::JsonPath { path, value } => Assertion::json_path(&path, value)?,
        };
        chain = chain.with_assertion(assertion);
    }
    if let Some(timer) = r.timer {
        chain = chain.with_timer(timer.into_inner());
    }

    Ok(chain)
}

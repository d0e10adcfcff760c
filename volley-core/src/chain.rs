use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use bytes::Bytes;
use volley_http::HttpRequest;

use crate::assertion::Assertion;

/// Iteration-scoped variables used to fill `{{name}}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables(AHashMap<String, String>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Later values override earlier ones.
    pub fn extend<I, K, V>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in iter {
            self.set(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Self::new();
        vars.extend(iter);
        vars
    }
}

/// Replace every `{{name}}` in `input` with its variable. Unknown names are kept verbatim.
pub fn render_template(input: &str, vars: &Variables) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = after_open[..close].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl RequestTemplate {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn render(&self, vars: &Variables) -> HttpRequest {
        let mut req = HttpRequest::new(self.method.clone(), render_template(&self.url, vars));
        req.headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), render_template(v, vars)))
            .collect();
        if let Some(body) = &self.body {
            req.body = Bytes::from(render_template(body, vars));
        }
        req.timeout = self.timeout;
        req
    }
}

/// One step of a thread group: a request with its assertions, scripts and trailing delay.
#[derive(Debug, Clone)]
pub struct RequestChain {
    pub name: Arc<str>,
    pub request: RequestTemplate,
    pub assertions: Vec<Assertion>,
    pub timer: Option<Duration>,
    pub pre_script: Option<Arc<str>>,
    pub post_script: Option<Arc<str>>,
}

impl RequestChain {
    pub fn new(name: impl AsRef<str>, request: RequestTemplate) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            request,
            assertions: Vec::new(),
            timer: None,
            pre_script: None,
            post_script: None,
        }
    }

    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    #[must_use]
    pub fn with_timer(mut self, delay: Duration) -> Self {
        self.timer = Some(delay);
        self
    }

    #[must_use]
    pub fn with_pre_script(mut self, script: impl AsRef<str>) -> Self {
        self.pre_script = Some(Arc::from(script.as_ref()));
        self
    }

    #[must_use]
    pub fn with_post_script(mut self, script: impl AsRef<str>) -> Self {
        self.post_script = Some(Arc::from(script.as_ref()));
        self
    }
}

use std::str::FromStr;

use serde_json::Value;
use volley_http::HttpResponse;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum CompareOp {
    #[strum(to_string = "=", serialize = "==")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Ge,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Le,
}

impl CompareOp {
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s.trim()).map_err(|_| Error::InvalidOperator(s.to_string()))
    }

    pub fn compare(self, actual: i64, expected: i64) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Gt => actual > expected,
            Self::Ge => actual >= expected,
            Self::Lt => actual < expected,
            Self::Le => actual <= expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// `$`-rooted path over a JSON document: `.key`, `[n]` and `['key']` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = || Error::InvalidJsonPath(path.to_string());

        let mut rest = path.trim().strip_prefix('$').ok_or_else(invalid)?;
        let mut segments = Vec::new();

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                let key = &after[..end];
                if key.is_empty() {
                    return Err(invalid());
                }
                segments.push(Segment::Key(key.to_string()));
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(invalid)?;
                let inner = after[..close].trim();
                let quoted = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
                match quoted {
                    Some(key) => segments.push(Segment::Key(key.to_string())),
                    None => {
                        let idx = inner.parse::<usize>().map_err(|_| invalid())?;
                        segments.push(Segment::Index(idx));
                    }
                }
                rest = &after[close + 1..];
            } else {
                return Err(invalid());
            }
        }

        Ok(Self {
            raw: path.trim().to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn select<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(root, |cur, seg| match seg {
            Segment::Key(k) => cur.get(k.as_str()),
            Segment::Index(i) => cur.get(*i),
        })
    }
}

/// Outcome of one assertion or script test, shown per request in result records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    ResponseCode { op: CompareOp, expected: i64 },
    BodyContains(String),
    JsonPath { path: JsonPath, expected: String },
}

impl Assertion {
    pub fn response_code(op: CompareOp, expected: i64) -> Self {
        Self::ResponseCode { op, expected }
    }

    pub fn body_contains(needle: impl Into<String>) -> Self {
        Self::BodyContains(needle.into())
    }

    pub fn json_path(path: &str, expected: impl Into<String>) -> Result<Self> {
        Ok(Self::JsonPath {
            path: JsonPath::parse(path)?,
            expected: expected.into(),
        })
    }

    pub fn name(&self) -> String {
        match self {
            Self::ResponseCode { op, expected } => format!("response code {op} {expected}"),
            Self::BodyContains(needle) => format!("body contains {needle:?}"),
            Self::JsonPath { path, expected } => format!("{} == {expected}", path.as_str()),
        }
    }

    pub fn evaluate(&self, response: &HttpResponse) -> TestResult {
        let name = self.name();
        match self {
            Self::ResponseCode { op, expected } => {
                let actual = i64::from(response.status);
                if op.compare(actual, *expected) {
                    TestResult::pass(name)
                } else {
                    TestResult::fail(name, format!("status was {actual}"))
                }
            }
            Self::BodyContains(needle) => {
                let body = String::from_utf8_lossy(&response.body);
                if body.contains(needle.as_str()) {
                    TestResult::pass(name)
                } else {
                    TestResult::fail(name, "substring not found in response body")
                }
            }
            Self::JsonPath { path, expected } => {
                let doc: Value = match serde_json::from_slice(&response.body) {
                    Ok(doc) => doc,
                    Err(err) => {
                        return TestResult::fail(name, format!("response is not json: {err}"));
                    }
                };
                match path.select(&doc) {
                    None => TestResult::fail(name, "path not found"),
                    Some(actual) if json_matches(actual, expected) => TestResult::pass(name),
                    Some(actual) => TestResult::fail(name, format!("value was {actual}")),
                }
            }
        }
    }
}

fn json_matches(actual: &Value, expected: &str) -> bool {
    if let Value::String(s) = actual {
        return s == expected;
    }
    match serde_json::from_str::<Value>(expected) {
        Ok(parsed) => &parsed == actual,
        Err(_) => actual.to_string() == expected,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use bytes::Bytes;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::from(body.to_string()),
            headers: Vec::new(),
        }
    }

    const DOC: &str = r#"{"status":"ok","user":{"id":42,"name":"volley"},"items":[{"id":1},{"id":2}]}"#;

    #[test]
    fn operators_parse_and_compare() {
        assert_eq!(CompareOp::parse("=").unwrap(), CompareOp::Eq);
        assert_eq!(CompareOp::parse("==").unwrap(), CompareOp::Eq);
        assert_eq!(CompareOp::parse(" >= ").unwrap(), CompareOp::Ge);
        assert!(CompareOp::parse("=~").is_err());

        assert!(CompareOp::Lt.compare(200, 300));
        assert!(!CompareOp::Gt.compare(200, 300));
        assert_eq!(CompareOp::Ne.to_string(), "!=");
        assert_eq!(CompareOp::Eq.to_string(), "=");
    }

    #[test]
    fn response_code_assertion() {
        let a = Assertion::response_code(CompareOp::Lt, 400);
        assert!(a.evaluate(&response(204, "")).passed);

        let failed = a.evaluate(&response(503, ""));
        assert!(!failed.passed);
        assert_eq!(failed.name, "response code < 400");
        assert_eq!(failed.message.as_deref(), Some("status was 503"));
    }

    #[test]
    fn body_contains_assertion() {
        let a = Assertion::body_contains("World");
        assert!(a.evaluate(&response(200, "Hello World!")).passed);
        assert!(!a.evaluate(&response(200, "nope")).passed);
    }

    #[test]
    fn json_path_parses_supported_segments() {
        assert!(JsonPath::parse("$").is_ok());
        assert!(JsonPath::parse("$.user.name").is_ok());
        assert!(JsonPath::parse("$.items[1].id").is_ok());
        assert!(JsonPath::parse("$['user']['id']").is_ok());

        assert!(JsonPath::parse("user.name").is_err());
        assert!(JsonPath::parse("$.").is_err());
        assert!(JsonPath::parse("$.items[x]").is_err());
        assert!(JsonPath::parse("$.items[0").is_err());
    }

    #[test]
    fn json_path_equality() {
        let ok = response(200, DOC);

        let cases = [
            ("$.status", "ok", true),
            ("$.user.id", "42", true),
            ("$['user']['name']", "volley", true),
            ("$.items[1].id", "2", true),
            ("$.items[0]", r#"{"id": 1}"#, true),
            ("$.user.id", "43", false),
            ("$.items[5].id", "1", false),
        ];
        for (path, expected, passed) in cases {
            let result = Assertion::json_path(path, expected).unwrap().evaluate(&ok);
            assert_eq!(result.passed, passed, "{path} == {expected}");
        }

        let not_json = Assertion::json_path("$.status", "ok")
            .unwrap()
            .evaluate(&response(200, "<html>"));
        assert!(!not_json.passed);
    }
}

use async_trait::async_trait;
use volley_http::{HttpRequest, HttpResponse};

use crate::assertion::TestResult;
use crate::chain::Variables;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub struct PreRequestContext<'a> {
    pub request: &'a mut HttpRequest,
    pub variables: &'a mut Variables,
}

pub struct PostResponseContext<'a> {
    pub request: &'a HttpRequest,
    pub response: &'a HttpResponse,
    pub variables: &'a mut Variables,
    /// Tests appended here are reported with the assertion results.
    pub tests: &'a mut Vec<TestResult>,
}

/// Executes the pre/post script text attached to a request.
///
/// A failing pre-script fails the iteration before the request is sent. A failing post-script
/// fails the iteration after the fact.
#[async_trait]
pub trait ScriptPipeline: Send + Sync {
    async fn pre_request(
        &self,
        _script: &str,
        _ctx: &mut PreRequestContext<'_>,
    ) -> Result<(), ScriptError> {
        Ok(())
    }

    async fn post_response(
        &self,
        _script: &str,
        _ctx: &mut PostResponseContext<'_>,
    ) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// Accepts every script without running it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScripts;

impl ScriptPipeline for NoScripts {}

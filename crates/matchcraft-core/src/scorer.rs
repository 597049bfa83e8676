use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use matchcraft_types::{Score, ToolCall};

use crate::compare::Expected;
use crate::scorers::tool_calls::ExpectedToolCall;

/// Everything a scorer may look at for one evaluation. Built fresh per call
/// and discarded once the caller reads the score; the core keeps no state
/// across invocations.
#[derive(Debug, Clone, Default)]
pub struct ScoreArgs {
    pub input: String,
    /// Raw task output, pre-parse.
    pub output: String,
    pub expected: Option<BTreeMap<String, Expected>>,
    pub expected_tools: Option<Vec<ExpectedToolCall>>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ScoreArgs {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    /// Expected fields for the structured-output matcher. Accepts anything
    /// convertible to an `Expected`, typically `serde_json::Value`s.
    pub fn with_expected<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Expected>,
    {
        self.expected = Some(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn with_expected_tools(mut self, tools: Vec<ExpectedToolCall>) -> Self {
        self.expected_tools = Some(tools);
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }
}

/// Maps one evaluation to a normalized score plus rationale.
///
/// Synchronous scorers implement the same trait with bodies that never
/// await; callers treat both uniformly. A scorer invoked without the
/// expectations it grades returns an unscored result rather than an error.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn score(&self, args: &ScoreArgs) -> Result<Score>;
}

use std::sync::Mutex;

use serde_json::Value;

/// One structured trace per match attempt, emitted only when debugging is
/// enabled on the matcher that produced it.
#[derive(Debug, Clone)]
pub struct MatchTrace {
    pub matcher: &'static str,
    pub expected: Value,
    pub actual: Value,
    pub matched: Vec<String>,
    pub mismatched: Vec<FieldMismatch>,
    pub extra: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

/// Destination for debug traces. Injected at matcher construction; the
/// default sink drops everything, so the core stays silent unless asked.
pub trait DebugSink: Send + Sync {
    fn emit(&self, trace: &MatchTrace);
}

pub struct NoopSink;

impl DebugSink for NoopSink {
    fn emit(&self, _trace: &MatchTrace) {}
}

/// Forwards traces to the `tracing` ecosystem at DEBUG level.
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn emit(&self, trace: &MatchTrace) {
        tracing::debug!(
            matcher = trace.matcher,
            expected = %trace.expected,
            actual = %trace.actual,
            matched = ?trace.matched,
            mismatched = ?trace.mismatched,
            extra = ?trace.extra,
            "match trace"
        );
    }
}

/// Collects traces in memory. Handy for asserting on debug output in tests.
#[derive(Default)]
pub struct MemorySink {
    traces: Mutex<Vec<MatchTrace>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<MatchTrace> {
        self.traces.lock().unwrap().clone()
    }
}

impl DebugSink for MemorySink {
    fn emit(&self, trace: &MatchTrace) {
        self.traces.lock().unwrap().push(trace.clone());
    }
}

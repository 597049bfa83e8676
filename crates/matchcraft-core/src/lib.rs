//! matchcraft-core: matching and scoring engine for agent and LLM outputs.
//! Declare expectations, compare them against what a task actually produced,
//! aggregate the verdicts. See `examples/simple.rs` for a quickstart.

pub mod aggregate;
pub mod compare;
pub mod error;
pub mod scorer;
pub mod sink;

pub mod scorers {
    pub mod structured;
    pub mod tool_calls;
}

pub use aggregate::{aggregate, format_rationale, score_all};
pub use compare::{
    compare, CompareFn, Expected, FuzzyOptions, Predicate, Strategy, DEFAULT_NUMERIC_TOLERANCE,
};
pub use error::{ConfigError, MatchError};
pub use scorer::{ScoreArgs, Scorer};
pub use scorers::{
    structured::{FieldCompareFn, FieldStrategy, StructuredOutputScorer},
    tool_calls::{match_tool_calls, ExpectedToolCall, ToolCallScorer, ToolMatchConfig},
};
pub use sink::{DebugSink, FieldMismatch, MatchTrace, MemorySink, NoopSink, TracingSink};

pub use matchcraft_types::{Aggregate, Score, ScoreMetadata, ToolCall};

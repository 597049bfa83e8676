use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;

use matchcraft_types::Score;

use crate::compare::{compare, Expected, FuzzyOptions, Strategy};
use crate::error::ConfigError;
use crate::scorer::{ScoreArgs, Scorer};
use crate::sink::{DebugSink, FieldMismatch, MatchTrace, NoopSink};

const SCORER_NAME: &str = "structured_output";

/// Caller-supplied field comparison. Receives the field name so per-field
/// logic ("any recent timestamp") can key on it.
pub type FieldCompareFn = Arc<dyn Fn(&Expected, &Value, &str) -> Result<bool> + Send + Sync>;

/// Field-level comparison strategy for structured output.
#[derive(Clone)]
pub enum FieldStrategy {
	Strict,
	Fuzzy(FuzzyOptions),
	Custom(FieldCompareFn),
}

impl FieldStrategy {
	pub fn custom<F>(f: F) -> Self
	where
		F: Fn(&Expected, &Value, &str) -> Result<bool> + Send + Sync + 'static,
	{
		FieldStrategy::Custom(Arc::new(f))
	}
}

/// Scores a raw output string as a parsed JSON document against an expected
/// field set.
///
/// Pipeline per evaluation: parse → schema (optional) → error-field
/// convention → per-field comparison. Parse failures are scoreable model
/// behavior and become 0.0 verdicts, never errors.
pub struct StructuredOutputScorer {
	strategy: FieldStrategy,
	require_all: bool,
	allow_extras: bool,
	error_field: Option<String>,
	schema: Option<JSONSchema>,
	debug: bool,
	sink: Arc<dyn DebugSink>,
}

impl StructuredOutputScorer {
	pub fn new(strategy: FieldStrategy) -> Result<Self, ConfigError> {
		if let FieldStrategy::Fuzzy(opts) = &strategy {
			opts.validate()?;
		}
		Ok(Self {
			strategy,
			require_all: true,
			allow_extras: true,
			error_field: Some("error".to_string()),
			schema: None,
			debug: false,
			sink: Arc::new(NoopSink),
		})
	}

	pub fn strict() -> Self {
		Self {
			strategy: FieldStrategy::Strict,
			require_all: true,
			allow_extras: true,
			error_field: Some("error".to_string()),
			schema: None,
			debug: false,
			sink: Arc::new(NoopSink),
		}
	}

	pub fn fuzzy() -> Self {
		Self { strategy: FieldStrategy::Fuzzy(FuzzyOptions::default()), ..Self::strict() }
	}

	/// Validate parsed output against a JSON schema before any field checks.
	/// The schema is compiled once here, not per evaluation.
	pub fn with_schema(mut self, schema: Value) -> Result<Self, ConfigError> {
		let compiled = JSONSchema::compile(&schema)
			.map_err(|e| ConfigError::InvalidSchema(e.to_string()))?;
		self.schema = Some(compiled);
		Ok(self)
	}

	/// Field that signals in-band failure. Defaults to `"error"`.
	pub fn error_field(mut self, field: impl Into<String>) -> Self {
		self.error_field = Some(field.into());
		self
	}

	pub fn no_error_field(mut self) -> Self {
		self.error_field = None;
		self
	}

	pub fn require_all(mut self, require_all: bool) -> Self {
		self.require_all = require_all;
		self
	}

	pub fn allow_extras(mut self, allow_extras: bool) -> Self {
		self.allow_extras = allow_extras;
		self
	}

	/// Emit one structured trace per evaluation to `sink`.
	pub fn debug(mut self, sink: Arc<dyn DebugSink>) -> Self {
		self.debug = true;
		self.sink = sink;
		self
	}

	/// Score `raw_output` against `expected`. Inputs are never mutated; all
	/// intermediate state is local to the call.
	pub fn match_structured(
		&self,
		raw_output: &str,
		expected: &BTreeMap<String, Expected>,
	) -> Result<Score> {
		let parsed: Value = match serde_json::from_str(raw_output) {
			Ok(v) => v,
			Err(err) => {
				return Ok(Score::new(
					SCORER_NAME,
					0.0,
					format!("Failed to parse output as JSON: {err}"),
				)
				.with_output(raw_output));
			}
		};

		if let Some(schema) = &self.schema {
			if let Err(errors) = schema.validate(&parsed) {
				let messages: Vec<String> =
					errors.map(|e| format!("{}: {}", e.instance_path, e)).collect();
				return Ok(Score::new(
					SCORER_NAME,
					0.0,
					format!("output violates schema: {}", messages.join("; ")),
				)
				.with_output(raw_output));
			}
		}

		// In-band failure signal wins over everything else.
		if let Some(field) = &self.error_field {
			if let Some(reported) = parsed.get(field) {
				let is_error = match reported {
					Value::Null => false,
					Value::String(s) => !s.is_empty(),
					_ => true,
				};
				if is_error {
					return Ok(Score::new(
						SCORER_NAME,
						0.0,
						format!("output reported an error in \"{field}\": {reported}"),
					)
					.with_output(raw_output));
				}
			}
		}

		if expected.is_empty() {
			return Ok(Score::new(SCORER_NAME, 1.0, "valid output, nothing to check"));
		}

		let Some(fields) = parsed.as_object() else {
			return Ok(Score::new(
				SCORER_NAME,
				0.0,
				format!("expected a JSON object, got {}", json_kind(&parsed)),
			)
			.with_output(raw_output));
		};

		let total = expected.len();
		let mut matched: Vec<String> = Vec::new();
		let mut mismatched: Vec<FieldMismatch> = Vec::new();
		for (field, want) in expected {
			let actual = fields.get(field);
			let ok = match actual {
				Some(a) => self.compare_field(want, a, field)?,
				None => false,
			};
			if ok {
				matched.push(field.clone());
			} else {
				mismatched.push(FieldMismatch {
					field: field.clone(),
					expected: want.to_string(),
					actual: actual.map_or_else(|| "missing".to_string(), Value::to_string),
				});
			}
		}

		// The configured error field is part of the declared convention, so
		// it never counts as an extra.
		let extra: Vec<String> = fields
			.keys()
			.filter(|k| !expected.contains_key(*k) && Some(*k) != self.error_field.as_ref())
			.cloned()
			.collect();

		if self.debug {
			self.sink.emit(&MatchTrace {
				matcher: SCORER_NAME,
				expected: Value::Object(
					expected.iter().map(|(k, v)| (k.clone(), v.to_value())).collect(),
				),
				actual: parsed.clone(),
				matched: matched.clone(),
				mismatched: mismatched.clone(),
				extra: extra.clone(),
			});
		}

		if !self.allow_extras && !extra.is_empty() {
			return Ok(Score::new(
				SCORER_NAME,
				0.0,
				format!("unexpected field(s): {}", extra.join(", ")),
			)
			.with_counts(matched.len(), total)
			.with_output(raw_output));
		}

		let mismatch_list = || {
			mismatched
				.iter()
				.map(|m| format!("{}: expected {}, got {}", m.field, m.expected, m.actual))
				.collect::<Vec<_>>()
				.join("; ")
		};

		if self.require_all && !mismatched.is_empty() {
			return Ok(Score::new(SCORER_NAME, 0.0, mismatch_list())
				.with_counts(matched.len(), total)
				.with_output(raw_output));
		}

		if matched.len() == total {
			let mut rationale = format!("all {total} expected field(s) matched");
			if !extra.is_empty() {
				rationale.push_str(&format!(" ({} extra field(s): {})", extra.len(), extra.join(", ")));
			}
			return Ok(Score::new(SCORER_NAME, 1.0, rationale).with_counts(total, total));
		}

		Ok(Score::new(SCORER_NAME, matched.len() as f64 / total as f64, mismatch_list())
			.with_counts(matched.len(), total))
	}

	fn compare_field(&self, expected: &Expected, actual: &Value, field: &str) -> Result<bool> {
		match &self.strategy {
			FieldStrategy::Strict => Ok(compare(expected, actual, &Strategy::Strict)?),
			FieldStrategy::Fuzzy(opts) => {
				Ok(compare(expected, actual, &Strategy::Fuzzy(opts.clone()))?)
			}
			FieldStrategy::Custom(f) => f(expected, actual, field),
		}
	}
}

#[async_trait]
impl Scorer for StructuredOutputScorer {
	fn name(&self) -> &'static str {
		SCORER_NAME
	}

	async fn score(&self, args: &ScoreArgs) -> Result<Score> {
		let Some(expected) = &args.expected else {
			return Ok(Score::unscored(SCORER_NAME, "no expected fields configured"));
		};
		self.match_structured(&args.output, expected)
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sink::MemorySink;
	use serde_json::json;

	fn expected_fields(value: Value) -> BTreeMap<String, Expected> {
		match Expected::from(value) {
			Expected::Map(fields) => fields,
			_ => panic!("fixture must be an object"),
		}
	}

	#[test]
	fn parse_failure_scores_zero_and_keeps_output() {
		let scorer = StructuredOutputScorer::strict();
		let raw = "{not json";
		let score = scorer
			.match_structured(raw, &expected_fields(json!({"name": "test"})))
			.unwrap();
		assert_eq!(score.value, Some(0.0));
		assert!(score.metadata.rationale.contains("Failed to parse output as JSON"));
		assert_eq!(score.metadata.output.as_deref(), Some(raw));
	}

	#[test]
	fn empty_expectations_only_require_valid_json() {
		let scorer = StructuredOutputScorer::strict();
		let score = scorer
			.match_structured(r#"{"anything": 1}"#, &BTreeMap::new())
			.unwrap();
		assert_eq!(score.value, Some(1.0));
		assert_eq!(score.metadata.rationale, "valid output, nothing to check");
	}

	#[test]
	fn strict_mismatch_enumerates_fields() {
		let scorer = StructuredOutputScorer::strict();
		let score = scorer
			.match_structured(
				r#"{"name": "Test", "value": 42}"#,
				&expected_fields(json!({"name": "test", "value": 42})),
			)
			.unwrap();
		assert_eq!(score.value, Some(0.0));
		assert!(score
			.metadata
			.rationale
			.contains(r#"name: expected "test", got "Test""#));
	}

	#[test]
	fn fuzzy_numeric_tolerance_accepts_near_values() {
		let scorer = StructuredOutputScorer::fuzzy();
		let score = scorer
			.match_structured(r#"{"price": 99.99}"#, &expected_fields(json!({"price": 100.0})))
			.unwrap();
		// |100 - 99.99| = 0.01 <= max(100 * 0.001, 0.001) = 0.1
		assert_eq!(score.value, Some(1.0));
	}

	#[test]
	fn missing_field_reported_as_missing() {
		let scorer = StructuredOutputScorer::strict();
		let score = scorer
			.match_structured(r#"{"name": "test"}"#, &expected_fields(json!({"name": "test", "value": 42})))
			.unwrap();
		assert_eq!(score.value, Some(0.0));
		assert!(score.metadata.rationale.contains("value: expected 42, got missing"));
	}

	#[test]
	fn partial_credit_without_require_all() {
		let scorer = StructuredOutputScorer::strict().require_all(false);
		let score = scorer
			.match_structured(
				r#"{"name": "test", "value": 41}"#,
				&expected_fields(json!({"name": "test", "value": 42})),
			)
			.unwrap();
		assert_eq!(score.value, Some(0.5));
		assert_eq!(score.metadata.matched, Some(1));
		assert_eq!(score.metadata.total, Some(2));
	}

	#[test]
	fn error_field_fails_the_response() {
		let scorer = StructuredOutputScorer::strict();
		let score = scorer
			.match_structured(
				r#"{"name": "test", "error": "rate limited"}"#,
				&expected_fields(json!({"name": "test"})),
			)
			.unwrap();
		assert_eq!(score.value, Some(0.0));
		assert!(score.metadata.rationale.contains("rate limited"));
	}

	#[test]
	fn null_or_empty_error_field_is_fine() {
		let scorer = StructuredOutputScorer::strict();
		for raw in [r#"{"name": "test", "error": null}"#, r#"{"name": "test", "error": ""}"#] {
			let score = scorer
				.match_structured(raw, &expected_fields(json!({"name": "test"})))
				.unwrap();
			assert_eq!(score.value, Some(1.0), "raw: {raw}");
		}
	}

	#[test]
	fn error_field_name_is_configurable() {
		let scorer = StructuredOutputScorer::strict().error_field("failure");
		let score = scorer
			.match_structured(r#"{"failure": "boom"}"#, &BTreeMap::new())
			.unwrap();
		assert_eq!(score.value, Some(0.0));

		let disabled = StructuredOutputScorer::strict().no_error_field();
		let score = disabled
			.match_structured(r#"{"error": "boom"}"#, &BTreeMap::new())
			.unwrap();
		assert_eq!(score.value, Some(1.0));
	}

	#[test]
	fn error_field_wins_even_with_no_expectations() {
		let scorer = StructuredOutputScorer::strict();
		let score = scorer
			.match_structured(r#"{"error": "boom"}"#, &BTreeMap::new())
			.unwrap();
		assert_eq!(score.value, Some(0.0));
	}

	#[test]
	fn extras_tracked_but_tolerated_by_default() {
		let scorer = StructuredOutputScorer::strict();
		let score = scorer
			.match_structured(
				r#"{"name": "test", "debug_info": {}}"#,
				&expected_fields(json!({"name": "test"})),
			)
			.unwrap();
		assert_eq!(score.value, Some(1.0));
		assert!(score.metadata.rationale.contains("debug_info"));
	}

	#[test]
	fn extras_rejected_when_disallowed() {
		let scorer = StructuredOutputScorer::strict().allow_extras(false);
		let score = scorer
			.match_structured(
				r#"{"name": "test", "debug_info": {}}"#,
				&expected_fields(json!({"name": "test"})),
			)
			.unwrap();
		assert_eq!(score.value, Some(0.0));
		assert!(score.metadata.rationale.contains("unexpected field(s): debug_info"));
	}

	#[test]
	fn declared_error_field_is_not_an_extra() {
		let scorer = StructuredOutputScorer::strict().allow_extras(false);
		let score = scorer
			.match_structured(
				r#"{"name": "test", "error": null}"#,
				&expected_fields(json!({"name": "test"})),
			)
			.unwrap();
		assert_eq!(score.value, Some(1.0));
	}

	#[test]
	fn non_object_output_with_expectations_scores_zero() {
		let scorer = StructuredOutputScorer::strict();
		let score = scorer
			.match_structured("[1, 2, 3]", &expected_fields(json!({"name": "test"})))
			.unwrap();
		assert_eq!(score.value, Some(0.0));
		assert!(score.metadata.rationale.contains("got an array"));
	}

	#[test]
	fn custom_field_strategy_sees_field_names() {
		let scorer = StructuredOutputScorer::new(FieldStrategy::custom(|expected, actual, field| {
			if field == "timestamp" {
				return Ok(actual.as_i64().map_or(false, |t| t > 0));
			}
			Ok(compare(expected, actual, &Strategy::Strict)?)
		}))
		.unwrap();
		let score = scorer
			.match_structured(
				r#"{"name": "test", "timestamp": 1730000000}"#,
				&expected_fields(json!({"name": "test", "timestamp": 0})),
			)
			.unwrap();
		assert_eq!(score.value, Some(1.0));
	}

	#[test]
	fn custom_field_strategy_errors_propagate() {
		let scorer = StructuredOutputScorer::new(FieldStrategy::custom(|_, _, _| {
			anyhow::bail!("broken matcher")
		}))
		.unwrap();
		let err = scorer
			.match_structured(r#"{"name": "x"}"#, &expected_fields(json!({"name": "x"})))
			.unwrap_err();
		assert!(err.to_string().contains("broken matcher"));
	}

	#[test]
	fn schema_violation_scores_zero() {
		let schema = json!({
			"type": "object",
			"properties": {"name": {"type": "string"}},
			"required": ["name"]
		});
		let scorer = StructuredOutputScorer::strict().with_schema(schema).unwrap();
		let score = scorer.match_structured(r#"{"age": 3}"#, &BTreeMap::new()).unwrap();
		assert_eq!(score.value, Some(0.0));
		assert!(score.metadata.rationale.contains("violates schema"));

		let score = scorer.match_structured(r#"{"name": "ok"}"#, &BTreeMap::new()).unwrap();
		assert_eq!(score.value, Some(1.0));
	}

	#[test]
	fn invalid_schema_rejected_at_construction() {
		let bad = json!({"type": "no_such_type"});
		assert!(StructuredOutputScorer::strict().with_schema(bad).is_err());
	}

	#[test]
	fn debug_traces_reach_the_injected_sink() {
		let sink = Arc::new(MemorySink::new());
		let scorer = StructuredOutputScorer::strict()
			.require_all(false)
			.debug(sink.clone());
		scorer
			.match_structured(
				r#"{"name": "Test", "value": 42, "extra": true}"#,
				&expected_fields(json!({"name": "test", "value": 42})),
			)
			.unwrap();

		let traces = sink.traces();
		assert_eq!(traces.len(), 1);
		let trace = &traces[0];
		assert_eq!(trace.matched, vec!["value".to_string()]);
		assert_eq!(trace.mismatched.len(), 1);
		assert_eq!(trace.mismatched[0].field, "name");
		assert_eq!(trace.extra, vec!["extra".to_string()]);
	}

	#[tokio::test]
	async fn scorer_without_expected_fields_is_unscored() {
		let scorer = StructuredOutputScorer::strict();
		let args = ScoreArgs::new("input", r#"{"name": "test"}"#);
		let score = scorer.score(&args).await.unwrap();
		assert_eq!(score.value, None);
	}

	#[tokio::test]
	async fn scorer_reads_raw_output_from_args() {
		let scorer = StructuredOutputScorer::strict();
		let args = ScoreArgs::new("input", r#"{"name": "test"}"#)
			.with_expected([("name", json!("test"))]);
		let score = scorer.score(&args).await.unwrap();
		assert_eq!(score.value, Some(1.0));
	}
}

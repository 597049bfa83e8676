use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabled::Tabled;

/// A tool invocation recorded while the task under evaluation ran.
///
/// Matching only looks at `name` and `arguments`; everything else is carried
/// through untouched so provider-specific payloads survive a round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
	pub name: String,
	#[serde(default)]
	pub arguments: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub call_type: Option<String>,
	#[serde(flatten)]
	pub provider_fields: Map<String, Value>,
}

impl ToolCall {
	pub fn new(name: impl Into<String>, arguments: Value) -> Self {
		Self {
			name: name.into(),
			arguments,
			result: None,
			status: None,
			id: None,
			call_type: None,
			provider_fields: Map::new(),
		}
	}

	/// A call with an empty argument object.
	pub fn named(name: impl Into<String>) -> Self {
		Self::new(name, Value::Object(Map::new()))
	}
}

/// Normalized scorer verdict.
///
/// `value` is in `[0, 1]` when present. `None` means the scorer had nothing
/// to grade, which is distinct from 0.0 ("graded, and it is zero").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
	pub name: String,
	pub value: Option<f64>,
	pub metadata: ScoreMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreMetadata {
	pub rationale: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub matched: Option<usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total: Option<usize>,
	/// Raw task output, kept when it is needed to diagnose the verdict.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Score {
	pub fn new(name: impl Into<String>, value: f64, rationale: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: Some(value),
			metadata: ScoreMetadata { rationale: rationale.into(), ..Default::default() },
		}
	}

	/// A verdict with no score computed, e.g. a scorer invoked without the
	/// expectations it grades.
	pub fn unscored(name: impl Into<String>, rationale: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: None,
			metadata: ScoreMetadata { rationale: rationale.into(), ..Default::default() },
		}
	}

	pub fn with_counts(mut self, matched: usize, total: usize) -> Self {
		self.metadata.matched = Some(matched);
		self.metadata.total = Some(total);
		self
	}

	pub fn with_output(mut self, output: impl Into<String>) -> Self {
		self.metadata.output = Some(output.into());
		self
	}
}

/// Combined verdict over several scorers, against an external threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
	pub avg_score: f64,
	pub pass: bool,
}

#[derive(Tabled)]
struct SummaryRow {
	scorer: String,
	score: String,
	rationale: String,
}

impl Aggregate {
	pub fn summary_table(&self, scores: &[Score]) -> String {
		use tabled::Table;
		let rows: Vec<SummaryRow> = scores
			.iter()
			.map(|s| SummaryRow {
				scorer: s.name.clone(),
				score: s.value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}")),
				rationale: truncate(s.metadata.rationale.clone(), 64),
			})
			.collect();

		let table = Table::new(rows);
		let summary_text = format!(
			"Avg score: {:.3}  Pass: {}",
			self.avg_score,
			if self.pass { "✓" } else { "✗" }
		);

		format!("{}\n\n{}\n", table, summary_text)
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.len() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn tool_call_round_trips_provider_fields() {
		let raw = json!({
			"name": "search",
			"arguments": {"query": "weather"},
			"id": "call_1",
			"provider": "acme",
			"latency_ms": 12
		});
		let call: ToolCall = serde_json::from_value(raw.clone()).unwrap();
		assert_eq!(call.name, "search");
		assert_eq!(call.provider_fields.get("provider"), Some(&json!("acme")));

		let back = serde_json::to_value(&call).unwrap();
		assert_eq!(back, raw);
	}

	#[test]
	fn unscored_is_distinct_from_zero() {
		let zero = Score::new("tool_calls", 0.0, "nothing matched");
		let none = Score::unscored("tool_calls", "no expectations");
		assert_eq!(zero.value, Some(0.0));
		assert_eq!(none.value, None);
	}

	#[test]
	fn summary_table_lists_every_scorer() {
		let scores = vec![
			Score::new("tool_calls", 1.0, "all matched"),
			Score::unscored("structured_output", "no expected fields configured"),
		];
		let agg = Aggregate { avg_score: 1.0, pass: true };
		let table = agg.summary_table(&scores);
		assert!(table.contains("tool_calls"));
		assert!(table.contains("structured_output"));
		assert!(table.contains("1.000"));
		assert!(table.contains("Avg score: 1.000"));
	}

	#[test]
	fn truncate_appends_ellipsis() {
		let long = "x".repeat(100);
		let out = truncate(long, 10);
		assert_eq!(out.chars().count(), 10);
		assert!(out.ends_with('…'));
	}
}

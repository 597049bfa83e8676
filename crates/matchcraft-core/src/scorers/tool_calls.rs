use anyhow::Result;
use async_trait::async_trait;

use matchcraft_types::{Score, ToolCall};

use crate::compare::{compare, Expected, FuzzyOptions, Strategy};
use crate::error::ConfigError;
use crate::scorer::{ScoreArgs, Scorer};

const SCORER_NAME: &str = "tool_calls";

/// Declared expectation for one tool invocation. Absent `arguments` means
/// presence of the named call is enough.
#[derive(Debug, Clone)]
pub struct ExpectedToolCall {
	pub name: String,
	pub arguments: Option<Expected>,
}

impl ExpectedToolCall {
	pub fn named(name: impl Into<String>) -> Self {
		Self { name: name.into(), arguments: None }
	}

	pub fn with_arguments(name: impl Into<String>, arguments: impl Into<Expected>) -> Self {
		Self { name: name.into(), arguments: Some(arguments.into()) }
	}
}

/// How expected and actual call lists are reconciled.
///
/// `ordered` selects the algorithm (sequential scan vs. greedy multiset
/// reconciliation); `require_all`/`allow_extras` decide whether missing and
/// extra calls are tolerated, independently of ordering.
#[derive(Debug, Clone)]
pub struct ToolMatchConfig {
	pub ordered: bool,
	pub require_all: bool,
	pub allow_extras: bool,
	/// Applies to arguments only; names compare by exact equality.
	pub strategy: Strategy,
}

impl Default for ToolMatchConfig {
	fn default() -> Self {
		Self {
			ordered: false,
			require_all: true,
			allow_extras: true,
			strategy: Strategy::Fuzzy(FuzzyOptions::for_tool_calls()),
		}
	}
}

/// Scores an expected list of tool invocations against the calls a task
/// actually made.
pub struct ToolCallScorer {
	config: ToolMatchConfig,
}

impl ToolCallScorer {
	pub fn new(config: ToolMatchConfig) -> Result<Self, ConfigError> {
		config.strategy.validate()?;
		Ok(Self { config })
	}

	/// Default configuration: unordered, every expected call required,
	/// extra calls tolerated, fuzzy argument comparison.
	pub fn unordered() -> Self {
		Self { config: ToolMatchConfig::default() }
	}

	pub fn ordered() -> Self {
		Self { config: ToolMatchConfig { ordered: true, ..Default::default() } }
	}
}

#[async_trait]
impl Scorer for ToolCallScorer {
	fn name(&self) -> &'static str {
		SCORER_NAME
	}

	async fn score(&self, args: &ScoreArgs) -> Result<Score> {
		let Some(expected) = &args.expected_tools else {
			return Ok(Score::unscored(SCORER_NAME, "no expected tool calls configured"));
		};
		let actual = args.tool_calls.as_deref().unwrap_or(&[]);
		match_tool_calls(expected, actual, &self.config)
	}
}

/// Reconcile expected tool calls against actual ones, producing a score and
/// a rationale. Inputs are never mutated.
pub fn match_tool_calls(
	expected: &[ExpectedToolCall],
	actual: &[ToolCall],
	config: &ToolMatchConfig,
) -> Result<Score> {
	if expected.is_empty() {
		// Unexpected tool use is not penalized when none was required.
		return Ok(Score::new(SCORER_NAME, 1.0, "no tool calls expected"));
	}
	if actual.is_empty() {
		return Ok(Score::new(
			SCORER_NAME,
			0.0,
			format!("expected {} tool call(s), got none", expected.len()),
		)
		.with_counts(0, expected.len()));
	}
	if config.ordered {
		match_ordered(expected, actual, config)
	} else {
		match_unordered(expected, actual, config)
	}
}

/// Single left-to-right cursor over the actual calls. Linear scan, not full
/// sequence alignment: tool-call sequences are expected to be near-exact.
fn match_ordered(
	expected: &[ExpectedToolCall],
	actual: &[ToolCall],
	config: &ToolMatchConfig,
) -> Result<Score> {
	let total = expected.len();
	let mut cursor = 0usize;
	let mut extras: Vec<&str> = Vec::new();

	for call in actual {
		if cursor == total {
			extras.push(&call.name);
			continue;
		}
		let want = &expected[cursor];
		if call.name == want.name {
			if let Some(args) = &want.arguments {
				if !compare(args, &call.arguments, &config.strategy)? {
					// Credit for how far the sequence got before arguments
					// diverged.
					return Ok(Score::new(
						SCORER_NAME,
						cursor as f64 / total as f64,
						format!(
							"arguments mismatch for \"{}\" at position {}: expected {}, got {}",
							want.name,
							cursor + 1,
							args,
							call.arguments
						),
					)
					.with_counts(cursor, total));
				}
			}
			cursor += 1;
		} else if config.allow_extras {
			extras.push(&call.name);
		} else {
			return Ok(Score::new(
				SCORER_NAME,
				0.0,
				format!(
					"unexpected call \"{}\" while waiting for \"{}\"",
					call.name, want.name
				),
			)
			.with_counts(cursor, total));
		}
	}

	if cursor < total {
		let missing: Vec<&str> = expected[cursor..].iter().map(|e| e.name.as_str()).collect();
		if config.require_all {
			return Ok(Score::new(
				SCORER_NAME,
				0.0,
				format!("missing expected call(s): {}", missing.join(", ")),
			)
			.with_counts(cursor, total));
		}
		return Ok(Score::new(
			SCORER_NAME,
			cursor as f64 / total as f64,
			format!(
				"{}/{} expected call(s) matched; missing: {}",
				cursor,
				total,
				missing.join(", ")
			),
		)
		.with_counts(cursor, total));
	}

	if !config.allow_extras && !extras.is_empty() {
		return Ok(Score::new(
			SCORER_NAME,
			0.0,
			format!("unexpected extra call(s): {}", extras.join(", ")),
		)
		.with_counts(total, total));
	}

	let mut rationale = format!("all {} expected tool call(s) matched in order", total);
	if !extras.is_empty() {
		rationale.push_str(&format!(
			" ({} extra call(s): {})",
			extras.len(),
			extras.join(", ")
		));
	}
	Ok(Score::new(SCORER_NAME, 1.0, rationale).with_counts(total, total))
}

/// Multiset reconciliation: each expected call consumes the first unconsumed
/// actual call that satisfies it. Greedy in expected-then-actual scan order,
/// O(n·m) worst case.
fn match_unordered(
	expected: &[ExpectedToolCall],
	actual: &[ToolCall],
	config: &ToolMatchConfig,
) -> Result<Score> {
	let total = expected.len();
	let mut consumed = vec![false; actual.len()];
	let mut matched = 0usize;
	let mut issues: Vec<String> = Vec::new();

	for want in expected {
		let mut same_name_seen = false;
		let mut hit = None;
		for (i, call) in actual.iter().enumerate() {
			if consumed[i] || call.name != want.name {
				continue;
			}
			same_name_seen = true;
			let ok = match &want.arguments {
				Some(args) => compare(args, &call.arguments, &config.strategy)?,
				None => true,
			};
			if ok {
				hit = Some(i);
				break;
			}
		}
		match hit {
			Some(i) => {
				consumed[i] = true;
				matched += 1;
			}
			None if same_name_seen => {
				issues.push(format!("\"{}\" called with wrong arguments", want.name));
			}
			None => {
				let mut issue = format!("\"{}\" not called", want.name);
				if let Some(close) = nearest_name(&want.name, actual) {
					issue.push_str(&format!(" (closest actual call: \"{close}\")"));
				}
				issues.push(issue);
			}
		}
	}

	let extras: Vec<&str> = actual
		.iter()
		.zip(&consumed)
		.filter(|(_, used)| !**used)
		.map(|(call, _)| call.name.as_str())
		.collect();

	if !config.allow_extras && !extras.is_empty() {
		issues.push(format!("unexpected extra call(s): {}", extras.join(", ")));
	}

	let hard_fail = (!config.allow_extras && !extras.is_empty())
		|| (config.require_all && matched < total);
	if hard_fail {
		return Ok(Score::new(SCORER_NAME, 0.0, issues.join("; ")).with_counts(matched, total));
	}

	if matched == total {
		let mut rationale = format!("all {} expected tool call(s) matched", total);
		if !extras.is_empty() {
			rationale.push_str(&format!(
				" ({} extra call(s): {})",
				extras.len(),
				extras.join(", ")
			));
		}
		return Ok(Score::new(SCORER_NAME, 1.0, rationale).with_counts(matched, total));
	}

	Ok(Score::new(SCORER_NAME, matched as f64 / total as f64, issues.join("; "))
		.with_counts(matched, total))
}

/// A near-miss hint for "not called" issues: the closest actual call name,
/// when its edit distance is at most half the expected name's length.
fn nearest_name<'a>(want: &str, actual: &'a [ToolCall]) -> Option<&'a str> {
	actual
		.iter()
		.map(|call| call.name.as_str())
		.min_by_key(|name| strsim::levenshtein(want, name))
		.filter(|name| strsim::levenshtein(want, name) * 2 <= want.len())
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use serde_json::Value;

use crate::error::{ConfigError, MatchError};

/// Caller-supplied validator, called with the actual value.
pub type Predicate = Arc<dyn Fn(&Value) -> Result<bool> + Send + Sync>;

/// Caller-supplied comparison replacing the built-in strategies wholesale.
pub type CompareFn = Arc<dyn Fn(&Expected, &Value) -> Result<bool> + Send + Sync>;

/// Declared expectation for a single value.
///
/// Mirrors the JSON data model with two extra leaves: `Pattern` tests a
/// string actual against a regex, `Predicate` delegates to a caller-supplied
/// validator. Both carry explicit matching intent, so they are honored under
/// every strategy.
#[derive(Clone)]
pub enum Expected {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	List(Vec<Expected>),
	Map(BTreeMap<String, Expected>),
	Pattern(Regex),
	Predicate(Predicate),
}

impl Expected {
	/// Compile `pattern` into a `Pattern` expectation.
	pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
		Ok(Expected::Pattern(Regex::new(pattern)?))
	}

	pub fn predicate<F>(f: F) -> Self
	where
		F: Fn(&Value) -> Result<bool> + Send + Sync + 'static,
	{
		Expected::Predicate(Arc::new(f))
	}

	/// JSON rendering for traces and rationales. `Pattern` and `Predicate`
	/// become descriptive strings.
	pub fn to_value(&self) -> Value {
		match self {
			Expected::Null => Value::Null,
			Expected::Bool(b) => Value::Bool(*b),
			Expected::Number(n) => serde_json::Number::from_f64(*n)
				.map_or(Value::Null, Value::Number),
			Expected::String(s) => Value::String(s.clone()),
			Expected::List(items) => Value::Array(items.iter().map(Expected::to_value).collect()),
			Expected::Map(fields) => Value::Object(
				fields.iter().map(|(k, v)| (k.clone(), v.to_value())).collect(),
			),
			Expected::Pattern(re) => Value::String(format!("/{}/", re.as_str())),
			Expected::Predicate(_) => Value::String("<predicate>".to_string()),
		}
	}
}

impl From<Value> for Expected {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => Expected::Null,
			Value::Bool(b) => Expected::Bool(b),
			Value::Number(n) => Expected::Number(n.as_f64().unwrap_or(f64::NAN)),
			Value::String(s) => Expected::String(s),
			Value::Array(items) => Expected::List(items.into_iter().map(Expected::from).collect()),
			Value::Object(fields) => Expected::Map(
				fields.into_iter().map(|(k, v)| (k, Expected::from(v))).collect(),
			),
		}
	}
}

impl From<&str> for Expected {
	fn from(s: &str) -> Self {
		Expected::String(s.to_string())
	}
}

impl fmt::Display for Expected {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Expected::Null => write!(f, "null"),
			Expected::Bool(b) => write!(f, "{b}"),
			Expected::Number(n) => write!(f, "{n}"),
			Expected::String(s) => write!(f, "{s:?}"),
			Expected::List(items) => {
				write!(f, "[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{item}")?;
				}
				write!(f, "]")
			}
			Expected::Map(fields) => {
				write!(f, "{{")?;
				for (i, (k, v)) in fields.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{k:?}: {v}")?;
				}
				write!(f, "}}")
			}
			Expected::Pattern(re) => write!(f, "/{}/", re.as_str()),
			Expected::Predicate(_) => write!(f, "<predicate>"),
		}
	}
}

impl fmt::Debug for Expected {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 0.001;

/// Knobs for tolerant comparison. Immutable per invocation.
#[derive(Debug, Clone)]
pub struct FuzzyOptions {
	pub case_insensitive: bool,
	/// Strings match when either contains the other, both directions.
	pub substring_allowed: bool,
	/// Relative-or-absolute hybrid: numbers match when
	/// `|e - a| <= max(|e| * tolerance, tolerance)`, boundary inclusive.
	pub numeric_tolerance: f64,
	/// Greedy first-fit reconciliation for arrays. Not globally optimal:
	/// ambiguous overlapping matches can report a false negative. Known
	/// limitation; exhaustive matching would be exponential.
	pub ignore_array_order: bool,
	/// Bool vs `"true"`/`"1"` strings, numeric string vs number.
	pub allow_type_coercion: bool,
}

impl Default for FuzzyOptions {
	fn default() -> Self {
		Self {
			case_insensitive: false,
			substring_allowed: false,
			numeric_tolerance: DEFAULT_NUMERIC_TOLERANCE,
			ignore_array_order: false,
			allow_type_coercion: false,
		}
	}
}

impl FuzzyOptions {
	/// Defaults used by the tool-call matcher: argument text compares
	/// loosely and argument arrays are treated as unordered.
	pub fn for_tool_calls() -> Self {
		Self {
			case_insensitive: true,
			substring_allowed: true,
			ignore_array_order: true,
			..Self::default()
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.numeric_tolerance.is_finite() || self.numeric_tolerance < 0.0 {
			return Err(ConfigError::InvalidTolerance(self.numeric_tolerance));
		}
		Ok(())
	}
}

/// How an expectation is compared against an actual value.
#[derive(Clone)]
pub enum Strategy {
	Strict,
	Fuzzy(FuzzyOptions),
	Custom(CompareFn),
}

impl Strategy {
	pub fn fuzzy() -> Self {
		Strategy::Fuzzy(FuzzyOptions::default())
	}

	pub fn custom<F>(f: F) -> Self
	where
		F: Fn(&Expected, &Value) -> Result<bool> + Send + Sync + 'static,
	{
		Strategy::Custom(Arc::new(f))
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		match self {
			Strategy::Fuzzy(opts) => opts.validate(),
			_ => Ok(()),
		}
	}
}

impl fmt::Debug for Strategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Strategy::Strict => write!(f, "Strict"),
			Strategy::Fuzzy(opts) => f.debug_tuple("Fuzzy").field(opts).finish(),
			Strategy::Custom(_) => write!(f, "Custom(..)"),
		}
	}
}

/// Compare a declared expectation against an actual value.
///
/// Returns a single boolean, not a score; graded results come from the
/// matchers that aggregate many of these comparisons. The only error source
/// is a caller-supplied predicate or custom comparison.
pub fn compare(expected: &Expected, actual: &Value, strategy: &Strategy) -> Result<bool, MatchError> {
	match strategy {
		Strategy::Strict => compare_strict(expected, actual),
		Strategy::Fuzzy(opts) => compare_fuzzy(expected, actual, opts),
		Strategy::Custom(f) => f(expected, actual).map_err(MatchError::Predicate),
	}
}

fn compare_strict(expected: &Expected, actual: &Value) -> Result<bool, MatchError> {
	// Null on either side never reaches the per-type rules.
	if matches!(expected, Expected::Null) || actual.is_null() {
		return Ok(matches!(expected, Expected::Null) && actual.is_null());
	}
	match expected {
		Expected::Null => Ok(false),
		Expected::Bool(e) => Ok(actual.as_bool() == Some(*e)),
		Expected::Number(e) => Ok(actual.as_f64().map_or(false, |a| a == *e)),
		Expected::String(e) => Ok(actual.as_str() == Some(e.as_str())),
		Expected::List(items) => {
			let Some(arr) = actual.as_array() else {
				return Ok(false);
			};
			if arr.len() != items.len() {
				return Ok(false);
			}
			for (e, a) in items.iter().zip(arr) {
				if !compare_strict(e, a)? {
					return Ok(false);
				}
			}
			Ok(true)
		}
		Expected::Map(fields) => {
			let Some(obj) = actual.as_object() else {
				return Ok(false);
			};
			// Exactly the same key set on both sides.
			if obj.len() != fields.len() {
				return Ok(false);
			}
			for (k, e) in fields {
				let Some(a) = obj.get(k) else {
					return Ok(false);
				};
				if !compare_strict(e, a)? {
					return Ok(false);
				}
			}
			Ok(true)
		}
		Expected::Pattern(re) => Ok(actual.as_str().map_or(false, |s| re.is_match(s))),
		Expected::Predicate(f) => f(actual).map_err(MatchError::Predicate),
	}
}

fn compare_fuzzy(expected: &Expected, actual: &Value, opts: &FuzzyOptions) -> Result<bool, MatchError> {
	if matches!(expected, Expected::Null) || actual.is_null() {
		return Ok(matches!(expected, Expected::Null) && actual.is_null());
	}
	match expected {
		Expected::Null => Ok(false),
		Expected::Pattern(re) => Ok(actual.as_str().map_or(false, |s| re.is_match(s))),
		Expected::Predicate(f) => f(actual).map_err(MatchError::Predicate),
		Expected::String(e) => match actual {
			Value::String(a) => Ok(strings_match(e, a, opts)),
			Value::Number(a) if opts.allow_type_coercion => Ok(parse_number(e)
				.map_or(false, |e| numbers_match(e, a.as_f64().unwrap_or(f64::NAN), opts))),
			_ => Ok(false),
		},
		Expected::Number(e) => match actual {
			Value::Number(a) => Ok(numbers_match(*e, a.as_f64().unwrap_or(f64::NAN), opts)),
			Value::String(a) if opts.allow_type_coercion => {
				Ok(parse_number(a).map_or(false, |a| numbers_match(*e, a, opts)))
			}
			_ => Ok(false),
		},
		Expected::Bool(e) => match actual {
			Value::Bool(a) => Ok(e == a),
			Value::String(a) if opts.allow_type_coercion => Ok(*e == (a == "true" || a == "1")),
			_ => Ok(false),
		},
		Expected::List(items) => {
			let Some(arr) = actual.as_array() else {
				return Ok(false);
			};
			if arr.len() != items.len() {
				return Ok(false);
			}
			if opts.ignore_array_order {
				// Each expected element consumes the first unconsumed actual
				// element it matches; no actual element satisfies two
				// expected elements.
				let mut consumed = vec![false; arr.len()];
				'expected: for e in items {
					for (i, a) in arr.iter().enumerate() {
						if !consumed[i] && compare_fuzzy(e, a, opts)? {
							consumed[i] = true;
							continue 'expected;
						}
					}
					return Ok(false);
				}
				Ok(true)
			} else {
				for (e, a) in items.iter().zip(arr) {
					if !compare_fuzzy(e, a, opts)? {
						return Ok(false);
					}
				}
				Ok(true)
			}
		}
		Expected::Map(fields) => {
			// Subset semantics: every expected key must match, actual may
			// carry keys the expectation never mentions.
			let Some(obj) = actual.as_object() else {
				return Ok(false);
			};
			for (k, e) in fields {
				let Some(a) = obj.get(k) else {
					return Ok(false);
				};
				if !compare_fuzzy(e, a, opts)? {
					return Ok(false);
				}
			}
			Ok(true)
		}
	}
}

fn strings_match(expected: &str, actual: &str, opts: &FuzzyOptions) -> bool {
	let (e, a) = if opts.case_insensitive {
		(expected.to_lowercase(), actual.to_lowercase())
	} else {
		(expected.to_string(), actual.to_string())
	};
	if e == a {
		return true;
	}
	opts.substring_allowed && (a.contains(&e) || e.contains(&a))
}

fn numbers_match(expected: f64, actual: f64, opts: &FuzzyOptions) -> bool {
	let tolerance = (expected.abs() * opts.numeric_tolerance).max(opts.numeric_tolerance);
	(expected - actual).abs() <= tolerance
}

fn parse_number(s: &str) -> Option<f64> {
	s.trim().parse::<f64>().ok()
}

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use futures::future::try_join_all;

use matchcraft_types::{Aggregate, Score};

use crate::scorer::{ScoreArgs, Scorer};

/// Run every scorer against the same evaluation, concurrently. Scorers are
/// independent and read-only over `args`, so fan-out is safe; the first
/// scorer error (a user-predicate bug) aborts the batch.
pub async fn score_all(scorers: &[Arc<dyn Scorer>], args: &ScoreArgs) -> Result<Vec<Score>> {
    try_join_all(scorers.iter().map(|scorer| scorer.score(args))).await
}

/// Combine scorer outputs into a single pass/fail decision against
/// `threshold`. Unscored entries (`value: None`) are excluded from the
/// average; with nothing scored the average is 0.0.
pub fn aggregate(scores: &[Score], threshold: f64) -> Aggregate {
    let values: Vec<f64> = scores.iter().filter_map(|s| s.value).collect();
    let avg_score = if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    };
    Aggregate { avg_score, pass: avg_score >= threshold }
}

const WRAP_COLUMN: usize = 80;

/// Render rationales for humans: one labeled block per scorer, worst score
/// first so failures are the most visible, unscored entries last. Text is
/// word-wrapped for terminal and XML readability.
pub fn format_rationale(scores: &[Score]) -> String {
    let mut ordered: Vec<&Score> = scores.iter().collect();
    ordered.sort_by(|a, b| match (a.value, b.value) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mut blocks = Vec::with_capacity(ordered.len());
    for score in ordered {
        let label = match score.value {
            Some(v) => format!("{} ({v:.3})", score.name),
            None => format!("{} (unscored)", score.name),
        };
        let mut block = format!("{label}\n{}", wrap_indented(&score.metadata.rationale, "  "));
        if let Some(raw) = &score.metadata.output {
            block.push_str("\n  output:\n");
            block.push_str(&wrap_indented(raw, "    "));
        }
        blocks.push(block);
    }
    blocks.join("\n\n")
}

/// Greedy word wrap at `WRAP_COLUMN`, preserving existing line breaks.
fn wrap_indented(text: &str, indent: &str) -> String {
    let width = WRAP_COLUMN.saturating_sub(indent.len());
    let mut lines = Vec::new();
    for input_line in text.lines() {
        let mut line = String::new();
        for word in input_line.split_whitespace() {
            if line.is_empty() {
                line.push_str(word);
            } else if line.len() + 1 + word.len() <= width {
                line.push(' ');
                line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut line));
                line.push_str(word);
            }
        }
        lines.push(line);
    }
    lines
        .iter()
        .map(|l| format!("{indent}{l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

use std::sync::Arc;

use matchcraft_core::{
    aggregate, format_rationale, score_all, ExpectedToolCall, ScoreArgs, Scorer,
    StructuredOutputScorer, ToolCall, ToolCallScorer,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pretend a task answered a weather question: it called two tools and
    // produced a JSON answer.
    let args = ScoreArgs::new(
        "What's the weather in Tokyo?",
        r#"{"city": "Tokyo", "temperature_c": 21.4}"#,
    )
    .with_expected_tools(vec![
        ExpectedToolCall::with_arguments("search", json!({"query": "tokyo"})),
        ExpectedToolCall::named("weather_api"),
    ])
    .with_tool_calls(vec![
        ToolCall::new("search", json!({"query": "Tokyo weather"})),
        ToolCall::new("weather_api", json!({"city": "Tokyo"})),
        ToolCall::named("format_answer"),
    ])
    .with_expected([
        ("city", json!("Tokyo")),
        ("temperature_c", json!(21.0)),
    ]);

    let scorers: Vec<Arc<dyn Scorer>> = vec![
        Arc::new(ToolCallScorer::unordered()),
        Arc::new(StructuredOutputScorer::fuzzy().require_all(false)),
    ];

    let scores = score_all(&scorers, &args).await?;
    let verdict = aggregate(&scores, 0.7);

    println!("{}", verdict.summary_table(&scores));
    println!("{}", format_rationale(&scores));
    println!("pass: {}", verdict.pass);

    Ok(())
}

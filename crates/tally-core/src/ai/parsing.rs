//! Structured parsing of model completions
//!
//! Completions are parsed as data with serde_json and checked against the
//! expected shape. Surrounding whitespace and a single Markdown code fence are
//! tolerated; any other text makes the response malformed.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{CategoryTotals, SpendingAnalysis, SAVINGS_STRATEGIES};

/// Longest slice of raw model output quoted in error messages
const RAW_EXCERPT_CHARS: usize = 200;

/// A parsed completion
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredPayload {
    /// Category name to numeric total
    Categories(CategoryTotals),
    /// Object with `advice` and `savings_matrix`
    Analysis(SpendingAnalysis),
}

/// Extract `choices[0].message.content` from a provider payload
pub fn completion_text(payload: &Value) -> Result<&str> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::MalformedResponse("Provider payload has no choices[0].message.content".into())
        })
}

/// Parse a completion into one of the expected structured shapes
pub fn parse_structured(text: &str) -> Result<StructuredPayload> {
    let value = parse_json(text)?;

    let is_analysis = value
        .as_object()
        .is_some_and(|map| map.contains_key("advice") || map.contains_key("savings_matrix"));

    match value {
        Value::Object(_) if is_analysis => from_value(value, text)
            .and_then(|analysis| validate_analysis(analysis, text))
            .map(StructuredPayload::Analysis),
        Value::Object(_) => from_value(value, text).map(StructuredPayload::Categories),
        other => Err(Error::MalformedResponse(format!(
            "Expected a JSON object, got {} | Raw: {}",
            json_kind(&other),
            excerpt(text)
        ))),
    }
}

/// Parse a completion that must be a category-to-total mapping
pub fn parse_categories(text: &str) -> Result<CategoryTotals> {
    match parse_structured(text)? {
        StructuredPayload::Categories(categories) => Ok(categories),
        StructuredPayload::Analysis(_) => Err(Error::MalformedResponse(
            "Expected category totals, got an advice object".into(),
        )),
    }
}

/// Parse a completion that must be an advice/savings-matrix object
pub fn parse_analysis(text: &str) -> Result<SpendingAnalysis> {
    match parse_structured(text)? {
        StructuredPayload::Analysis(analysis) => Ok(analysis),
        StructuredPayload::Categories(_) => Err(Error::MalformedResponse(
            "Expected an object with advice and savings_matrix keys".into(),
        )),
    }
}

fn parse_json(text: &str) -> Result<Value> {
    let body = strip_code_fence(text.trim());
    serde_json::from_str(body).map_err(|e| {
        Error::MalformedResponse(format!("Invalid JSON from AI: {} | Raw: {}", e, excerpt(text)))
    })
}

fn from_value<T: DeserializeOwned>(value: Value, raw: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        Error::MalformedResponse(format!(
            "Unexpected JSON shape from AI: {} | Raw: {}",
            e,
            excerpt(raw)
        ))
    })
}

/// Remove one surrounding ```` ``` ```` / ```` ```json ```` fence, if present
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line
    match inner.find('\n') {
        Some(newline) if !inner[..newline].contains('{') => inner[newline + 1..].trim(),
        Some(_) => inner.trim(),
        // Single-line fence: ```json{"a": 1}```
        None => inner.trim_start_matches(|c: char| c.is_ascii_alphabetic()).trim(),
    }
}

/// Non-empty advice and exactly the conservative/moderate/aggressive rows
fn validate_analysis(analysis: SpendingAnalysis, raw: &str) -> Result<SpendingAnalysis> {
    if analysis.advice.trim().is_empty() {
        return Err(Error::MalformedResponse(format!(
            "Analysis has empty advice | Raw: {}",
            excerpt(raw)
        )));
    }

    let missing: Vec<&str> = SAVINGS_STRATEGIES
        .iter()
        .copied()
        .filter(|name| !analysis.savings_matrix.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(Error::MalformedResponse(format!(
            "Savings matrix is missing {} | Raw: {}",
            missing.join(", "),
            excerpt(raw)
        )));
    }

    if let Some(unknown) = analysis
        .savings_matrix
        .keys()
        .find(|name| !SAVINGS_STRATEGIES.contains(&name.as_str()))
    {
        return Err(Error::MalformedResponse(format!(
            "Unknown savings strategy '{}' | Raw: {}",
            unknown,
            excerpt(raw)
        )));
    }

    Ok(analysis)
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

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() > RAW_EXCERPT_CHARS {
        let cut: String = text.chars().take(RAW_EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

//! External service capabilities
//!
//! The executor never talks to a model directly. Text completion and plan
//! generation are injected as trait objects so callers can plug in an HTTP
//! client, and tests can plug in deterministic fakes.

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::plan::Plan;

/// Completes a single prompt with text
pub trait TextCompleter: Send + Sync {
    /// Send one prompt and return the raw completion
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<F> TextCompleter for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn complete(&self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}

/// Turns an analysis prompt into an operation plan
pub trait PlanGenerator {
    /// Generate and validate a plan
    fn generate_plan(&self, prompt: &str) -> Result<Plan>;
}

/// A completer for contexts with no model configured
///
/// Every call fails, so text analysis marks each row as an error instead of
/// aborting the plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCompleter;

impl TextCompleter for UnavailableCompleter {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::external("no text completion service configured"))
    }
}

/// Extract the JSON object from raw model output
///
/// Models often wrap JSON in Markdown fences or add a sentence before and
/// after it. Everything outside the first `{` and the last `}` is dropped.
pub fn extract_json_object(raw: &str) -> Result<&str> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(&raw[start..=end]),
        _ => Err(Error::InvalidPlanJson(format!(
            "no JSON object in model output: {}",
            preview(raw)
        ))),
    }
}

/// Parse raw model output into a validated plan
///
/// Text that is not JSON fails with `InvalidPlanJson`; JSON of the wrong
/// shape fails with `InvalidPlan`.
pub fn parse_plan_text(raw: &str) -> Result<Plan> {
    let json: JsonValue = serde_json::from_str(extract_json_object(raw)?)
        .map_err(|e| Error::InvalidPlanJson(format!("{e}: {}", preview(raw))))?;
    Plan::from_json(&json)
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 120;
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

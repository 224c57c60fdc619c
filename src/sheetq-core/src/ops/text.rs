//! Free-text analysis
//!
//! One completion call per row. A row whose call fails, or whose response
//! cannot be interpreted, gets the [`TEXT_ANALYSIS_ERROR`] marker; the other
//! rows are unaffected. Rows are independent, so they may be fanned out
//! over the rayon pool when the executor allows it.

use log::{debug, warn};
use rayon::prelude::*;
use sheetq_shared::constants::TEXT_ANALYSIS_ERROR;
use sheetq_shared::{Table, Value};

use super::{require_column, HandlerContext, OperationHandler, Step};
use crate::error::Result;
use crate::plan::{TextAnalysisOp, TextTask};
use crate::services::TextCompleter;

const SENTIMENT_LABELS: [&str; 3] = ["Positive", "Negative", "Neutral"];

impl TextTask {
    /// Prompt sent to the completion service for one row
    #[must_use]
    pub fn prompt(&self, text: &str) -> String {
        match self {
            TextTask::SentimentAnalysis => format!(
                "Classify the sentiment of the following text. \
                 Answer with exactly one word: Positive, Negative, or Neutral.\n\n\
                 Text: \"{text}\""
            ),
            TextTask::TextSummary => format!(
                "Summarize the following text in one short sentence. \
                 Answer with the summary only.\n\nText: \"{text}\""
            ),
        }
    }

    /// Turn a raw completion into a cell value, `None` if it is unusable
    #[must_use]
    pub fn interpret(&self, response: &str) -> Option<String> {
        let response = response.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if response.is_empty() {
            return None;
        }
        match self {
            TextTask::SentimentAnalysis => {
                // The label mentioned first wins: "Negative, not positive"
                let lowered = response.to_ascii_lowercase();
                SENTIMENT_LABELS
                    .iter()
                    .filter_map(|label| {
                        lowered
                            .find(&label.to_ascii_lowercase())
                            .map(|at| (at, *label))
                    })
                    .min_by_key(|(at, _)| *at)
                    .map(|(_, label)| label.to_string())
            }
            TextTask::TextSummary => Some(response.to_string()),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TextTask::SentimentAnalysis => "sentiment_analysis",
            TextTask::TextSummary => "text_summary",
        }
    }
}

enum RowResult {
    Skipped,
    Done(String),
    Failed(String),
}

fn analyse_cell(task: TextTask, cell: &Value, completer: &dyn TextCompleter) -> RowResult {
    let text = match cell {
        Value::Null => return RowResult::Skipped,
        Value::String(s) if s.trim().is_empty() => return RowResult::Skipped,
        other => other.to_string(),
    };
    match completer.complete(&task.prompt(&text)) {
        Ok(response) => match task.interpret(&response) {
            Some(label) => RowResult::Done(label),
            None => RowResult::Failed(format!("unusable response {response:?}")),
        },
        Err(e) => RowResult::Failed(e.to_string()),
    }
}

impl OperationHandler for TextAnalysisOp {
    fn apply(&self, mut input: Table, ctx: &HandlerContext<'_>) -> Result<Step> {
        require_column(&input, &self.source_column, "TextAnalysis")?;
        let cells = input
            .column_values(&self.source_column)
            .unwrap_or_default();
        let task = self.operation;
        let completer = ctx.completer;

        let results: Vec<RowResult> = if ctx.options.parallel_text_analysis {
            cells
                .par_iter()
                .map(|cell| analyse_cell(task, cell, completer))
                .collect()
        } else {
            cells
                .iter()
                .map(|cell| analyse_cell(task, cell, completer))
                .collect()
        };

        let mut failures = 0usize;
        let values = results
            .into_iter()
            .enumerate()
            .map(|(row, result)| match result {
                RowResult::Skipped => Value::Null,
                RowResult::Done(label) => Value::String(label),
                RowResult::Failed(reason) => {
                    warn!(
                        "{} failed for row {row} of '{}': {reason}",
                        task.as_str(),
                        self.source_column
                    );
                    failures += 1;
                    Value::string(TEXT_ANALYSIS_ERROR)
                }
            })
            .collect();

        input.with_column(self.new_column.clone(), values)?;
        debug!(
            "{} wrote '{}' with {failures} failed row(s)",
            task.as_str(),
            self.new_column
        );

        let mut step = Step::table(input);
        if failures > 0 {
            step = step.with_warning(format!(
                "{} failed for {failures} row(s) of '{}'; marked {TEXT_ANALYSIS_ERROR}",
                task.as_str(),
                self.source_column
            ));
        }
        Ok(step)
    }

    fn description(&self) -> String {
        format!(
            "{} of {} into {}",
            self.operation.as_str(),
            self.source_column,
            self.new_column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::executor::ExecutorOptions;
    use crate::ops::test_support::into_table;
    use crate::store::TabularStore;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn feedback() -> Table {
        Table::from_columns(vec![(
            "Feedback",
            vec![
                "Great team, love it".into(),
                "Terrible commute".into(),
                Value::Null,
                "  ".into(),
                "It is fine".into(),
            ],
        )])
        .unwrap()
    }

    fn sentiment() -> TextAnalysisOp {
        TextAnalysisOp {
            operation: TextTask::SentimentAnalysis,
            source_column: "Feedback".to_string(),
            new_column: "Sentiment".to_string(),
        }
    }

    fn fake(prompt: &str) -> Result<String> {
        if prompt.contains("Terrible") {
            Err(Error::external("service unavailable"))
        } else if prompt.contains("Great") {
            Ok(" positive.\n".to_string())
        } else {
            Ok("Neutral".to_string())
        }
    }

    fn run(options: &ExecutorOptions, completer: &dyn TextCompleter) -> Step {
        let store = TabularStore::new();
        let ctx = HandlerContext {
            store: &store,
            completer,
            options,
        };
        sentiment().apply(feedback(), &ctx).unwrap()
    }

    #[test]
    fn test_failures_are_isolated_per_row() {
        let step = run(&ExecutorOptions::default(), &fake);
        assert_eq!(step.warnings.len(), 1);
        let output = into_table(step);
        assert_eq!(
            output.column_values("Sentiment").unwrap(),
            vec![
                Value::string("Positive"),
                Value::string(TEXT_ANALYSIS_ERROR),
                Value::Null,
                Value::Null,
                Value::string("Neutral"),
            ]
        );
    }

    #[test]
    fn test_blank_rows_make_no_calls() {
        let calls = AtomicUsize::new(0);
        let counting = |_: &str| -> Result<String> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("Neutral".to_string())
        };
        let step = run(&ExecutorOptions::default(), &counting);
        assert!(step.warnings.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = into_table(run(&ExecutorOptions::default(), &fake));
        let options = ExecutorOptions {
            parallel_text_analysis: true,
            ..ExecutorOptions::default()
        };
        let parallel = into_table(run(&options, &fake));
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_unusable_sentiment_is_marked() {
        let rambling = |_: &str| -> Result<String> { Ok("I cannot tell".to_string()) };
        let output = into_table(run(&ExecutorOptions::default(), &rambling));
        assert_eq!(
            output.cell("Sentiment", 0),
            Some(Value::string(TEXT_ANALYSIS_ERROR))
        );
    }

    #[test]
    fn test_first_mentioned_label_wins() {
        let task = TextTask::SentimentAnalysis;
        assert_eq!(
            task.interpret("Negative - the customer is not positive about it"),
            Some("Negative".to_string())
        );
        assert_eq!(
            task.interpret("Neutral, neither positive nor negative"),
            Some("Neutral".to_string())
        );
        assert_eq!(task.interpret("'POSITIVE'"), Some("Positive".to_string()));
    }

    #[test]
    fn test_summary_is_trimmed() {
        assert_eq!(
            TextTask::TextSummary.interpret("  \"Short and sweet.\"\n"),
            Some("Short and sweet.".to_string())
        );
        assert_eq!(TextTask::TextSummary.interpret("   "), None);
        assert!(TextTask::TextSummary.prompt("abc").contains("\"abc\""));
    }
}

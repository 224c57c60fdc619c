//! Prompt construction
//!
//! Builds the text sent to the plan generator: fixed guidelines describing
//! the plan format and every operation kind, followed by the workbook schema
//! and the user's question.

use crate::schema::Schema;

/// Instructions describing the plan format to the model
pub const PLAN_GUIDELINES: &str = r#"You turn questions about spreadsheet data into a JSON operation plan.
Rules:
- Reply with the JSON plan only, without explanations.
- The plan is an object with "target_sheet" (the sheet to start from) and
  "operations" (an array executed in order). Always include "target_sheet".
- Use column and sheet names exactly as listed in the schema.
- Compare numbers with numbers and text with text.

Operations:

1. FILTER keeps rows matching every condition.
   Operators: ==, !=, >, <, >=, <=
   {"target_sheet": "Employees", "operations": [
     {"type": "FILTER", "conditions": [
       {"column": "Department", "operator": "==", "value": "IT"},
       {"column": "Salary", "operator": ">", "value": 50000}]}]}

2. AGGREGATE computes summary numbers and ends the plan.
   Functions: average, sum, min, max, count
   {"target_sheet": "Employees", "operations": [
     {"type": "AGGREGATE", "aggregations": [
       {"column": "Salary", "function": "average"},
       {"column": "Age", "function": "max"}]}]}

3. MATH adds a column computed from another column and a number or column.
   Operators: +, -, *, /
   {"target_sheet": "Employees", "operations": [
     {"type": "MATH", "new_column": "Bonus",
      "expression": {"col1": "Salary", "operator": "*", "value": 0.1}}]}

4. DATE_OP extracts part of a date into a new column.
   Operations: extract_month, extract_year, extract_day
   {"target_sheet": "Employees", "operations": [
     {"type": "DATE_OP", "new_column": "JoiningYear",
      "source_column": "JoiningDate", "operation": "extract_year"}]}

5. PIVOT builds a pivot table.
   Functions: average, sum, min, max, count
   {"target_sheet": "Employees", "operations": [
     {"type": "PIVOT", "index": "Department", "columns": "Location",
      "values": "Salary", "agg_func": "average"}]}

6. JOIN combines two sheets on a shared column.
   Join types: inner, left, right, outer
   {"target_sheet": "Employees", "operations": [
     {"type": "JOIN", "left_sheet": "Employees", "right_sheet": "Sales",
      "join_type": "inner", "on_column": "EmployeeID"}]}

7. UNSTRUCTURED_OP analyses free text row by row into a new column.
   Operations: sentiment_analysis, text_summary
   {"target_sheet": "Feedback", "operations": [
     {"type": "UNSTRUCTURED_OP", "operation": "sentiment_analysis",
      "source_column": "CustomerFeedback", "new_column": "Sentiment"}]}
"#;

/// Render the workbook schema as `Sheet:`/`Columns:` blocks
#[must_use]
pub fn format_schema(schema: &Schema) -> String {
    let mut out = String::new();
    for (sheet, columns) in schema {
        let columns: Vec<String> = columns.iter().map(|c| format!("'{c}'")).collect();
        out.push_str(&format!("Sheet: {sheet}\nColumns: [{}]\n\n", columns.join(", ")));
    }
    out
}

/// Build the full plan-generation prompt
#[must_use]
pub fn build_analysis_prompt(schema: &Schema, query: &str) -> String {
    format!(
        "{PLAN_GUIDELINES}\n---\nWorkbook schema:\n{}---\nQuestion:\n\"{}\"\n\nJSON plan:\n",
        format_schema(schema),
        query.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        [
            (
                "Employees".to_string(),
                vec!["Name".to_string(), "Salary".to_string()],
            ),
            ("Feedback".to_string(), vec!["Comment".to_string()]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_schema_blocks_keep_sheet_order() {
        let text = format_schema(&schema());
        assert_eq!(
            text,
            "Sheet: Employees\nColumns: ['Name', 'Salary']\n\nSheet: Feedback\nColumns: ['Comment']\n\n"
        );
    }

    #[test]
    fn test_prompt_contains_guidelines_schema_and_query() {
        let prompt = build_analysis_prompt(&schema(), "  average salary in IT?  ");
        assert!(prompt.starts_with(PLAN_GUIDELINES));
        assert!(prompt.contains("Sheet: Feedback"));
        assert!(prompt.contains("\"average salary in IT?\""));
        assert!(prompt.trim_end().ends_with("JSON plan:"));
    }

    #[test]
    fn test_guidelines_cover_every_operation() {
        for kind in [
            "FILTER",
            "AGGREGATE",
            "MATH",
            "DATE_OP",
            "PIVOT",
            "JOIN",
            "UNSTRUCTURED_OP",
        ] {
            assert!(PLAN_GUIDELINES.contains(&format!("\"type\": \"{kind}\"")), "{kind}");
        }
        assert!(PLAN_GUIDELINES.contains("target_sheet"));
    }
}

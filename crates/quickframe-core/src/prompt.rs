//! Prompt construction for the analysis agent.

use quickframe_types::Dataset;

const INSTRUCTIONS: &str = r#"You are a data analysis assistant. Use the Python tool to run pandas code against the dataset, then return the final result strictly in one of these JSON formats:

Steps:
1. Understand the user's question
2. Write pandas code to analyse the data
3. Format the result as the JSON described below

Output formats:
- Text answer: {"answer": "concise answer"}
- Table: {"table": {"columns": ["col1", "col2"], "data": [["v1", "v2"], ["v3", "v4"]]}}
- Bar chart: {"bar": {"columns": ["category1", "category2"], "data": [number1, number2]}}
- Line chart: {"line": {"columns": ["time1", "time2"], "data": [number1, number2]}}

Rules:
- Strings use double quotes, numbers are not quoted
- The JSON must be valid with no syntax errors
- The final answer must be the JSON result only
"#;

/// Build the full agent prompt: output instructions, dataset summary, then the question.
pub fn build_prompt(dataset: &Dataset, question: &str) -> String {
    format!(
        "{}\nDataset: {} rows, {} columns. Columns: {}. Numeric columns: {}. Text columns: {}.\nQuestion: {}",
        INSTRUCTIONS,
        dataset.row_count(),
        dataset.columns.len(),
        list_or_none(&dataset.column_names()),
        list_or_none(&dataset.numeric_columns()),
        list_or_none(&dataset.text_columns()),
        question.trim(),
    )
}

fn list_or_none(names: &[&str]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

//! Step 4: the specification table, requirement text per matrix row.

use serde::Serialize;

use crate::aggregate::{self, MatrixFooter};
use crate::domain::{ExamConfig, MatrixRow, SpecEntry};

/// Exact unit-name join, no normalization.
pub fn requirement_for<'a>(entries: &'a [SpecEntry], unit: &str) -> Option<&'a str> {
  entries.iter().find(|e| e.unit == unit).map(|e| e.requirements.as_str())
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecRowView {
  pub row: MatrixRow,
  /// Rows this topic cell spans, on the first row of each topic run only.
  pub topic_span: Option<usize>,
  pub requirements: String,
  pub found: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecView {
  pub rows: Vec<SpecRowView>,
  pub totals: MatrixFooter,
  pub generating: bool,
}

pub fn view(rows: &[MatrixRow], entries: &[SpecEntry], cfg: &ExamConfig, placeholder: &str, generating: bool) -> SpecView {
  let spans = aggregate::topic_spans(rows);
  let rows_view = rows
    .iter()
    .zip(spans)
    .map(|(row, topic_span)| {
      let found = requirement_for(entries, &row.unit);
      SpecRowView {
        row: row.clone(),
        topic_span,
        requirements: found.unwrap_or(placeholder).to_string(),
        found: found.is_some(),
      }
    })
    .collect();
  SpecView { rows: rows_view, totals: aggregate::footer(rows, cfg), generating }
}

//! Step 3: the allocation matrix, one row per selected lesson.
//!
//! Every mutation (initial build, suggestion merge, single-cell edit, rescoring
//! after a config change) leaves each row's derived totals consistent with its
//! cells.

use serde::Serialize;
use tracing::debug;

use crate::agent::UnitSuggestion;
use crate::aggregate::{self, MatrixFooter, TypeScores};
use crate::domain::{bounded_count, CognitiveLevel, ExamConfig, Lesson, MatrixRow, QuestionType};
use crate::error::WizardError;

#[derive(Clone, Debug, Default)]
pub struct MatrixGrid {
  rows: Vec<MatrixRow>,
  /// Selected lesson ids the rows were built from.
  built_from: Option<Vec<String>>,
  pub suggest_in_flight: bool,
}

impl MatrixGrid {
  pub fn rows(&self) -> &[MatrixRow] {
    &self.rows
  }

  /// Build zeroed rows for the selected lessons, sorted by topic then week.
  /// Returns false (and keeps existing rows and edits) when the selected set is
  /// the same one the grid was last built from.
  pub fn initialize(&mut self, lessons: &[Lesson]) -> bool {
    let mut selected: Vec<&Lesson> = lessons.iter().filter(|l| l.selected).collect();
    let ids: Vec<String> = selected.iter().map(|l| l.id.clone()).collect();
    if self.built_from.as_ref() == Some(&ids) {
      return false;
    }
    selected.sort_by(|a, b| a.topic.cmp(&b.topic).then(a.week.cmp(&b.week)));
    self.rows = selected.iter().map(|l| MatrixRow::empty(&l.id, &l.topic, &l.name)).collect();
    self.built_from = Some(ids);
    true
  }

  /// Merge suggested counts into matching rows; see `find_suggestion` for the
  /// matching policy. Returns the number of rows that matched.
  pub fn merge_suggestions(&mut self, suggestions: &[UnitSuggestion], scores: &TypeScores) -> usize {
    let mut matched = 0;
    for row in self.rows.iter_mut() {
      let Some(s) = find_suggestion(&row.unit, suggestions) else {
        debug!(target: "wizard", unit = %row.unit, "No suggestion for unit; keeping counts");
        continue;
      };
      for ty in QuestionType::ALL {
        *row.cells_mut(ty) = *s.cells(ty);
      }
      aggregate::recompute(row, scores);
      matched += 1;
    }
    matched
  }

  /// Set one cell. Negative, fractional or non-finite input is clamped to an
  /// integer in `0..=MAX_CELL_COUNT`.
  pub fn edit_cell(
    &mut self,
    row_id: &str,
    ty: QuestionType,
    level: CognitiveLevel,
    value: f64,
    scores: &TypeScores,
  ) -> Result<&MatrixRow, WizardError> {
    let row = self
      .rows
      .iter_mut()
      .find(|r| r.id == row_id)
      .ok_or_else(|| WizardError::NotFound(format!("dòng ma trận {row_id}")))?;
    row.cells_mut(ty).set(level, clamp_count(value));
    aggregate::recompute(row, scores);
    Ok(&*row)
  }

  /// Scores changed in the configuration; refresh every row's derived fields.
  pub fn rescore(&mut self, scores: &TypeScores) {
    for row in self.rows.iter_mut() {
      aggregate::recompute(row, scores);
    }
  }

  pub fn has_allocation(&self) -> bool {
    self.rows.iter().any(|r| r.cell_total() > 0)
  }
}

fn clamp_count(value: f64) -> u32 {
  bounded_count(value.floor())
}

/// Matching policy for suggestion merge, evaluated over suggestions in the order
/// the service returned them; the first hit wins. With both names lowercased
/// (and trimmed for equality), a suggestion matches a row when
///   - the names are equal, or
///   - the row's unit contains the suggestion's unit, or
///   - the suggestion's unit contains the row's unit.
/// Suggestions with a blank unit never match.
pub fn find_suggestion<'a>(unit: &str, suggestions: &'a [UnitSuggestion]) -> Option<&'a UnitSuggestion> {
  let row = unit.to_lowercase();
  let row_trim = row.trim();
  suggestions.iter().find(|s| {
    let sug = s.unit.to_lowercase();
    let sug_trim = sug.trim();
    if sug_trim.is_empty() {
      return false;
    }
    sug_trim == row_trim || row.contains(sug_trim) || sug.contains(row_trim)
  })
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixView {
  pub rows: Vec<MatrixRow>,
  pub topic_spans: Vec<Option<usize>>,
  pub footer: MatrixFooter,
  pub generating: bool,
  pub can_continue: bool,
}

pub fn view(grid: &MatrixGrid, cfg: &ExamConfig) -> MatrixView {
  MatrixView {
    rows: grid.rows.clone(),
    topic_spans: aggregate::topic_spans(&grid.rows),
    footer: aggregate::footer(&grid.rows, cfg),
    generating: grid.suggest_in_flight,
    can_continue: grid.has_allocation() && !grid.suggest_in_flight,
  }
}

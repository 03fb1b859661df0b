//! Step 5: question drafting.
//!
//! Units are drafted one after the other. Each unit walks
//! `PENDING -> LOADING -> DONE | FAILED`; a failed unit contributes no questions
//! and the batch moves on. The loop itself lives in `logic::run_drafting` so the
//! session lock can be released around every model call; this module holds the
//! state transitions.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::ExamAgent;
use crate::domain::{ExamConfig, MatrixRow, Question, SpecEntry};
use crate::error::{AgentError, WizardError};
use crate::util::splice_at_caret;

use super::spec::requirement_for;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
  Pending,
  Loading,
  Done,
  Failed,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnitProgress {
  pub row_id: String,
  pub unit: String,
  pub status: UnitStatus,
  pub produced: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DraftingState {
  pub questions: Vec<Question>,
  pub units: Vec<UnitProgress>,
  pub in_flight: bool,
}

/// Rows with at least one allocated question, in matrix order.
pub fn units_to_process(rows: &[MatrixRow]) -> Vec<MatrixRow> {
  rows.iter().filter(|r| r.cell_total() > 0).cloned().collect()
}

impl DraftingState {
  /// Start a full pass: clears the accumulated list and marks every unit
  /// pending. Returns the rows to draft, in order.
  pub fn begin(&mut self, rows: &[MatrixRow]) -> Result<Vec<MatrixRow>, WizardError> {
    if self.in_flight {
      return Err(WizardError::Busy("soạn câu hỏi"));
    }
    let todo = units_to_process(rows);
    if todo.is_empty() {
      return Err(WizardError::Validation("Ma trận chưa phân bổ câu hỏi cho bài nào".into()));
    }
    self.questions.clear();
    self.units = todo
      .iter()
      .map(|r| UnitProgress { row_id: r.id.clone(), unit: r.unit.clone(), status: UnitStatus::Pending, produced: 0, error: None })
      .collect();
    self.in_flight = true;
    Ok(todo)
  }

  fn unit_mut(&mut self, row_id: &str) -> Option<&mut UnitProgress> {
    self.units.iter_mut().find(|u| u.row_id == row_id)
  }

  pub fn mark_loading(&mut self, row_id: &str) -> Option<UnitProgress> {
    let u = self.unit_mut(row_id)?;
    u.status = UnitStatus::Loading;
    Some(u.clone())
  }

  /// Record one unit's outcome. Successful questions are appended after
  /// everything drafted so far.
  pub fn finish_unit(&mut self, row_id: &str, outcome: Result<Vec<Question>, AgentError>) -> Option<UnitProgress> {
    let (status, produced, error) = match outcome {
      Ok(questions) => {
        let n = questions.len();
        self.questions.extend(questions);
        (UnitStatus::Done, n, None)
      }
      Err(e) => (UnitStatus::Failed, 0, Some(e.to_string())),
    };
    let u = self.unit_mut(row_id)?;
    u.status = status;
    u.produced = produced;
    u.error = error;
    Some(u.clone())
  }

  pub fn end(&mut self) {
    self.in_flight = false;
  }

  pub fn edit_content(&mut self, question_id: &str, content: String) -> Result<&Question, WizardError> {
    let q = self.find_mut(question_id)?;
    q.content = content;
    Ok(&*q)
  }

  /// Insert `$tex$` over the selection `[start, end)` (char offsets) of a
  /// question's content. Returns the updated question and the caret position
  /// just after the inserted markup.
  pub fn insert_symbol(&mut self, question_id: &str, start: usize, end: usize, tex: &str) -> Result<(&Question, usize), WizardError> {
    let q = self.find_mut(question_id)?;
    let markup = format!("${tex}$");
    let (content, caret) = splice_at_caret(&q.content, start, end, &markup);
    q.content = content;
    Ok((&*q, caret))
  }

  fn find_mut(&mut self, question_id: &str) -> Result<&mut Question, WizardError> {
    self
      .questions
      .iter_mut()
      .find(|q| q.id == question_id)
      .ok_or_else(|| WizardError::NotFound(format!("câu hỏi {question_id}")))
  }
}

/// Draft one unit. Questions are pinned to the row's unit and get fresh ids,
/// whatever the service echoed back.
pub async fn draft_unit(
  agent: &dyn ExamAgent,
  row: &MatrixRow,
  specs: &[SpecEntry],
  cfg: &ExamConfig,
  fallback: &str,
) -> Result<Vec<Question>, AgentError> {
  let spec = requirement_for(specs, &row.unit).unwrap_or(fallback);
  match agent.draft_questions(row, spec, cfg).await {
    Ok(mut questions) => {
      for q in questions.iter_mut() {
        q.unit = row.unit.clone();
        q.id = Uuid::new_v4().to_string();
      }
      info!(target: "wizard", unit = %row.unit, produced = questions.len(), "Unit drafted");
      Ok(questions)
    }
    Err(e) => {
      warn!(target: "wizard", unit = %row.unit, error = %e, "Unit drafting failed; continuing with next unit");
      Err(e)
    }
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftingView {
  pub questions: Vec<Question>,
  pub units: Vec<UnitProgress>,
  pub generating: bool,
  pub can_continue: bool,
}

pub fn view(state: &DraftingState) -> DraftingView {
  DraftingView {
    questions: state.questions.clone(),
    units: state.units.clone(),
    generating: state.in_flight,
    can_continue: !state.questions.is_empty() && !state.in_flight,
  }
}

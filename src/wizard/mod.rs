//! The wizard as an explicit state object.
//!
//! A `WizardSession` owns the current step and every accumulated output
//! (lessons, config, matrix, specification, questions). Stage operations are
//! methods returning `Result`; a step can only be entered once its
//! prerequisite output exists.

pub mod drafting;
pub mod lessons;
pub mod matrix;
pub mod render;
pub mod setup;
pub mod spec;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::TypeScores;
use crate::config::WizardSettings;
use crate::domain::{ExamConfig, Lesson, Role, SpecEntry};
use crate::error::WizardError;

use self::drafting::DraftingState;
use self::lessons::{LessonSelection, SetupMeta};
use self::matrix::MatrixGrid;
use self::setup::ConfigPatch;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
  Setup,
  Config,
  Matrix,
  Specification,
  Exam,
  Preview,
}

impl Step {
  pub const ALL: [Step; 6] = [Step::Setup, Step::Config, Step::Matrix, Step::Specification, Step::Exam, Step::Preview];
}

pub struct WizardSession {
  pub id: String,
  pub username: String,
  pub role: Role,
  pub step: Step,
  pub meta: SetupMeta,
  pub lessons: LessonSelection,
  pub config: ExamConfig,
  pub matrix: MatrixGrid,
  pub spec: Vec<SpecEntry>,
  pub spec_in_flight: bool,
  pub analyzing: bool,
  pub drafting: DraftingState,
  pub settings: Arc<WizardSettings>,
  setup_complete: bool,
  config_complete: bool,
}

impl WizardSession {
  pub fn new(id: String, username: String, role: Role, defaults: ExamConfig, settings: Arc<WizardSettings>) -> Self {
    Self {
      id,
      username,
      role,
      step: Step::Setup,
      meta: SetupMeta::default(),
      lessons: LessonSelection::default(),
      config: defaults,
      matrix: MatrixGrid::default(),
      spec: Vec::new(),
      spec_in_flight: false,
      analyzing: false,
      drafting: DraftingState::default(),
      settings,
      setup_complete: false,
      config_complete: false,
    }
  }

  pub fn scores(&self) -> TypeScores {
    TypeScores::from_config(&self.config)
  }

  /// Why `step` itself is locked, ignoring the steps before it.
  fn own_lock_reason(&self, step: Step) -> Option<&'static str> {
    match step {
      Step::Setup => None,
      Step::Config if !self.setup_complete => Some("chưa chọn bài học và thông tin môn học"),
      Step::Matrix if !self.config_complete => Some("chưa hoàn tất cấu hình đề"),
      Step::Specification if !self.matrix.has_allocation() => Some("ma trận chưa có câu hỏi nào"),
      Step::Exam if self.spec.is_empty() => Some("chưa có bản đặc tả"),
      Step::Preview if self.drafting.questions.is_empty() => Some("chưa có câu hỏi nào"),
      Step::Preview if self.drafting.in_flight => Some("đang soạn câu hỏi"),
      _ => None,
    }
  }

  /// `Ok` when `step` may be entered, otherwise the reason it is locked.
  /// A step is only open while every step before it is open too.
  pub fn check_unlocked(&self, step: Step) -> Result<(), WizardError> {
    let reason = Step::ALL
      .into_iter()
      .take_while(|s| *s != step)
      .chain(std::iter::once(step))
      .find_map(|s| self.own_lock_reason(s));
    match reason {
      Some(reason) => Err(WizardError::StepLocked { step, reason: reason.to_string() }),
      None => Ok(()),
    }
  }

  pub fn unlocked_steps(&self) -> Vec<Step> {
    Step::ALL.into_iter().filter(|s| self.check_unlocked(*s).is_ok()).collect()
  }

  pub fn goto(&mut self, step: Step) -> Result<Step, WizardError> {
    self.check_unlocked(step)?;
    self.step = step;
    info!(target: "wizard", session = %self.id, step = ?step, "Step entered");
    Ok(step)
  }

  /// Lessons changed: everything derived from the old selection is stale.
  /// Setup and config have to be confirmed again, the specification is
  /// dropped, and the matrix is rebuilt on the next config completion.
  fn invalidate_setup(&mut self) {
    self.setup_complete = false;
    self.config_complete = false;
    self.spec.clear();
    if self.step != Step::Setup {
      info!(target: "wizard", session = %self.id, from = ?self.step, "Lessons changed, back to setup");
      self.step = Step::Setup;
    }
  }

  pub fn replace_lessons(&mut self, lessons: Vec<Lesson>) {
    self.lessons.replace(lessons);
    self.invalidate_setup();
  }

  pub fn toggle_lesson(&mut self, lesson_id: &str) -> Result<bool, WizardError> {
    let selected = self.lessons.toggle(lesson_id)?;
    self.invalidate_setup();
    Ok(selected)
  }

  pub fn clear_lessons(&mut self) {
    self.lessons.clear();
    self.invalidate_setup();
  }

  pub fn complete_setup(&mut self, meta: SetupMeta) -> Result<Step, WizardError> {
    if !self.lessons.can_continue(&meta) {
      return Err(WizardError::Validation(
        "Cần chọn ít nhất một bài học và nhập đủ môn, khối lớp, kỳ kiểm tra".into(),
      ));
    }
    self.config.subject = meta.subject.clone();
    self.config.grade = meta.grade.clone();
    self.config.exam_type = meta.exam_type.clone();
    self.config.exam_name = meta.default_exam_name();
    self.meta = meta;
    self.setup_complete = true;
    self.goto(Step::Config)
  }

  pub fn patch_config(&mut self, patch: ConfigPatch) -> Result<(), WizardError> {
    patch.apply(&mut self.config, self.role)?;
    let scores = self.scores();
    self.matrix.rescore(&scores);
    Ok(())
  }

  pub fn attach_requirements(&mut self, text: String) {
    self.config.requirements_text = if text.trim().is_empty() { None } else { Some(text) };
  }

  pub fn requirements(&self) -> &str {
    self.config.requirements_text.as_deref().unwrap_or("")
  }

  pub fn complete_config(&mut self) -> Result<Step, WizardError> {
    let issues = setup::blocking_issues(&self.config, &self.settings);
    if let Some(first) = issues.into_iter().next() {
      return Err(WizardError::Validation(first));
    }
    self.config_complete = true;
    if self.matrix.initialize(self.lessons.all()) {
      info!(target: "wizard", session = %self.id, rows = self.matrix.rows().len(), "Matrix initialized");
    }
    self.goto(Step::Matrix)
  }

  pub fn complete_matrix(&mut self) -> Result<Step, WizardError> {
    if self.matrix.suggest_in_flight {
      return Err(WizardError::Busy("gợi ý ma trận"));
    }
    self.goto(Step::Specification)
  }

  pub fn complete_spec(&mut self) -> Result<Step, WizardError> {
    if self.spec_in_flight {
      return Err(WizardError::Busy("đặc tả"));
    }
    self.goto(Step::Exam)
  }

  pub fn complete_questions(&mut self) -> Result<Step, WizardError> {
    self.goto(Step::Preview)
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    SessionSnapshot {
      id: self.id.clone(),
      username: self.username.clone(),
      role: self.role,
      step: self.step,
      unlocked: self.unlocked_steps(),
      meta: self.meta.clone(),
      lessons: self.lessons.all().to_vec(),
      config: self.config.clone(),
      matrix_rows: self.matrix.rows().len(),
      spec_units: self.spec.len(),
      questions: self.drafting.questions.len(),
      busy: self.analyzing || self.matrix.suggest_in_flight || self.spec_in_flight || self.drafting.in_flight,
    }
  }
}

/// Session summary for the client's sidebar and header.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
  pub id: String,
  pub username: String,
  pub role: Role,
  pub step: Step,
  pub unlocked: Vec<Step>,
  pub meta: SetupMeta,
  pub lessons: Vec<Lesson>,
  pub config: ExamConfig,
  pub matrix_rows: usize,
  pub spec_units: usize,
  pub questions: usize,
  pub busy: bool,
}

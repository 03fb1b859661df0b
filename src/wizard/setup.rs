//! Step 2: exam configuration. Field-level patches, role gating and the live
//! score preview.

use serde::{Deserialize, Serialize};

use crate::aggregate::{score_split, ScoreSplit};
use crate::config::WizardSettings;
use crate::domain::{ExamConfig, Role};
use crate::error::WizardError;

/// Partial update of `ExamConfig`. Absent fields are left untouched.
/// The requirement corpus is attached through its own operation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
  pub subject: Option<String>,
  pub grade: Option<String>,
  pub exam_type: Option<String>,
  pub school_name: Option<String>,
  pub department: Option<String>,
  pub exam_name: Option<String>,
  pub school_year: Option<String>,
  pub duration: Option<String>,
  pub test_code: Option<String>,
  pub difficulty: Option<String>,
  pub mcq_count: Option<u32>,
  pub mcq_score: Option<f64>,
  pub tf_count: Option<u32>,
  pub tf_score: Option<f64>,
  pub short_count: Option<u32>,
  pub short_score: Option<f64>,
  pub essay_count: Option<u32>,
  pub essay_score: Option<f64>,
  pub percent_know: Option<u32>,
  pub percent_understand: Option<u32>,
  pub percent_apply: Option<u32>,
}

macro_rules! set_fields {
  ($patch:expr, $cfg:expr, $($field:ident),+ $(,)?) => {
    $( if let Some(v) = $patch.$field { $cfg.$field = v; } )+
  };
}

impl ConfigPatch {
  /// Fields a teacher may not change.
  fn restricted_fields(&self) -> Vec<&'static str> {
    let mut out = Vec::new();
    if self.school_name.is_some() { out.push("schoolName"); }
    if self.department.is_some() { out.push("department"); }
    if self.mcq_score.is_some() { out.push("mcqScore"); }
    if self.tf_score.is_some() { out.push("tfScore"); }
    if self.short_score.is_some() { out.push("shortScore"); }
    if self.essay_score.is_some() { out.push("essayScore"); }
    out
  }

  /// Apply all-or-nothing: a role violation leaves `cfg` untouched.
  pub fn apply(self, cfg: &mut ExamConfig, role: Role) -> Result<(), WizardError> {
    if role == Role::Teacher {
      if let Some(field) = self.restricted_fields().first().copied() {
        return Err(WizardError::Forbidden(field));
      }
    }
    for score in [self.mcq_score, self.tf_score, self.short_score, self.essay_score].into_iter().flatten() {
      if !score.is_finite() || score < 0.0 {
        return Err(WizardError::Validation(format!("Điểm mỗi câu không hợp lệ: {score}")));
      }
    }
    set_fields!(
      self, cfg,
      subject, grade, exam_type, school_name, department, exam_name, school_year, duration,
      test_code, difficulty, mcq_count, mcq_score, tf_count, tf_score, short_count, short_score,
      essay_count, essay_score, percent_know, percent_understand, percent_apply,
    );
    Ok(())
  }
}

/// Reasons the configuration step cannot be completed yet.
pub fn blocking_issues(cfg: &ExamConfig, settings: &WizardSettings) -> Vec<String> {
  let mut issues = Vec::new();
  if cfg.exam_name.trim().is_empty() {
    issues.push("Chưa nhập tên kỳ kiểm tra".to_string());
  }
  let has_corpus = cfg.requirements_text.as_deref().map_or(false, |t| !t.trim().is_empty());
  if settings.require_requirements_corpus && !has_corpus {
    issues.push("Chưa đính kèm file Phụ lục I (bắt buộc)".to_string());
  }
  issues
}

/// Soft checks. Shown to the user, never enforced.
pub fn warnings(cfg: &ExamConfig) -> Vec<String> {
  let mut out = Vec::new();
  let sum = cfg.percent_know + cfg.percent_understand + cfg.percent_apply;
  if sum != 100 {
    out.push(format!("Tổng tỷ lệ các mức độ là {sum}%, khác 100%"));
  }
  let split = score_split(cfg);
  if split.objective_score > 10.0 {
    out.push(format!("Tổng điểm trắc nghiệm {:.2} vượt quá 10", split.objective_score));
  }
  out
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
  pub config: ExamConfig,
  pub split: ScoreSplit,
  pub warnings: Vec<String>,
  pub issues: Vec<String>,
  pub role: Role,
}

pub fn view(cfg: &ExamConfig, settings: &WizardSettings, role: Role) -> ConfigView {
  ConfigView {
    config: cfg.clone(),
    split: score_split(cfg),
    warnings: warnings(cfg),
    issues: blocking_issues(cfg, settings),
    role,
  }
}

//! Domain models used by the wizard: lessons, exam configuration, the allocation
//! matrix, specification entries and drafted questions.

use serde::{Deserialize, Serialize};

/// One lesson extracted from the syllabus (Phụ lục III).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
  pub id: String,
  pub name: String,
  pub topic: String,
  pub week: u32,
  pub periods: u32,
  pub selected: bool,
}

/// Who is driving the wizard. Teachers may change question counts but not
/// scoring weights or the school identity printed on the document.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Admin,
  Teacher,
}

impl Default for Role {
  fn default() -> Self { Role::Teacher }
}

/// Exam metadata, scoring weights and target cognitive-level percentages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamConfig {
  pub subject: String,
  pub grade: String,
  pub exam_type: String,
  pub school_name: String,
  pub department: String,
  pub exam_name: String,
  pub school_year: String,
  pub duration: String,
  pub test_code: String,
  pub difficulty: String,
  pub mcq_count: u32,
  pub mcq_score: f64,
  pub tf_count: u32,
  pub tf_score: f64,
  pub short_count: u32,
  pub short_score: f64,
  pub essay_count: u32,
  pub essay_score: f64,
  pub percent_know: u32,
  pub percent_understand: u32,
  pub percent_apply: u32,
  /// Text of the attached requirement corpus (Phụ lục I), if any.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub requirements_text: Option<String>,
}

impl Default for ExamConfig {
  fn default() -> Self {
    Self {
      subject: String::new(),
      grade: String::new(),
      exam_type: String::new(),
      school_name: "THCS HUỲNH THÚC KHÁNG - HƯNG THỊNH".into(),
      department: "TỔ CHUYÊN MÔN".into(),
      exam_name: String::new(),
      school_year: "NĂM HỌC 2026 - 2027".into(),
      duration: "45 phút".into(),
      test_code: "301".into(),
      difficulty: "Trung bình".into(),
      mcq_count: 12,
      mcq_score: 0.25,
      tf_count: 2,
      tf_score: 1.0,
      short_count: 4,
      short_score: 0.25,
      essay_count: 1,
      essay_score: 1.0,
      percent_know: 40,
      percent_understand: 30,
      percent_apply: 30,
      requirements_text: None,
    }
  }
}

/// Question formats of the CV 7791 structure.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QuestionType {
  #[serde(rename = "MCQ", alias = "mcq")]
  Mcq,
  #[serde(rename = "TF", alias = "tf")]
  Tf,
  #[serde(rename = "SHORT", alias = "short")]
  Short,
  #[serde(rename = "ESSAY", alias = "essay")]
  Essay,
}

impl QuestionType {
  pub const ALL: [QuestionType; 4] = [QuestionType::Mcq, QuestionType::Tf, QuestionType::Short, QuestionType::Essay];

  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionType::Mcq => "MCQ",
      QuestionType::Tf => "TF",
      QuestionType::Short => "SHORT",
      QuestionType::Essay => "ESSAY",
    }
  }
}

/// Matrix column levels. "Vận dụng" and "vận dụng cao" share the application column.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveLevel {
  Recognition,
  Understanding,
  Application,
}

/// Level tag attached to a drafted question (NB / TH / VD / VDC).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuestionLevel {
  #[serde(rename = "NB")]
  Nb,
  #[serde(rename = "TH")]
  Th,
  #[serde(rename = "VD")]
  Vd,
  #[serde(rename = "VDC")]
  Vdc,
}

/// Upper bound for a single matrix cell, whether typed in or suggested.
pub const MAX_CELL_COUNT: u32 = 1000;

/// Clamp a raw count to `0..=MAX_CELL_COUNT`. Non-finite and negative values
/// count as zero.
pub fn bounded_count(value: f64) -> u32 {
  if value.is_finite() && value > 0.0 { value.min(MAX_CELL_COUNT as f64) as u32 } else { 0 }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LevelCounts {
  pub recognition: u32,
  pub understanding: u32,
  pub application: u32,
}

impl LevelCounts {
  pub fn sum(&self) -> u32 {
    self.recognition.saturating_add(self.understanding).saturating_add(self.application)
  }

  pub fn get(&self, level: CognitiveLevel) -> u32 {
    match level {
      CognitiveLevel::Recognition => self.recognition,
      CognitiveLevel::Understanding => self.understanding,
      CognitiveLevel::Application => self.application,
    }
  }

  pub fn set(&mut self, level: CognitiveLevel, value: u32) {
    match level {
      CognitiveLevel::Recognition => self.recognition = value,
      CognitiveLevel::Understanding => self.understanding = value,
      CognitiveLevel::Application => self.application = value,
    }
  }

  pub fn add(&mut self, other: &LevelCounts) {
    self.recognition = self.recognition.saturating_add(other.recognition);
    self.understanding = self.understanding.saturating_add(other.understanding);
    self.application = self.application.saturating_add(other.application);
  }
}

/// One matrix row per selected lesson. The `total_*` and `percentage` fields are
/// derived and kept in sync by `aggregate::recompute`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow {
  pub id: String,
  pub topic: String,
  pub unit: String,
  pub mcq: LevelCounts,
  pub tf: LevelCounts,
  pub short: LevelCounts,
  pub essay: LevelCounts,
  pub total_know: u32,
  pub total_understand: u32,
  pub total_apply: u32,
  pub percentage: f64,
}

impl MatrixRow {
  pub fn empty(id: &str, topic: &str, unit: &str) -> Self {
    Self {
      id: id.to_string(),
      topic: topic.to_string(),
      unit: unit.to_string(),
      mcq: LevelCounts::default(),
      tf: LevelCounts::default(),
      short: LevelCounts::default(),
      essay: LevelCounts::default(),
      total_know: 0,
      total_understand: 0,
      total_apply: 0,
      percentage: 0.0,
    }
  }

  pub fn cells(&self, ty: QuestionType) -> &LevelCounts {
    match ty {
      QuestionType::Mcq => &self.mcq,
      QuestionType::Tf => &self.tf,
      QuestionType::Short => &self.short,
      QuestionType::Essay => &self.essay,
    }
  }

  pub fn cells_mut(&mut self, ty: QuestionType) -> &mut LevelCounts {
    match ty {
      QuestionType::Mcq => &mut self.mcq,
      QuestionType::Tf => &mut self.tf,
      QuestionType::Short => &mut self.short,
      QuestionType::Essay => &mut self.essay,
    }
  }

  /// Sum of all twelve type/level cells.
  pub fn cell_total(&self) -> u32 {
    QuestionType::ALL.iter().map(|t| self.cells(*t).sum()).sum()
  }
}

/// Curriculum requirement text for one unit, joined to `MatrixRow` by unit name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpecEntry {
  pub unit: String,
  pub requirements: String,
}

/// Letter for MCQ, four booleans for TF, free text for SHORT/ESSAY.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Answer {
  Flags(Vec<bool>),
  Text(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub id: String,
  pub unit: String,
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub level: QuestionLevel,
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<String>>,
  pub answer: Answer,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
}

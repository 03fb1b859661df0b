//! Seam to the generative service, plus the validation boundary for its output.
//!
//! Model responses are parsed item by item into domain types. Anything that does
//! not fit the expected shape is dropped with a warning; a response that is not
//! JSON at all counts as "zero items".

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
  bounded_count, Answer, ExamConfig, Lesson, LevelCounts, MatrixRow, Question, QuestionLevel, QuestionType, SpecEntry,
};
use crate::error::AgentError;
use crate::util::{short_id, trunc_for_log};

/// Input of the lesson-extraction call.
#[derive(Clone, Debug)]
pub struct SyllabusInput<'a> {
  pub text: &'a str,
  pub subject: &'a str,
  pub grade: &'a str,
  pub exam_type: &'a str,
}

/// Per-unit allocation returned by the suggestion call.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSuggestion {
  pub unit: String,
  pub mcq: LevelCounts,
  pub tf: LevelCounts,
  pub short: LevelCounts,
  pub essay: LevelCounts,
}

impl UnitSuggestion {
  pub fn cells(&self, ty: QuestionType) -> &LevelCounts {
    match ty {
      QuestionType::Mcq => &self.mcq,
      QuestionType::Tf => &self.tf,
      QuestionType::Short => &self.short,
      QuestionType::Essay => &self.essay,
    }
  }
}

#[async_trait]
pub trait ExamAgent: Send + Sync {
  async fn extract_lessons(&self, input: SyllabusInput<'_>) -> Result<Vec<Lesson>, AgentError>;

  async fn suggest_matrix(
    &self,
    lessons: &[Lesson],
    cfg: &ExamConfig,
    requirements: &str,
  ) -> Result<Vec<UnitSuggestion>, AgentError>;

  async fn draft_specification(
    &self,
    rows: &[MatrixRow],
    cfg: &ExamConfig,
    requirements: &str,
  ) -> Result<Vec<SpecEntry>, AgentError>;

  async fn draft_questions(
    &self,
    row: &MatrixRow,
    spec: &str,
    cfg: &ExamConfig,
  ) -> Result<Vec<Question>, AgentError>;

  /// Human-readable description for startup logs.
  fn describe(&self) -> String;
}

// --- Response parsing ---

/// Locate the item array in a model reply. Accepts a bare array, an object with
/// the array under `key`, or an object whose first array-valued field is used.
pub fn extract_items(raw: &str, key: &str) -> Vec<Value> {
  let body = strip_fences(raw);
  let value: Value = match serde_json::from_str(body) {
    Ok(v) => v,
    Err(e) => {
      warn!(target: "examgen_backend", error = %e, preview = %trunc_for_log(body, 120), "Model reply is not JSON; treating as empty");
      return Vec::new();
    }
  };
  match value {
    Value::Array(items) => items,
    Value::Object(mut map) => match map.remove(key) {
      Some(Value::Array(items)) => items,
      _ => map
        .into_iter()
        .find_map(|(_, v)| match v { Value::Array(items) => Some(items), _ => None })
        .unwrap_or_else(|| {
          warn!(target: "examgen_backend", %key, "Model reply has no item array; treating as empty");
          Vec::new()
        }),
    },
    _ => Vec::new(),
  }
}

fn strip_fences(raw: &str) -> &str {
  let t = raw.trim();
  let t = t.strip_prefix("```json").or_else(|| t.strip_prefix("```")).unwrap_or(t);
  t.strip_suffix("```").unwrap_or(t).trim()
}

/// Non-negative integer from a JSON number or numeric string; anything else is 0.
fn count_of(v: Option<&Value>) -> u32 {
  let n = match v {
    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
    Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
    _ => 0.0,
  };
  bounded_count(n.round())
}

fn text_of(v: Option<&Value>) -> Option<String> {
  match v {
    Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Some(Value::Number(n)) => Some(n.to_string()),
    _ => None,
  }
}

fn levels_of(v: Option<&Value>) -> LevelCounts {
  LevelCounts {
    recognition: count_of(v.and_then(|o| o.get("recognition"))),
    understanding: count_of(v.and_then(|o| o.get("understanding"))),
    application: count_of(v.and_then(|o| o.get("application"))),
  }
}

/// Lessons get fresh ids and start selected.
pub fn parse_lessons(raw: &str) -> Vec<Lesson> {
  extract_items(raw, "lessons")
    .iter()
    .filter_map(|item| {
      let name = text_of(item.get("name"))?;
      Some(Lesson {
        id: short_id(),
        name,
        topic: text_of(item.get("topic")).unwrap_or_default(),
        week: count_of(item.get("week")),
        periods: count_of(item.get("periods")),
        selected: true,
      })
    })
    .collect()
}

pub fn parse_suggestions(raw: &str) -> Vec<UnitSuggestion> {
  extract_items(raw, "units")
    .iter()
    .filter_map(|item| {
      let unit = text_of(item.get("unit"))?;
      Some(UnitSuggestion {
        unit,
        mcq: levels_of(item.get("mcq")),
        tf: levels_of(item.get("tf")),
        short: levels_of(item.get("short")),
        essay: levels_of(item.get("essay")),
      })
    })
    .collect()
}

pub fn parse_specs(raw: &str) -> Vec<SpecEntry> {
  extract_items(raw, "specs")
    .iter()
    .filter_map(|item| {
      let requirements = match item.get("requirements") {
        Some(Value::Array(lines)) => lines.iter().filter_map(|l| l.as_str()).collect::<Vec<_>>().join("\n"),
        other => text_of(other)?,
      };
      Some(SpecEntry { unit: text_of(item.get("unit"))?, requirements })
    })
    .collect()
}

/// Questions are attributed to `unit` regardless of what the model echoed back.
pub fn parse_questions(raw: &str, unit: &str) -> Vec<Question> {
  let items = extract_items(raw, "questions");
  let total = items.len();
  let out: Vec<Question> = items.iter().filter_map(|item| question_from_value(item, unit)).collect();
  if out.len() < total {
    warn!(target: "examgen_backend", %unit, dropped = total - out.len(), kept = out.len(), "Dropped malformed questions");
  }
  out
}

fn question_from_value(item: &Value, unit: &str) -> Option<Question> {
  let kind = match item.get("type")?.as_str()?.trim().to_ascii_uppercase().as_str() {
    "MCQ" => QuestionType::Mcq,
    "TF" => QuestionType::Tf,
    "SHORT" => QuestionType::Short,
    "ESSAY" => QuestionType::Essay,
    _ => return None,
  };
  let level = match item.get("level")?.as_str()?.trim().to_ascii_uppercase().as_str() {
    "NB" => QuestionLevel::Nb,
    "TH" => QuestionLevel::Th,
    "VD" => QuestionLevel::Vd,
    "VDC" => QuestionLevel::Vdc,
    _ => return None,
  };
  let content = text_of(item.get("content"))?;

  let (options, answer) = match kind {
    QuestionType::Mcq => {
      let options: Vec<String> = item
        .get("options")?
        .as_array()?
        .iter()
        .filter_map(|o| o.as_str().map(|s| s.trim().to_string()))
        .collect();
      if options.len() != 4 {
        return None;
      }
      let letter = item.get("answer")?.as_str()?.trim().chars().next()?.to_ascii_uppercase();
      if !('A'..='D').contains(&letter) {
        return None;
      }
      (Some(options), Answer::Text(letter.to_string()))
    }
    QuestionType::Tf => {
      let flags: Vec<bool> = item.get("answer")?.as_array()?.iter().filter_map(Value::as_bool).collect();
      if flags.len() != 4 {
        return None;
      }
      (None, Answer::Flags(flags))
    }
    QuestionType::Short | QuestionType::Essay => (None, Answer::Text(text_of(item.get("answer"))?)),
  };

  Some(Question {
    id: Uuid::new_v4().to_string(),
    unit: unit.to_string(),
    kind,
    level,
    content,
    options,
    answer,
    explanation: text_of(item.get("explanation")),
  })
}

#[cfg(test)]
pub mod testing {
  //! Scripted in-memory agent for deterministic stage tests.

  use std::collections::HashMap;
  use std::sync::Mutex;
  use std::time::Duration;

  use super::*;

  #[derive(Default)]
  pub struct ScriptedAgent {
    pub lessons: Vec<Lesson>,
    pub suggestions: Vec<UnitSuggestion>,
    pub specs: Vec<SpecEntry>,
    pub questions: HashMap<String, Vec<Question>>,
    /// Units whose drafting call fails.
    pub failing_units: Vec<String>,
    /// When set, every call fails with this HTTP status.
    pub fail_status: Option<u16>,
    /// Simulated model latency, applied before every reply.
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
  }

  impl ScriptedAgent {
    async fn record(&self, call: String) -> Result<(), AgentError> {
      self.calls.lock().expect("calls lock").push(call);
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }
      match self.fail_status {
        Some(status) => Err(AgentError::from_status(status, "scripted failure".into())),
        None => Ok(()),
      }
    }

    pub fn calls(&self) -> Vec<String> {
      self.calls.lock().expect("calls lock").clone()
    }
  }

  pub fn question(unit: &str, kind: QuestionType, content: &str) -> Question {
    let (options, answer) = match kind {
      QuestionType::Mcq => (Some(vec!["a".into(), "b".into(), "c".into(), "d".into()]), Answer::Text("B".into())),
      QuestionType::Tf => (None, Answer::Flags(vec![true, false, true, false])),
      _ => (None, Answer::Text("đáp án".into())),
    };
    Question {
      id: Uuid::new_v4().to_string(),
      unit: unit.into(),
      kind,
      level: QuestionLevel::Nb,
      content: content.into(),
      options,
      answer,
      explanation: None,
    }
  }

  #[async_trait]
  impl ExamAgent for ScriptedAgent {
    async fn extract_lessons(&self, input: SyllabusInput<'_>) -> Result<Vec<Lesson>, AgentError> {
      self.record(format!("lessons:{}", input.subject)).await?;
      Ok(self.lessons.clone())
    }

    async fn suggest_matrix(&self, lessons: &[Lesson], _cfg: &ExamConfig, _req: &str) -> Result<Vec<UnitSuggestion>, AgentError> {
      self.record(format!("suggest:{}", lessons.len())).await?;
      Ok(self.suggestions.clone())
    }

    async fn draft_specification(&self, rows: &[MatrixRow], _cfg: &ExamConfig, _req: &str) -> Result<Vec<SpecEntry>, AgentError> {
      self.record(format!("spec:{}", rows.len())).await?;
      Ok(self.specs.clone())
    }

    async fn draft_questions(&self, row: &MatrixRow, _spec: &str, _cfg: &ExamConfig) -> Result<Vec<Question>, AgentError> {
      self.record(format!("questions:{}", row.unit)).await?;
      if self.failing_units.contains(&row.unit) {
        return Err(AgentError::Http { status: 500, message: format!("scripted failure for {}", row.unit) });
      }
      Ok(self.questions.get(&row.unit).cloned().unwrap_or_default())
    }

    fn describe(&self) -> String { "scripted".into() }
  }
}

//! Minimal OpenAI-compatible client for the wizard's four model calls.
//!
//! Every call goes to chat.completions asking for a strict JSON object; the raw
//! reply text is handed to the parsers in `agent`. Calls are instrumented and log
//! model names, latencies and token usage (not contents).
//!
//! NOTE: We never log the API key. Any OpenAI-compatible endpoint works, e.g.
//! Gemini's `/v1beta/openai` base URL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::agent::{parse_lessons, parse_questions, parse_specs, parse_suggestions, ExamAgent, SyllabusInput, UnitSuggestion};
use crate::config::{Prompts, WizardSettings};
use crate::domain::{ExamConfig, Lesson, MatrixRow, Question, QuestionType, SpecEntry};
use crate::error::AgentError;
use crate::util::{fill_template, truncate_chars};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub prompts: Prompts,
  pub limits: WizardSettings,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  /// No request timeout: drafting a whole unit can take minutes.
  pub fn from_env(prompts: Prompts, limits: WizardSettings) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, prompts, limits })
  }

  /// JSON-object chat completion. Returns the raw message text.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model, user_len = user.len()))]
  async fn chat_json(&self, model: &str, system: &str, user: &str, temperature: f32) -> Result<String, AgentError> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "examgen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), status, "Model call failed");
      return Err(AgentError::from_status(status, msg));
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Model response received");
    Ok(text)
  }

  fn requirements<'a>(&self, text: &'a str) -> &'a str {
    let t = truncate_chars(text, self.limits.requirements_char_limit);
    if t.trim().is_empty() { "(không có)" } else { t }
  }
}

#[async_trait]
impl ExamAgent for OpenAI {
  #[instrument(level = "info", skip(self, input), fields(subject = %input.subject, grade = %input.grade, text_len = input.text.len()))]
  async fn extract_lessons(&self, input: SyllabusInput<'_>) -> Result<Vec<Lesson>, AgentError> {
    let user = fill_template(
      &self.prompts.lessons_user_template,
      &[
        ("subject", input.subject),
        ("grade", input.grade),
        ("exam_type", input.exam_type),
        ("text", truncate_chars(input.text, self.limits.syllabus_char_limit)),
      ],
    );
    let raw = self.chat_json(&self.fast_model, &self.prompts.lessons_system, &user, 0.1).await?;
    let lessons = parse_lessons(&raw);
    info!(count = lessons.len(), "Lessons extracted");
    Ok(lessons)
  }

  #[instrument(level = "info", skip(self, lessons, cfg, requirements), fields(lessons = lessons.len(), model = %self.strong_model))]
  async fn suggest_matrix(&self, lessons: &[Lesson], cfg: &ExamConfig, requirements: &str) -> Result<Vec<UnitSuggestion>, AgentError> {
    let listing = lessons
      .iter()
      .map(|l| format!("- {} ({})", l.name, l.topic))
      .collect::<Vec<_>>()
      .join("\n");
    let counts = [cfg.mcq_count, cfg.tf_count, cfg.short_count, cfg.essay_count].map(|n| n.to_string());
    let percents = [cfg.percent_know, cfg.percent_understand, cfg.percent_apply].map(|n| n.to_string());
    let user = fill_template(
      &self.prompts.matrix_user_template,
      &[
        ("subject", cfg.subject.as_str()),
        ("grade", cfg.grade.as_str()),
        ("exam_type", cfg.exam_type.as_str()),
        ("difficulty", cfg.difficulty.as_str()),
        ("mcq_count", counts[0].as_str()),
        ("tf_count", counts[1].as_str()),
        ("short_count", counts[2].as_str()),
        ("essay_count", counts[3].as_str()),
        ("percent_know", percents[0].as_str()),
        ("percent_understand", percents[1].as_str()),
        ("percent_apply", percents[2].as_str()),
        ("lessons", listing.as_str()),
        ("requirements", self.requirements(requirements)),
      ],
    );
    let raw = self.chat_json(&self.strong_model, &self.prompts.matrix_system, &user, 0.2).await?;
    Ok(parse_suggestions(&raw))
  }

  #[instrument(level = "info", skip(self, rows, cfg, requirements), fields(rows = rows.len(), model = %self.strong_model))]
  async fn draft_specification(&self, rows: &[MatrixRow], cfg: &ExamConfig, requirements: &str) -> Result<Vec<SpecEntry>, AgentError> {
    let matrix = rows.iter().map(describe_row).collect::<Vec<_>>().join("\n");
    let user = fill_template(
      &self.prompts.spec_user_template,
      &[
        ("subject", cfg.subject.as_str()),
        ("grade", cfg.grade.as_str()),
        ("exam_type", cfg.exam_type.as_str()),
        ("matrix", matrix.as_str()),
        ("requirements", self.requirements(requirements)),
      ],
    );
    let raw = self.chat_json(&self.strong_model, &self.prompts.spec_system, &user, 0.3).await?;
    Ok(parse_specs(&raw))
  }

  #[instrument(level = "info", skip(self, row, spec, cfg), fields(unit = %row.unit, cells = row.cell_total()))]
  async fn draft_questions(&self, row: &MatrixRow, spec: &str, cfg: &ExamConfig) -> Result<Vec<Question>, AgentError> {
    let allocation = QuestionType::ALL
      .iter()
      .filter(|t| row.cells(**t).sum() > 0)
      .map(|t| {
        let c = row.cells(*t);
        format!("- {}: NB {}, TH {}, VD {}", t.as_str(), c.recognition, c.understanding, c.application)
      })
      .collect::<Vec<_>>()
      .join("\n");
    let user = fill_template(
      &self.prompts.questions_user_template,
      &[
        ("subject", cfg.subject.as_str()),
        ("grade", cfg.grade.as_str()),
        ("difficulty", cfg.difficulty.as_str()),
        ("unit", row.unit.as_str()),
        ("topic", row.topic.as_str()),
        ("allocation", allocation.as_str()),
        ("spec", truncate_chars(spec, self.limits.unit_requirements_char_limit)),
      ],
    );
    let raw = self.chat_json(&self.strong_model, &self.prompts.questions_system, &user, 0.7).await?;
    Ok(parse_questions(&raw, &row.unit))
  }

  fn describe(&self) -> String {
    format!("openai base_url={} fast={} strong={}", self.base_url, self.fast_model, self.strong_model)
  }
}

fn describe_row(row: &MatrixRow) -> String {
  let cells = QuestionType::ALL
    .iter()
    .map(|t| {
      let c = row.cells(*t);
      format!("{} {}/{}/{}", t.as_str(), c.recognition, c.understanding, c.application)
    })
    .collect::<Vec<_>>()
    .join(", ");
  format!("- {} | {}", row.unit, cells)
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
/// Some compatible endpoints wrap the error in a one-element array.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  if let Ok(w) = serde_json::from_str::<EWrap>(body) {
    return Some(w.error.message);
  }
  serde_json::from_str::<Vec<EWrap>>(body).ok()?.into_iter().next().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_body_variants() {
    assert_eq!(extract_openai_error(r#"{"error":{"message":"bad key"}}"#).as_deref(), Some("bad key"));
    assert_eq!(extract_openai_error(r#"[{"error":{"message":"quota"}}]"#).as_deref(), Some("quota"));
    assert_eq!(extract_openai_error("oops"), None);
  }

  #[test]
  fn status_classification() {
    assert!(matches!(AgentError::from_status(401, String::new()), AgentError::InvalidCredential(_)));
    assert!(matches!(AgentError::from_status(403, String::new()), AgentError::InvalidCredential(_)));
    assert!(matches!(AgentError::from_status(429, String::new()), AgentError::RateLimited(_)));
    assert!(matches!(AgentError::from_status(500, String::new()), AgentError::Http { status: 500, .. }));
  }

  #[test]
  fn row_description_lists_all_types() {
    let mut row = MatrixRow::empty("1", "A", "Bài 1");
    row.mcq.recognition = 2;
    assert_eq!(describe_row(&row), "- Bài 1 | MCQ 2/0/0, TF 0/0/0, SHORT 0/0/0, ESSAY 0/0/0");
  }
}

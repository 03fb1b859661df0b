//! Core behaviors shared by both HTTP and WebSocket handlers: every wizard
//! operation that calls the model service.
//!
//! All of them follow the same shape. Lock the session, check the step gate
//! and the in-flight flag, snapshot the inputs and raise the flag, unlock, await
//! the service, relock, clear the flag and merge the result. The session lock
//! is never held across a model call.
//!
//! Everything after the flag is raised runs on a spawned task. Dropping the
//! caller (a client that hangs up) does not cancel it, so the flag is always
//! lowered and the result still lands on the session.

use std::future::Future;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::{ExamAgent, SyllabusInput};
use crate::domain::{ExamConfig, Lesson, MatrixRow, SpecEntry};
use crate::error::WizardError;
use crate::protocol::{DraftOut, ServerWsMessage, SyllabusIn};
use crate::state::{AppState, SharedSession};
use crate::wizard::drafting::{draft_unit, UnitProgress, UnitStatus};
use crate::wizard::lessons::SetupMeta;
use crate::wizard::Step;

/// Run `work` on its own task and wait for it.
async fn detached<T, F>(work: F) -> Result<T, WizardError>
where
  T: Send + 'static,
  F: Future<Output = Result<T, WizardError>> + Send + 'static,
{
  tokio::spawn(work).await.map_err(|e| {
    error!(target: "wizard", error = %e, "Stage task aborted");
    WizardError::Internal(e.to_string())
  })?
}

/// Step 1: extract lessons from the syllabus text. A failure or an empty
/// result leaves the lesson list empty.
#[instrument(level = "info", skip(state, input), fields(%session_id, text_len = input.text.len()))]
pub async fn analyze_syllabus(state: &AppState, session_id: &str, input: SyllabusIn) -> Result<Vec<Lesson>, WizardError> {
  if input.text.trim().is_empty() {
    return Err(WizardError::Validation("Nội dung Phụ lục III trống".into()));
  }
  let agent = state.agent()?;
  let shared = state.session(session_id).await?;
  {
    let mut s = shared.lock().await;
    if s.analyzing {
      return Err(WizardError::Busy("phân tích Phụ lục III"));
    }
    s.analyzing = true;
  }

  let session_id = session_id.to_string();
  detached(async move {
    let result = agent
      .extract_lessons(SyllabusInput {
        text: &input.text,
        subject: &input.subject,
        grade: &input.grade,
        exam_type: &input.exam_type,
      })
      .await;

    let mut s = shared.lock().await;
    s.analyzing = false;
    s.meta = SetupMeta { subject: input.subject, grade: input.grade, exam_type: input.exam_type };
    match result {
      Ok(lessons) if !lessons.is_empty() => {
        info!(target: "wizard", session = %session_id, count = lessons.len(), "Lessons extracted");
        s.replace_lessons(lessons.clone());
        Ok(lessons)
      }
      Ok(_) => {
        warn!(target: "wizard", session = %session_id, "Lesson extraction returned no lessons");
        s.clear_lessons();
        Err(WizardError::Validation("Không trích xuất được bài học nào, vui lòng tải lại file".into()))
      }
      Err(e) => {
        error!(target: "wizard", session = %session_id, error = %e, "Lesson extraction failed");
        s.clear_lessons();
        Err(e.into())
      }
    }
  })
  .await
}

/// Step 3: ask the service for an allocation and merge it into the grid.
/// On failure the rows are left untouched. Returns the number of matched rows.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn request_suggestion(state: &AppState, session_id: &str) -> Result<(usize, Vec<MatrixRow>), WizardError> {
  let agent = state.agent()?;
  let shared = state.session(session_id).await?;
  let (lessons, cfg, requirements) = {
    let mut s = shared.lock().await;
    s.check_unlocked(Step::Matrix)?;
    if s.matrix.suggest_in_flight {
      return Err(WizardError::Busy("gợi ý ma trận"));
    }
    s.matrix.suggest_in_flight = true;
    (s.lessons.selected(), s.config.clone(), s.requirements().to_string())
  };

  let session_id = session_id.to_string();
  detached(async move {
    let result = agent.suggest_matrix(&lessons, &cfg, &requirements).await;

    let mut s = shared.lock().await;
    s.matrix.suggest_in_flight = false;
    let suggestions = result.map_err(|e| {
      error!(target: "wizard", session = %session_id, error = %e, "Matrix suggestion failed; rows unchanged");
      WizardError::from(e)
    })?;
    let scores = s.scores();
    let matched = s.matrix.merge_suggestions(&suggestions, &scores);
    info!(target: "wizard", session = %session_id, suggested = suggestions.len(), matched, rows = s.matrix.rows().len(), "Suggestion merged");
    Ok((matched, s.matrix.rows().to_vec()))
  })
  .await
}

/// Step 4: draft per-unit requirement text. Also used by "regenerate".
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn generate_spec(state: &AppState, session_id: &str) -> Result<Vec<SpecEntry>, WizardError> {
  let agent = state.agent()?;
  let shared = state.session(session_id).await?;
  let (rows, cfg, requirements) = {
    let mut s = shared.lock().await;
    s.check_unlocked(Step::Specification)?;
    if s.spec_in_flight {
      return Err(WizardError::Busy("đặc tả"));
    }
    s.spec_in_flight = true;
    (s.matrix.rows().to_vec(), s.config.clone(), s.requirements().to_string())
  };

  let session_id = session_id.to_string();
  detached(async move {
    let result = agent.draft_specification(&rows, &cfg, &requirements).await;

    let mut s = shared.lock().await;
    s.spec_in_flight = false;
    let entries = result.map_err(|e| {
      error!(target: "wizard", session = %session_id, error = %e, "Specification drafting failed");
      WizardError::from(e)
    })?;
    if entries.is_empty() {
      warn!(target: "wizard", session = %session_id, "Specification drafting returned no units");
      return Err(WizardError::Validation("AI không trả về bản đặc tả, vui lòng thử lại".into()));
    }
    let missing = rows.iter().filter(|r| !entries.iter().any(|e| e.unit == r.unit)).count();
    info!(target: "wizard", session = %session_id, units = entries.len(), missing, "Specification stored");
    s.spec = entries.clone();
    Ok(entries)
  })
  .await
}

fn emit(events: Option<&UnboundedSender<ServerWsMessage>>, progress: Option<UnitProgress>) {
  if let (Some(tx), Some(progress)) = (events, progress) {
    if tx.send(ServerWsMessage::UnitStatus { progress }).is_err() {
      debug!(target: "wizard", "Progress receiver dropped");
    }
  }
}

/// Step 5: the sequential drafting pass ("generate" and "regenerate all").
///
/// Units are processed strictly one at a time in matrix order. A failed unit is
/// logged, marked FAILED and skipped; the batch always runs to the end.
/// Progress is pushed to `events` when a listener is attached.
#[instrument(level = "info", skip(state, events), fields(%session_id))]
pub async fn run_drafting(
  state: &AppState,
  session_id: &str,
  events: Option<UnboundedSender<ServerWsMessage>>,
) -> Result<DraftOut, WizardError> {
  let agent = state.agent()?;
  let shared = state.session(session_id).await?;
  let (todo, specs, cfg, fallback) = {
    let mut guard = shared.lock().await;
    let s = &mut *guard;
    s.check_unlocked(Step::Exam)?;
    let todo = s.drafting.begin(s.matrix.rows())?;
    (todo, s.spec.clone(), s.config.clone(), s.settings.spec_fallback.clone())
  };
  info!(target: "wizard", session = %session_id, units = todo.len(), "Drafting pass started");

  let session_id = session_id.to_string();
  detached(async move {
    for row in &todo {
      draft_one(&shared, agent.as_ref(), row, &specs, &cfg, &fallback, events.as_ref()).await;
    }

    let mut s = shared.lock().await;
    s.drafting.end();
    let failed: Vec<String> = s
      .drafting
      .units
      .iter()
      .filter(|u| u.status == UnitStatus::Failed)
      .map(|u| u.unit.clone())
      .collect();
    let total = s.drafting.questions.len();
    info!(target: "wizard", session = %session_id, total, failed = failed.len(), "Drafting pass finished");
    if let Some(tx) = &events {
      let _ = tx.send(ServerWsMessage::QuestionsDone { total, failed });
    }
    Ok(DraftOut { total, units: s.drafting.units.clone() })
  })
  .await
}

async fn draft_one(
  shared: &SharedSession,
  agent: &dyn ExamAgent,
  row: &MatrixRow,
  specs: &[SpecEntry],
  cfg: &ExamConfig,
  fallback: &str,
  events: Option<&UnboundedSender<ServerWsMessage>>,
) {
  let loading = shared.lock().await.drafting.mark_loading(&row.id);
  emit(events, loading);

  let outcome = draft_unit(agent, row, specs, cfg, fallback).await;

  let finished = shared.lock().await.drafting.finish_unit(&row.id, outcome);
  emit(events, finished);
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::sync::Arc;
  use std::time::Duration;

  use crate::agent::testing::{question, ScriptedAgent};
  use crate::agent::UnitSuggestion;
  use crate::config::{AgentConfig, WizardSettings};
  use crate::domain::{CognitiveLevel, LevelCounts, QuestionType};
  use crate::error::AgentError;

  fn lesson(id: &str, name: &str) -> Lesson {
    Lesson { id: id.into(), name: name.into(), topic: "Chủ đề A".into(), week: 1, periods: 2, selected: true }
  }

  fn state_with(agent: ScriptedAgent) -> (AppState, Arc<ScriptedAgent>) {
    let config = AgentConfig {
      wizard: WizardSettings { require_requirements_corpus: false, ..WizardSettings::default() },
      ..AgentConfig::default()
    };
    let agent = Arc::new(agent);
    let dyn_agent: Arc<dyn ExamAgent> = agent.clone();
    (AppState::with_agent(config, Some(dyn_agent)), agent)
  }

  fn syllabus() -> SyllabusIn {
    SyllabusIn { text: "PPCT".into(), subject: "Toán".into(), grade: "7".into(), exam_type: "Cuối học kỳ I".into() }
  }

  /// Logged in, lessons analyzed, setup and config completed: sitting on the matrix step.
  async fn at_matrix(state: &AppState) -> String {
    let shared = state.login("admin", "admin123").await.expect("login");
    let id = shared.lock().await.id.clone();
    analyze_syllabus(state, &id, syllabus()).await.expect("lessons");
    let mut s = shared.lock().await;
    let meta = s.meta.clone();
    s.complete_setup(meta).expect("setup");
    s.complete_config().expect("config");
    id
  }

  async fn allocate(state: &AppState, id: &str, row_ids: &[&str]) {
    let shared = state.session(id).await.expect("session");
    let mut s = shared.lock().await;
    let scores = s.scores();
    for rid in row_ids {
      s.matrix.edit_cell(rid, QuestionType::Mcq, CognitiveLevel::Recognition, 1.0, &scores).expect("row");
    }
    s.spec = vec![SpecEntry { unit: "Bài 1".into(), requirements: "NB: ...".into() }];
  }

  #[tokio::test]
  async fn empty_extraction_is_an_error_and_clears_lessons() {
    let (state, _) = state_with(ScriptedAgent::default());
    let shared = state.login("admin", "admin123").await.expect("login");
    let id = shared.lock().await.id.clone();
    assert!(matches!(analyze_syllabus(&state, &id, syllabus()).await, Err(WizardError::Validation(_))));
    assert!(shared.lock().await.lessons.is_empty());
  }

  #[tokio::test]
  async fn suggestion_merges_case_insensitively_end_to_end() {
    let (state, agent) = state_with(ScriptedAgent {
      lessons: vec![lesson("1", "Bài 1")],
      suggestions: vec![UnitSuggestion {
        unit: "bài 1".into(),
        mcq: LevelCounts { recognition: 1, understanding: 1, application: 0 },
        tf: LevelCounts::default(),
        short: LevelCounts::default(),
        essay: LevelCounts::default(),
      }],
      ..ScriptedAgent::default()
    });
    let id = at_matrix(&state).await;
    let (matched, rows) = request_suggestion(&state, &id).await.expect("suggestion");
    assert_eq!(matched, 1);
    assert_eq!((rows[0].total_know, rows[0].total_understand, rows[0].total_apply), (1, 1, 0));
    assert_eq!(agent.calls(), vec!["lessons:Toán".to_string(), "suggest:1".to_string()]);
  }

  #[tokio::test]
  async fn failed_suggestion_leaves_rows_and_clears_flag() {
    let (state, _) = state_with(ScriptedAgent { lessons: vec![lesson("1", "Bài 1")], ..ScriptedAgent::default() });
    let id = at_matrix(&state).await;
    allocate(&state, &id, &["1"]).await;
    let shared = state.session(&id).await.expect("session");
    let before = shared.lock().await.matrix.rows().to_vec();

    let (failing, _) = state_with(ScriptedAgent { fail_status: Some(429), ..ScriptedAgent::default() });
    let state = AppState { agent: failing.agent.clone(), ..state };
    let err = request_suggestion(&state, &id).await.unwrap_err();
    assert!(matches!(err, WizardError::Agent(AgentError::RateLimited(_))));
    let s = shared.lock().await;
    assert_eq!(s.matrix.rows(), before.as_slice());
    assert!(!s.matrix.suggest_in_flight);
  }

  #[tokio::test]
  async fn second_unit_failure_keeps_first_units_questions() {
    let mut questions = HashMap::new();
    questions.insert("Bài 1".to_string(), vec![question("Bài 1", QuestionType::Mcq, "q1"), question("Bài 1", QuestionType::Tf, "q2")]);
    questions.insert("Bài 2".to_string(), vec![question("Bài 2", QuestionType::Mcq, "never")]);
    let (state, agent) = state_with(ScriptedAgent {
      lessons: vec![lesson("1", "Bài 1"), lesson("2", "Bài 2")],
      questions,
      failing_units: vec!["Bài 2".into()],
      ..ScriptedAgent::default()
    });
    let id = at_matrix(&state).await;
    allocate(&state, &id, &["1", "2"]).await;

    let out = run_drafting(&state, &id, None).await.expect("batch completes");
    assert_eq!(out.total, 2);
    assert_eq!(out.units[1].status, UnitStatus::Failed);

    let shared = state.session(&id).await.expect("session");
    let s = shared.lock().await;
    assert!(s.drafting.questions.iter().all(|q| q.unit == "Bài 1"));
    assert!(!s.drafting.in_flight);
    assert_eq!(
      agent.calls()[1..],
      ["questions:Bài 1".to_string(), "questions:Bài 2".to_string()]
    );
  }

  #[tokio::test]
  async fn drafting_preserves_unit_order_and_streams_progress() {
    let mut questions = HashMap::new();
    questions.insert("Bài 1".to_string(), vec![question("Bài 1", QuestionType::Mcq, "a1"), question("Bài 1", QuestionType::Short, "a2")]);
    questions.insert("Bài 2".to_string(), vec![question("Bài 2", QuestionType::Mcq, "b1")]);
    let (state, _) = state_with(ScriptedAgent {
      lessons: vec![lesson("1", "Bài 1"), lesson("2", "Bài 2")],
      questions,
      ..ScriptedAgent::default()
    });
    let id = at_matrix(&state).await;
    allocate(&state, &id, &["1", "2"]).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    run_drafting(&state, &id, Some(tx)).await.expect("batch");

    let shared = state.session(&id).await.expect("session");
    let contents: Vec<String> = shared.lock().await.drafting.questions.iter().map(|q| q.content.clone()).collect();
    assert_eq!(contents, vec!["a1", "a2", "b1"]);

    let mut statuses = Vec::new();
    while let Ok(msg) = rx.try_recv() {
      match msg {
        ServerWsMessage::UnitStatus { progress } => statuses.push((progress.unit, progress.status)),
        ServerWsMessage::QuestionsDone { total, failed } => {
          assert_eq!(total, 3);
          assert!(failed.is_empty());
        }
        other => panic!("unexpected event {other:?}"),
      }
    }
    assert_eq!(
      statuses,
      vec![
        ("Bài 1".to_string(), UnitStatus::Loading),
        ("Bài 1".to_string(), UnitStatus::Done),
        ("Bài 2".to_string(), UnitStatus::Loading),
        ("Bài 2".to_string(), UnitStatus::Done),
      ]
    );
  }

  #[tokio::test]
  async fn overlapping_requests_are_rejected() {
    let (state, _) = state_with(ScriptedAgent { lessons: vec![lesson("1", "Bài 1")], ..ScriptedAgent::default() });
    let id = at_matrix(&state).await;
    allocate(&state, &id, &["1"]).await;
    let shared = state.session(&id).await.expect("session");
    shared.lock().await.matrix.suggest_in_flight = true;
    shared.lock().await.drafting.in_flight = true;
    assert!(matches!(request_suggestion(&state, &id).await, Err(WizardError::Busy(_))));
    assert!(matches!(run_drafting(&state, &id, None).await, Err(WizardError::Busy(_))));
  }

  #[tokio::test]
  async fn dropped_suggestion_request_still_lowers_flag() {
    let (state, agent) = state_with(ScriptedAgent {
      lessons: vec![lesson("1", "Bài 1")],
      delay: Some(Duration::from_millis(150)),
      ..ScriptedAgent::default()
    });
    let id = at_matrix(&state).await;
    let cancelled = tokio::time::timeout(Duration::from_millis(20), request_suggestion(&state, &id)).await;
    assert!(cancelled.is_err(), "caller gave up before the reply");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let shared = state.session(&id).await.expect("session");
    assert!(!shared.lock().await.matrix.suggest_in_flight);
    request_suggestion(&state, &id).await.expect("retry is not busy");
    assert_eq!(agent.calls().iter().filter(|c| c.starts_with("suggest")).count(), 2);
  }

  #[tokio::test]
  async fn dropped_drafting_request_finishes_the_pass() {
    let mut questions = HashMap::new();
    questions.insert("Bài 1".to_string(), vec![question("Bài 1", QuestionType::Mcq, "q1")]);
    let (state, _) = state_with(ScriptedAgent {
      lessons: vec![lesson("1", "Bài 1")],
      questions,
      delay: Some(Duration::from_millis(150)),
      ..ScriptedAgent::default()
    });
    let id = at_matrix(&state).await;
    allocate(&state, &id, &["1"]).await;
    let cancelled = tokio::time::timeout(Duration::from_millis(20), run_drafting(&state, &id, None)).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let shared = state.session(&id).await.expect("session");
    {
      let s = shared.lock().await;
      assert!(!s.drafting.in_flight);
      assert_eq!(s.drafting.questions.len(), 1);
    }
    run_drafting(&state, &id, None).await.expect("second pass");
  }

  #[tokio::test]
  async fn drafting_requires_spec_step() {
    let (state, _) = state_with(ScriptedAgent { lessons: vec![lesson("1", "Bài 1")], ..ScriptedAgent::default() });
    let id = at_matrix(&state).await;
    assert!(matches!(
      run_drafting(&state, &id, None).await,
      Err(WizardError::StepLocked { step: Step::Exam, .. })
    ));
  }

  #[tokio::test]
  async fn spec_generation_stores_entries() {
    let (state, agent) = state_with(ScriptedAgent {
      lessons: vec![lesson("1", "Bài 1")],
      specs: vec![SpecEntry { unit: "Bài 1".into(), requirements: "Nhận biết ...".into() }],
      ..ScriptedAgent::default()
    });
    let id = at_matrix(&state).await;
    assert!(matches!(generate_spec(&state, &id).await, Err(WizardError::StepLocked { .. })));
    allocate(&state, &id, &["1"]).await;
    state.session(&id).await.expect("session").lock().await.spec.clear();

    let entries = generate_spec(&state, &id).await.expect("spec");
    assert_eq!(entries.len(), 1);
    assert!(agent.calls().contains(&"spec:1".to_string()));
    let shared = state.session(&id).await.expect("session");
    assert!(shared.lock().await.check_unlocked(Step::Exam).is_ok());
  }
}

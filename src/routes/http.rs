//! HTTP endpoint handlers. These are thin wrappers that forward to the wizard
//! session or to core logic. Each handler is instrumented.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::{header, StatusCode},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::catalog::{self, Catalog, MathSymbol};
use crate::error::WizardError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;
use crate::wizard::drafting::{self, DraftingView};
use crate::wizard::lessons::SetupMeta;
use crate::wizard::matrix::{self, MatrixView};
use crate::wizard::render::{self, ExamDocument};
use crate::wizard::setup::{self, ConfigPatch, ConfigView};
use crate::wizard::spec::{self, SpecView};
use crate::wizard::{Step, WizardSession};

type ApiResult<T> = Result<Json<T>, WizardError>;

/// Run `f` with the session locked. Only for operations without model calls.
async fn with_session<T>(
  state: &AppState,
  id: &str,
  f: impl FnOnce(&mut WizardSession) -> Result<T, WizardError>,
) -> Result<T, WizardError> {
  let shared = state.session(id).await?;
  let mut s = shared.lock().await;
  f(&mut s)
}

fn step_out(s: &WizardSession, step: Step) -> StepOut {
  StepOut { step, unlocked: s.unlocked_steps() }
}

fn config_view(s: &WizardSession) -> ConfigView {
  setup::view(&s.config, &s.settings, s.role)
}

fn spec_view(s: &WizardSession) -> SpecView {
  spec::view(s.matrix.rows(), &s.spec, &s.config, &s.settings.spec_missing_placeholder, s.spec_in_flight)
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, agent: state.agent.is_some() })
}

pub async fn http_catalog() -> Json<Catalog> {
  Json(catalog::catalog())
}

pub async fn http_symbols() -> Json<&'static [MathSymbol]> {
  Json(catalog::MATH_SYMBOLS)
}

#[instrument(level = "info", skip(state, body), fields(username = %body.username))]
pub async fn http_login(State(state): State<Arc<AppState>>, Json(body): Json<LoginIn>) -> ApiResult<SessionOut> {
  let shared = state.login(&body.username, &body.password).await?;
  let session = shared.lock().await.snapshot();
  Ok(Json(SessionOut { session }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionOut> {
  with_session(&state, &id, |s| Ok(Json(SessionOut { session: s.snapshot() }))).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_logout(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, WizardError> {
  if state.logout(&id).await {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(WizardError::NotFound(format!("phiên làm việc {id}")))
  }
}

#[instrument(level = "info", skip(state, body), fields(step = ?body.step))]
pub async fn http_post_step(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<StepIn>,
) -> ApiResult<StepOut> {
  with_session(&state, &id, |s| {
    let step = s.goto(body.step)?;
    Ok(Json(step_out(s, step)))
  })
  .await
}

// --- Step 1: lessons ---

#[instrument(level = "info", skip(state, body), fields(subject = %body.subject, grade = %body.grade))]
pub async fn http_post_syllabus(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SyllabusIn>,
) -> ApiResult<LessonsOut> {
  let lessons = logic::analyze_syllabus(&state, &id, body).await?;
  Ok(Json(LessonsOut { lessons }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_lesson(
  State(state): State<Arc<AppState>>,
  Path((id, lesson_id)): Path<(String, String)>,
) -> ApiResult<ToggleOut> {
  with_session(&state, &id, |s| {
    let selected = s.toggle_lesson(&lesson_id)?;
    Ok(Json(ToggleOut { id: lesson_id.clone(), selected }))
  })
  .await
}

#[instrument(level = "info", skip(state, meta))]
pub async fn http_setup_complete(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(meta): Json<SetupMeta>,
) -> ApiResult<StepOut> {
  with_session(&state, &id, |s| {
    let step = s.complete_setup(meta)?;
    Ok(Json(step_out(s, step)))
  })
  .await
}

// --- Step 2: configuration ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_config(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<ConfigView> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Config)?;
    Ok(Json(config_view(s)))
  })
  .await
}

#[instrument(level = "info", skip(state, patch))]
pub async fn http_patch_config(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(patch): Json<ConfigPatch>,
) -> ApiResult<ConfigView> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Config)?;
    s.patch_config(patch)?;
    Ok(Json(config_view(s)))
  })
  .await
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len()))]
pub async fn http_put_requirements(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<RequirementsIn>,
) -> ApiResult<ConfigView> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Config)?;
    s.attach_requirements(body.text);
    Ok(Json(config_view(s)))
  })
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn http_config_complete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<StepOut> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Config)?;
    let step = s.complete_config()?;
    Ok(Json(step_out(s, step)))
  })
  .await
}

// --- Step 3: matrix ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_matrix(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<MatrixView> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Matrix)?;
    Ok(Json(matrix::view(&s.matrix, &s.config)))
  })
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn http_matrix_suggest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SuggestOut> {
  let (matched, rows) = logic::request_suggestion(&state, &id).await?;
  Ok(Json(SuggestOut { matched, rows }))
}

#[instrument(level = "info", skip(state, body), fields(row_id = %body.row_id, kind = ?body.kind, level = ?body.level, value = body.value))]
pub async fn http_put_cell(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<CellIn>,
) -> ApiResult<RowOut> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Matrix)?;
    if s.matrix.suggest_in_flight {
      return Err(WizardError::Busy("gợi ý ma trận"));
    }
    let scores = s.scores();
    let row = s.matrix.edit_cell(&body.row_id, body.kind, body.level, body.value, &scores)?.clone();
    Ok(Json(RowOut { row }))
  })
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn http_matrix_complete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<StepOut> {
  with_session(&state, &id, |s| {
    let step = s.complete_matrix()?;
    Ok(Json(step_out(s, step)))
  })
  .await
}

// --- Step 4: specification ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_spec(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SpecView> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Specification)?;
    Ok(Json(spec_view(s)))
  })
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn http_spec_generate(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SpecView> {
  logic::generate_spec(&state, &id).await?;
  with_session(&state, &id, |s| Ok(Json(spec_view(s)))).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_spec_complete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<StepOut> {
  with_session(&state, &id, |s| {
    let step = s.complete_spec()?;
    Ok(Json(step_out(s, step)))
  })
  .await
}

// --- Step 5: questions ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_questions(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<DraftingView> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Exam)?;
    Ok(Json(drafting::view(&s.drafting)))
  })
  .await
}

/// Runs the whole sequential pass before answering. Use the WebSocket
/// `draft_questions` message for live progress.
#[instrument(level = "info", skip(state))]
pub async fn http_questions_generate(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<DraftOut> {
  let out = logic::run_drafting(&state, &id, None).await?;
  info!(target: "wizard", session = %id, total = out.total, "HTTP drafting pass served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(content_len = body.content.len()))]
pub async fn http_put_question(
  State(state): State<Arc<AppState>>,
  Path((id, question_id)): Path<(String, String)>,
  Json(body): Json<QuestionEditIn>,
) -> ApiResult<QuestionOut> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Exam)?;
    let question = s.drafting.edit_content(&question_id, body.content)?.clone();
    Ok(Json(QuestionOut { question, caret: None }))
  })
  .await
}

#[instrument(level = "info", skip(state, body), fields(start = body.start, end = body.end, tex = %body.tex))]
pub async fn http_question_symbol(
  State(state): State<Arc<AppState>>,
  Path((id, question_id)): Path<(String, String)>,
  Json(body): Json<SymbolIn>,
) -> ApiResult<QuestionOut> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Exam)?;
    let (question, caret) = s.drafting.insert_symbol(&question_id, body.start, body.end, &body.tex)?;
    Ok(Json(QuestionOut { question: question.clone(), caret: Some(caret) }))
  })
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn http_questions_complete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<StepOut> {
  with_session(&state, &id, |s| {
    let step = s.complete_questions()?;
    Ok(Json(step_out(s, step)))
  })
  .await
}

// --- Step 6: preview ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_preview(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<ExamDocument> {
  with_session(&state, &id, |s| {
    s.check_unlocked(Step::Preview)?;
    Ok(Json(render::build(&s.drafting.questions, &s.config)))
  })
  .await
}

/// Word opens the HTML document as a `.doc`.
#[instrument(level = "info", skip(state))]
pub async fn http_download(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<impl IntoResponse, WizardError> {
  let (filename, html) = with_session(&state, &id, |s| {
    s.check_unlocked(Step::Preview)?;
    let doc = render::build(&s.drafting.questions, &s.config);
    Ok((render::download_filename(&s.config), render::to_html(&doc)))
  })
  .await?;
  info!(target: "wizard", session = %id, %filename, bytes = html.len(), "Exam document downloaded");
  let disposition = content_disposition(&filename);
  Ok((
    [(header::CONTENT_TYPE, "application/msword; charset=utf-8".to_string()), (header::CONTENT_DISPOSITION, disposition)],
    html,
  ))
}

/// ASCII fallback plus the RFC 5987 `filename*` form for non-ASCII names.
fn content_disposition(filename: &str) -> String {
  format!("attachment; filename=\"exam.doc\"; filename*=UTF-8''{}", urlencoding::encode(filename))
}

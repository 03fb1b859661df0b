//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::error::{AgentError, WizardError};
use crate::protocol::ErrorOut;
use crate::state::AppState;

pub mod http;
pub mod ws;

impl WizardError {
    pub fn status(&self) -> StatusCode {
        match self {
            WizardError::StepLocked { .. } | WizardError::Busy(_) => StatusCode::CONFLICT,
            WizardError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WizardError::Forbidden(_) => StatusCode::FORBIDDEN,
            WizardError::NotFound(_) => StatusCode::NOT_FOUND,
            WizardError::BadCredentials => StatusCode::UNAUTHORIZED,
            WizardError::Agent(AgentError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            WizardError::Agent(AgentError::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
            // The server's own key or the upstream failed, not the caller.
            WizardError::Agent(_) => StatusCode::BAD_GATEWAY,
            WizardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WizardError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(target: "examgen_backend", %status, error = %self, "Request failed");
        }
        (status, Json(ErrorOut { error: self.to_string() })).into_response()
    }
}

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/catalog", get(http::http_catalog))
        .route("/api/v1/symbols", get(http::http_symbols))
        .route("/api/v1/login", post(http::http_login))
        .route("/api/v1/session/:id", get(http::http_get_session).delete(http::http_logout))
        .route("/api/v1/session/:id/step", post(http::http_post_step))
        // Step 1
        .route("/api/v1/session/:id/syllabus", post(http::http_post_syllabus))
        .route("/api/v1/session/:id/lessons/:lesson_id/toggle", post(http::http_toggle_lesson))
        .route("/api/v1/session/:id/setup/complete", post(http::http_setup_complete))
        // Step 2
        .route("/api/v1/session/:id/config", get(http::http_get_config).patch(http::http_patch_config))
        .route("/api/v1/session/:id/config/requirements", put(http::http_put_requirements))
        .route("/api/v1/session/:id/config/complete", post(http::http_config_complete))
        // Step 3
        .route("/api/v1/session/:id/matrix", get(http::http_get_matrix))
        .route("/api/v1/session/:id/matrix/suggest", post(http::http_matrix_suggest))
        .route("/api/v1/session/:id/matrix/cell", put(http::http_put_cell))
        .route("/api/v1/session/:id/matrix/complete", post(http::http_matrix_complete))
        // Step 4
        .route("/api/v1/session/:id/spec", get(http::http_get_spec))
        .route("/api/v1/session/:id/spec/generate", post(http::http_spec_generate))
        .route("/api/v1/session/:id/spec/complete", post(http::http_spec_complete))
        // Step 5
        .route("/api/v1/session/:id/questions", get(http::http_get_questions))
        .route("/api/v1/session/:id/questions/generate", post(http::http_questions_generate))
        .route("/api/v1/session/:id/questions/complete", post(http::http_questions_complete))
        .route("/api/v1/session/:id/questions/:question_id", put(http::http_put_question))
        .route("/api/v1/session/:id/questions/:question_id/symbol", post(http::http_question_symbol))
        // Step 6
        .route("/api/v1/session/:id/preview", get(http::http_get_preview))
        .route("/api/v1/session/:id/preview/download", get(http::http_download))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::agent::testing::{question, ScriptedAgent};
    use crate::agent::ExamAgent;
    use crate::config::AgentConfig;
    use crate::domain::{Lesson, QuestionType};

    fn app(agent: Option<Arc<dyn ExamAgent>>) -> (Router, Arc<AppState>) {
        let mut config = AgentConfig::default();
        config.wizard.require_requirements_corpus = false;
        let state = Arc::new(AppState::with_agent(config, agent));
        (build_router(state.clone()), state)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).expect("request")).await.expect("infallible");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn login(app: &Router) -> String {
        let (status, body) = call(app, Method::POST, "/api/v1/login", Some(json!({"username": "admin", "password": "admin123"}))).await;
        assert_eq!(status, StatusCode::OK);
        body["session"]["id"].as_str().expect("session id").to_string()
    }

    #[tokio::test]
    async fn health_reports_agent_presence() {
        let (app, _) = app(None);
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "agent": false}));
    }

    #[tokio::test]
    async fn login_and_gating_errors_map_to_statuses() {
        let (app, _) = app(None);
        let (status, body) = call(&app, Method::POST, "/api/v1/login", Some(json!({"username": "admin", "password": "x"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let id = login(&app).await;
        let (status, body) = call(&app, Method::GET, &format!("/api/v1/session/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["unlocked"], json!(["SETUP"]));

        let (status, _) = call(&app, Method::POST, &format!("/api/v1/session/{id}/step"), Some(json!({"step": "MATRIX"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, Method::PUT, &format!("/api/v1/session/{id}/questions/q1"), Some(json!({"content": "x"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/v1/session/{id}/questions/q1/symbol"),
            Some(json!({"start": 0, "end": 0, "tex": "\\pi"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/v1/session/{id}/syllabus"),
            Some(json!({"text": "PPCT", "subject": "TOÁN", "grade": "7", "examType": "Cuối học kỳ I"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/session/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &format!("/api/v1/session/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn full_wizard_over_http() {
        let mut questions = std::collections::HashMap::new();
        questions.insert(
            "Bài 1".to_string(),
            vec![question("Bài 1", QuestionType::Mcq, "Câu hỏi 1"), question("Bài 1", QuestionType::Essay, "Câu hỏi 2")],
        );
        let agent = ScriptedAgent {
            lessons: vec![Lesson { id: "l1".into(), name: "Bài 1".into(), topic: "Chủ đề A".into(), week: 1, periods: 2, selected: true }],
            specs: vec![crate::domain::SpecEntry { unit: "Bài 1".into(), requirements: "Nhận biết: ...".into() }],
            questions,
            ..ScriptedAgent::default()
        };
        let (app, _) = app(Some(Arc::new(agent)));
        let id = login(&app).await;
        let base = format!("/api/v1/session/{id}");

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("{base}/syllabus"),
            Some(json!({"text": "PPCT", "subject": "TOÁN", "grade": "7", "examType": "Cuối học kỳ I"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lessons"][0]["name"], "Bài 1");

        let meta = json!({"subject": "TOÁN", "grade": "7", "examType": "Cuối học kỳ I"});
        let (status, body) = call(&app, Method::POST, &format!("{base}/setup/complete"), Some(meta)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], "CONFIG");

        let (status, body) = call(&app, Method::PATCH, &format!("{base}/config"), Some(json!({"mcqCount": 2, "tfCount": 0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["mcqCount"], 2);

        let (status, _) = call(&app, Method::POST, &format!("{base}/config/complete"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::GET, &format!("{base}/matrix"), None).await;
        assert_eq!(status, StatusCode::OK);
        let row_id = body["rows"][0]["id"].as_str().expect("row id").to_string();

        let cell = json!({"rowId": row_id, "type": "MCQ", "level": "recognition", "value": 2});
        let (status, body) = call(&app, Method::PUT, &format!("{base}/matrix/cell"), Some(cell)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["row"]["totalKnow"], 2);
        assert_eq!(body["row"]["percentage"], 5.0);

        let (status, _) = call(&app, Method::POST, &format!("{base}/matrix/complete"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::POST, &format!("{base}/spec/generate"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"][0]["found"], true);
        let (status, _) = call(&app, Method::POST, &format!("{base}/spec/complete"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::POST, &format!("{base}/questions/generate"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);

        let (_, body) = call(&app, Method::GET, &format!("{base}/questions"), None).await;
        let qid = body["questions"][0]["id"].as_str().expect("question id").to_string();
        let (status, body) = call(
            &app,
            Method::POST,
            &format!("{base}/questions/{qid}/symbol"),
            Some(json!({"start": 0, "end": 0, "tex": "\\pi"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["question"]["content"], "$\\pi$Câu hỏi 1");
        assert_eq!(body["caret"], 5);

        let (status, _) = call(&app, Method::POST, &format!("{base}/questions/complete"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::GET, &format!("{base}/preview"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sections"][1]["questions"][0]["displayNumber"], 2);

        let res = app
            .clone()
            .oneshot(Request::builder().uri(format!("{base}/preview/download")).body(Body::empty()).expect("request"))
            .await
            .expect("infallible");
        assert_eq!(res.status(), StatusCode::OK);
        let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().expect("ascii header").to_string();
        assert!(disposition.contains("filename*=UTF-8''DE_THI_TO%C3%81N_7_Cu"));
    }

    #[tokio::test]
    async fn teacher_role_is_forbidden_from_scores() {
        let mut config = AgentConfig::default();
        config.accounts.push(crate::config::Account {
            username: "gv".into(),
            password: "gv".into(),
            role: crate::domain::Role::Teacher,
        });
        let state = Arc::new(AppState::with_agent(config, None));
        let app = build_router(state.clone());
        let shared = state.login("gv", "gv").await.expect("teacher login");
        let id = {
            let mut s = shared.lock().await;
            s.replace_lessons(vec![Lesson { id: "l1".into(), name: "Bài 1".into(), topic: "A".into(), week: 1, periods: 1, selected: true }]);
            let meta = crate::wizard::lessons::SetupMeta { subject: "TOÁN".into(), grade: "7".into(), exam_type: "GK".into() };
            s.complete_setup(meta).expect("setup");
            s.id.clone()
        };
        let (status, body) = call(&app, Method::PATCH, &format!("/api/v1/session/{id}/config"), Some(json!({"mcqScore": 0.5}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap_or_default().contains("mcqScore"));
    }
}

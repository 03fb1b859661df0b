//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{CognitiveLevel, Lesson, MatrixRow, Question, QuestionType};
use crate::wizard::drafting::UnitProgress;
use crate::wizard::{SessionSnapshot, Step};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Run the sequential drafting pass and stream per-unit progress.
    DraftQuestions {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    UnitStatus {
        #[serde(flatten)]
        progress: UnitProgress,
    },
    QuestionsDone {
        total: usize,
        failed: Vec<String>,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub agent: bool,
}

#[derive(Deserialize)]
pub struct LoginIn {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionOut {
    pub session: SessionSnapshot,
}

#[derive(Deserialize)]
pub struct StepIn {
    pub step: Step,
}

#[derive(Serialize)]
pub struct StepOut {
    pub step: Step,
    pub unlocked: Vec<Step>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyllabusIn {
    /// Plain text already extracted from the Word document.
    pub text: String,
    pub subject: String,
    pub grade: String,
    pub exam_type: String,
}

#[derive(Serialize)]
pub struct LessonsOut {
    pub lessons: Vec<Lesson>,
}

#[derive(Serialize)]
pub struct ToggleOut {
    pub id: String,
    pub selected: bool,
}

#[derive(Deserialize)]
pub struct RequirementsIn {
    pub text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellIn {
    pub row_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub level: CognitiveLevel,
    pub value: f64,
}

#[derive(Serialize)]
pub struct RowOut {
    pub row: MatrixRow,
}

#[derive(Serialize)]
pub struct SuggestOut {
    pub matched: usize,
    pub rows: Vec<MatrixRow>,
}

#[derive(Deserialize)]
pub struct QuestionEditIn {
    pub content: String,
}

#[derive(Deserialize)]
pub struct SymbolIn {
    pub start: usize,
    pub end: usize,
    pub tex: String,
}

#[derive(Serialize)]
pub struct QuestionOut {
    pub question: Question,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caret: Option<usize>,
}

#[derive(Serialize)]
pub struct DraftOut {
    pub total: usize,
    pub units: Vec<UnitProgress>,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

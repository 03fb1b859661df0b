//! Error taxonomy for the external model service and for wizard operations.

use thiserror::Error;

use crate::wizard::Step;

/// Failures of a call to the generative service. None of them is retried.
#[derive(Debug, Error)]
pub enum AgentError {
  #[error("Khóa API không hợp lệ hoặc không có quyền truy cập: {0}")]
  InvalidCredential(String),
  #[error("Dịch vụ AI đang bị giới hạn tần suất, vui lòng thử lại sau: {0}")]
  RateLimited(String),
  #[error("Dịch vụ AI trả về lỗi HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("Không kết nối được dịch vụ AI: {0}")]
  Transport(String),
  #[error("Chưa cấu hình dịch vụ AI (OPENAI_API_KEY)")]
  Disabled,
}

impl AgentError {
  /// Classify a non-success HTTP status from the model endpoint.
  pub fn from_status(status: u16, message: String) -> Self {
    match status {
      401 | 403 => AgentError::InvalidCredential(message),
      429 => AgentError::RateLimited(message),
      _ => AgentError::Http { status, message },
    }
  }
}

impl From<reqwest::Error> for AgentError {
  fn from(e: reqwest::Error) -> Self { AgentError::Transport(e.to_string()) }
}

/// Failures of wizard operations, surfaced to the client as blocking errors.
#[derive(Debug, Error)]
pub enum WizardError {
  #[error("Bước {step:?} chưa được mở: {reason}")]
  StepLocked { step: Step, reason: String },
  #[error("{0}")]
  Validation(String),
  #[error("Vai trò hiện tại không được sửa trường '{0}'")]
  Forbidden(&'static str),
  #[error("Đang xử lý {0}, vui lòng chờ")]
  Busy(&'static str),
  #[error("Không tìm thấy {0}")]
  NotFound(String),
  #[error("Sai tên đăng nhập hoặc mật khẩu")]
  BadCredentials,
  #[error(transparent)]
  Agent(#[from] AgentError),
  #[error("Lỗi hệ thống: {0}")]
  Internal(String),
}

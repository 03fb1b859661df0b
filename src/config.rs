//! Loading agent configuration (prompts, wizard limits, accounts, exam defaults) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use tracing::{info, error};

use crate::domain::{ExamConfig, Role};

#[derive(Clone, Debug, Deserialize)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub wizard: WizardSettings,
  #[serde(default = "default_accounts")]
  pub accounts: Vec<Account>,
  /// Starting exam configuration for every new session. Missing keys keep the built-in defaults.
  #[serde(default)]
  pub exam_defaults: ExamConfig,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      prompts: Prompts::default(),
      wizard: WizardSettings::default(),
      accounts: default_accounts(),
      exam_defaults: ExamConfig::default(),
    }
  }
}

/// Login entry. This is a convenience gate for a single-school deployment, not access control.
#[derive(Clone, Debug, Deserialize)]
pub struct Account {
  pub username: String,
  pub password: String,
  #[serde(default)]
  pub role: Role,
}

fn default_accounts() -> Vec<Account> {
  vec![Account { username: "admin".into(), password: "admin123".into(), role: Role::Admin }]
}

/// Limits and fixed texts used by the wizard stages.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WizardSettings {
  /// Characters of syllabus text forwarded to lesson extraction.
  pub syllabus_char_limit: usize,
  /// Characters of requirement corpus forwarded to matrix/spec drafting.
  pub requirements_char_limit: usize,
  /// Characters of requirement text forwarded per unit to question drafting.
  pub unit_requirements_char_limit: usize,
  /// Requirement text used for a unit that has no specification entry.
  pub spec_fallback: String,
  /// Shown in the specification table when the model returned nothing for a unit.
  pub spec_missing_placeholder: String,
  /// Configuration cannot be completed without an attached Phụ lục I text.
  pub require_requirements_corpus: bool,
}

impl Default for WizardSettings {
  fn default() -> Self {
    Self {
      syllabus_char_limit: 10_000,
      requirements_char_limit: 15_000,
      unit_requirements_char_limit: 6_000,
      spec_fallback: "Phân bổ theo chuẩn kiến thức.".into(),
      spec_missing_placeholder: "AI không trích xuất được yêu cầu tương ứng.".into(),
      require_requirements_corpus: true,
    }
  }
}

/// Prompts used by the model client. Every call asks for a JSON object.
/// Override them in TOML to tune wording per subject.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Phụ lục III → lessons
  pub lessons_system: String,
  pub lessons_user_template: String,
  // Lessons + config → per-unit counts
  pub matrix_system: String,
  pub matrix_user_template: String,
  // Matrix → per-unit requirement text (bản đặc tả)
  pub spec_system: String,
  pub spec_user_template: String,
  // One matrix row → questions
  pub questions_system: String,
  pub questions_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      lessons_system: "Bạn là chuyên gia phân tích kế hoạch dạy học. Chỉ trả lời bằng JSON hợp lệ.".into(),
      lessons_user_template: "Dưới đây là nội dung Phụ lục III kế hoạch dạy học môn {subject} khối {grade}, kỳ kiểm tra {exam_type}.\n\
Hãy phân tích nội dung này và trích xuất danh sách các bài học thực tế.\n\n\
YÊU CẦU NGHIÊM NGẶT:\n\
1. Chỉ lấy các bài học thực tế có nội dung kiến thức.\n\
2. LOẠI BỎ hoàn toàn các tiết: Ôn tập, Kiểm tra, Đánh giá, Trả bài, Sinh hoạt, Dự phòng.\n\
3. Trả về JSON dạng {\"lessons\": [{\"topic\": string, \"name\": string, \"week\": number, \"periods\": number}]}.\n\n\
NỘI DUNG VĂN BẢN:\n{text}".into(),
      matrix_system: "Bạn là một chuyên gia khảo thí, lập ma trận đề kiểm tra theo Công văn 7791. Chỉ trả lời bằng JSON hợp lệ.".into(),
      matrix_user_template: "Hãy lập ma trận phân bổ câu hỏi cho môn {subject} lớp {grade}. Kỳ thi: {exam_type}. Độ khó mục tiêu: {difficulty}.\n\
Cấu trúc đề: {mcq_count} câu nhiều lựa chọn, {tf_count} câu đúng/sai, {short_count} câu trả lời ngắn, {essay_count} câu tự luận.\n\
Tỷ lệ yêu cầu: {percent_know}% Nhận biết - {percent_understand}% Thông hiểu - {percent_apply}% Vận dụng.\n\n\
Danh sách các bài học đã chọn:\n{lessons}\n\n\
Yêu cầu cần đạt (Phụ lục I):\n{requirements}\n\n\
Phân bổ số câu của từng dạng vào 3 mức độ cho từng bài học sao cho tổng số câu mỗi dạng đúng cấu trúc đề và sát tỷ lệ mục tiêu nhất có thể.\n\
Trả về JSON dạng {\"units\": [{\"unit\": string, \"mcq\": {\"recognition\": n, \"understanding\": n, \"application\": n}, \"tf\": {...}, \"short\": {...}, \"essay\": {...}}]}. Giữ nguyên tên bài học.".into(),
      spec_system: "Bạn là chuyên gia xây dựng bản đặc tả đề kiểm tra theo Công văn 7791. Chỉ trả lời bằng JSON hợp lệ.".into(),
      spec_user_template: "Môn {subject} lớp {grade}, kỳ kiểm tra {exam_type}.\n\
Ma trận đã phân bổ (mỗi dòng: bài học | số câu theo dạng và mức độ):\n{matrix}\n\n\
Yêu cầu cần đạt (Phụ lục I):\n{requirements}\n\n\
Với mỗi bài học, viết các yêu cầu cần đạt theo từng mức độ Nhận biết / Thông hiểu / Vận dụng, phù hợp với số câu đã phân bổ.\n\
Trả về JSON dạng {\"specs\": [{\"unit\": string, \"requirements\": string}]}. Trường unit phải trùng khớp tên bài học.".into(),
      questions_system: "Bạn là giáo viên ra đề kiểm tra. Viết công thức toán bằng LaTeX trong cặp dấu $. Chỉ trả lời bằng JSON hợp lệ.".into(),
      questions_user_template: "Môn {subject} lớp {grade}, độ khó {difficulty}.\n\
Bài học: {unit} (chủ đề: {topic}).\n\
Số câu cần soạn theo dạng và mức độ:\n{allocation}\n\n\
Yêu cầu cần đạt của bài:\n{spec}\n\n\
Quy tắc:\n\
- MCQ: đúng 4 phương án trong \"options\", \"answer\" là một chữ cái A/B/C/D.\n\
- TF: \"content\" gồm 4 ý a) b) c) d), \"answer\" là mảng đúng 4 giá trị true/false.\n\
- SHORT và ESSAY: \"answer\" là văn bản đáp án/hướng dẫn chấm.\n\
- \"level\" là một trong NB, TH, VD, VDC.\n\
Trả về JSON dạng {\"questions\": [{\"type\": \"MCQ\"|\"TF\"|\"SHORT\"|\"ESSAY\", \"level\": string, \"content\": string, \"options\": [string], \"answer\": ..., \"explanation\": string}]}.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "examgen_backend", %path, accounts = cfg.accounts.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "examgen_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "examgen_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_yields_defaults() {
    let cfg = parse_agent_config("").expect("empty config parses");
    assert_eq!(cfg.accounts.len(), 1);
    assert_eq!(cfg.accounts[0].role, Role::Admin);
    assert_eq!(cfg.wizard.syllabus_char_limit, 10_000);
    assert_eq!(cfg.exam_defaults, ExamConfig::default());
    assert!(cfg.prompts.lessons_user_template.contains("{text}"));
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let cfg = parse_agent_config(
      r#"
[wizard]
require_requirements_corpus = false

[exam_defaults]
schoolName = "THCS LÊ LỢI"
mcqCount = 16

[[accounts]]
username = "gv1"
password = "x"
role = "teacher"
"#,
    )
    .expect("config parses");
    assert!(!cfg.wizard.require_requirements_corpus);
    assert_eq!(cfg.wizard.spec_fallback, "Phân bổ theo chuẩn kiến thức.");
    assert_eq!(cfg.exam_defaults.school_name, "THCS LÊ LỢI");
    assert_eq!(cfg.exam_defaults.mcq_count, 16);
    assert_eq!(cfg.exam_defaults.tf_count, 2);
    assert_eq!(cfg.accounts.len(), 1);
    assert_eq!(cfg.accounts[0].role, Role::Teacher);
  }
}

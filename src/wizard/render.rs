//! Step 6: the printable exam and its answer key.
//!
//! Pure projection of the question list. Numbering is derived from partition
//! order on every render and never stored on the questions.

use serde::Serialize;

use crate::aggregate::score_split;
use crate::domain::{Answer, ExamConfig, Question, QuestionType};

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NumberedQuestion {
  /// Position inside its type partition; used by the answer key.
  pub number: usize,
  /// "Câu N" in the exam body, continuous across all sections.
  pub display_number: usize,
  pub question: Question,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
  #[serde(rename = "type")]
  pub kind: QuestionType,
  pub title: &'static str,
  pub questions: Vec<NumberedQuestion>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Header {
  pub school_name: String,
  pub department: String,
  pub exam_name: String,
  pub subject_line: String,
  pub school_year: String,
  pub duration: String,
  pub test_code: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
  pub number: usize,
  pub answer: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKey {
  /// MCQ letters laid out ten per row.
  pub mcq_rows: Vec<Vec<KeyEntry>>,
  pub tf: Vec<KeyEntry>,
  pub short: Vec<KeyEntry>,
  pub essay: Vec<KeyEntry>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExamDocument {
  pub header: Header,
  pub objective_title: String,
  pub essay_title: String,
  pub sections: Vec<Section>,
  pub key: AnswerKey,
}

const MCQ_KEY_ROW: usize = 10;

fn section_title(kind: QuestionType) -> &'static str {
  match kind {
    QuestionType::Mcq => "I. Trắc nghiệm nhiều lựa chọn",
    QuestionType::Tf => "II. Câu hỏi đúng sai",
    QuestionType::Short => "III. Trả lời ngắn",
    QuestionType::Essay => "Tự luận",
  }
}

/// Partition by type (MCQ, TF, SHORT, ESSAY) keeping list order inside each
/// partition. Empty partitions are omitted.
pub fn partition(questions: &[Question]) -> Vec<Section> {
  let mut display = 0;
  let mut sections = Vec::new();
  for kind in QuestionType::ALL {
    let numbered: Vec<NumberedQuestion> = questions
      .iter()
      .filter(|q| q.kind == kind)
      .enumerate()
      .map(|(i, q)| {
        display += 1;
        NumberedQuestion { number: i + 1, display_number: display, question: q.clone() }
      })
      .collect();
    if !numbered.is_empty() {
      sections.push(Section { kind, title: section_title(kind), questions: numbered });
    }
  }
  sections
}

/// Points with a Vietnamese decimal comma, trailing zeros dropped ("6", "2,5").
pub fn format_points(points: f64) -> String {
  let s = format!("{:.2}", points);
  let s = s.trim_end_matches('0').trim_end_matches('.');
  s.replace('.', ",")
}

fn answer_text(q: &Question) -> String {
  match &q.answer {
    Answer::Flags(flags) => flags
      .iter()
      .enumerate()
      .map(|(i, f)| format!("{}) {}", (b'a' + i as u8) as char, if *f { "Đúng" } else { "Sai" }))
      .collect::<Vec<_>>()
      .join(", "),
    Answer::Text(t) => t.clone(),
  }
}

fn answer_key(sections: &[Section]) -> AnswerKey {
  let mut key = AnswerKey::default();
  for s in sections {
    let entries = s.questions.iter().map(|nq| KeyEntry {
      number: nq.number,
      answer: answer_text(&nq.question),
      explanation: nq.question.explanation.clone(),
    });
    match s.kind {
      QuestionType::Mcq => {
        let all: Vec<KeyEntry> = entries.map(|e| KeyEntry { explanation: None, ..e }).collect();
        key.mcq_rows = all.chunks(MCQ_KEY_ROW).map(<[KeyEntry]>::to_vec).collect();
      }
      QuestionType::Tf => key.tf = entries.collect(),
      QuestionType::Short => key.short = entries.collect(),
      QuestionType::Essay => key.essay = entries.collect(),
    }
  }
  key
}

pub fn build(questions: &[Question], cfg: &ExamConfig) -> ExamDocument {
  let split = score_split(cfg);
  let sections = partition(questions);
  let key = answer_key(&sections);
  ExamDocument {
    header: Header {
      school_name: cfg.school_name.to_uppercase(),
      department: cfg.department.to_uppercase(),
      exam_name: cfg.exam_name.clone(),
      subject_line: format!("MÔN {} {}", cfg.subject.to_uppercase(), cfg.grade),
      school_year: cfg.school_year.clone(),
      duration: cfg.duration.clone(),
      test_code: cfg.test_code.clone(),
    },
    objective_title: format!("A. PHẦN TRẮC NGHIỆM KHÁCH QUAN ({} ĐIỂM)", format_points(split.objective_score)),
    essay_title: format!("B. PHẦN TỰ LUẬN ({} ĐIỂM)", format_points(split.essay_score)),
    sections,
    key,
  }
}

/// `DE_THI_{SUBJECT}_{grade}_{examType}.doc`, whitespace runs in the exam type
/// replaced by `_`.
pub fn download_filename(cfg: &ExamConfig) -> String {
  let exam_type = cfg.exam_type.split_whitespace().collect::<Vec<_>>().join("_");
  format!("DE_THI_{}_{}_{}.doc", cfg.subject.to_uppercase(), cfg.grade, exam_type)
}

fn esc(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
  out
}

/// Word-compatible HTML for the download action.
pub fn to_html(doc: &ExamDocument) -> String {
  let mut h = String::new();
  h.push_str("<html><head><meta charset=\"utf-8\"><title>");
  h.push_str(&esc(&doc.header.exam_name));
  h.push_str("</title></head><body style=\"font-family:'Times New Roman';font-size:12pt\">");

  h.push_str("<table width=\"100%\"><tr><td align=\"center\"><b>");
  h.push_str(&esc(&doc.header.school_name));
  h.push_str("</b><br><u><b>");
  h.push_str(&esc(&doc.header.department));
  h.push_str("</b></u></td><td align=\"center\"><b>");
  h.push_str(&esc(&doc.header.exam_name));
  h.push_str("</b><br><b>");
  h.push_str(&esc(&doc.header.subject_line));
  h.push_str("</b><br><b>");
  h.push_str(&esc(&doc.header.school_year));
  h.push_str("</b><br><i>Thời gian làm bài: ");
  h.push_str(&esc(&doc.header.duration));
  h.push_str("</i></td></tr></table>");
  h.push_str(&format!(
    "<p>Họ và tên: ............................ Số báo danh: .............. <b>Mã đề {}</b></p>",
    esc(&doc.header.test_code)
  ));

  let objective: Vec<&Section> = doc.sections.iter().filter(|s| s.kind != QuestionType::Essay).collect();
  if !objective.is_empty() {
    h.push_str(&format!("<h3>{}</h3>", esc(&doc.objective_title)));
    for s in objective {
      h.push_str(&format!("<p><b><i>{}</i></b></p>", esc(s.title)));
      push_questions(&mut h, s);
    }
  }
  if let Some(s) = doc.sections.iter().find(|s| s.kind == QuestionType::Essay) {
    h.push_str(&format!("<h3>{}</h3>", esc(&doc.essay_title)));
    push_questions(&mut h, s);
  }

  h.push_str("<br style=\"page-break-before:always\"><h2 align=\"center\">ĐÁP ÁN VÀ HƯỚNG DẪN CHẤM</h2>");
  if !doc.key.mcq_rows.is_empty() {
    h.push_str("<p><b>PHẦN I. TRẮC NGHIỆM NHIỀU LỰA CHỌN</b></p><table border=\"1\" cellspacing=\"0\">");
    for row in &doc.key.mcq_rows {
      h.push_str("<tr>");
      for e in row {
        h.push_str(&format!("<td align=\"center\">{}<br><b>{}</b></td>", e.number, esc(&e.answer)));
      }
      h.push_str("</tr>");
    }
    h.push_str("</table>");
  }
  push_key_table(&mut h, "PHẦN II. TRẮC NGHIỆM ĐÚNG SAI", &doc.key.tf);
  push_key_table(&mut h, "PHẦN III. TRẢ LỜI NGẮN", &doc.key.short);
  if !doc.key.essay.is_empty() {
    h.push_str("<p><b>PHẦN IV. TỰ LUẬN</b></p>");
    for e in &doc.key.essay {
      h.push_str(&format!("<p><b>Câu {}:</b></p><p>{}</p>", e.number, esc(&e.answer)));
      if let Some(x) = &e.explanation {
        h.push_str(&format!("<p><i>{}</i></p>", esc(x)));
      }
    }
  }
  h.push_str("</body></html>");
  h
}

fn push_questions(h: &mut String, s: &Section) {
  for nq in &s.questions {
    h.push_str(&format!("<p><b>Câu {}:</b> {}</p>", nq.display_number, esc(&nq.question.content)));
    if let Some(options) = &nq.question.options {
      for (i, opt) in options.iter().enumerate() {
        h.push_str(&format!("<p style=\"margin-left:1em\"><b>{}.</b> {}</p>", (b'A' + i as u8) as char, esc(opt)));
      }
    }
  }
}

fn push_key_table(h: &mut String, title: &str, entries: &[KeyEntry]) {
  if entries.is_empty() {
    return;
  }
  h.push_str(&format!("<p><b>{}</b></p><table border=\"1\" cellspacing=\"0\">", esc(title)));
  for e in entries {
    h.push_str(&format!("<tr><td><b>Câu {}</b></td><td>{}</td></tr>", e.number, esc(&e.answer)));
  }
  h.push_str("</table>");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::agent::testing::question;

  fn mixed() -> Vec<Question> {
    vec![
      question("Bài 1", QuestionType::Essay, "e1"),
      question("Bài 1", QuestionType::Mcq, "m1"),
      question("Bài 1", QuestionType::Tf, "t1"),
      question("Bài 2", QuestionType::Mcq, "m2"),
      question("Bài 2", QuestionType::Short, "s1"),
    ]
  }

  #[test]
  fn partition_orders_types_and_numbers_both_ways() {
    let sections = partition(&mixed());
    let kinds: Vec<QuestionType> = sections.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, QuestionType::ALL.to_vec());
    let flat: Vec<(&str, usize, usize)> = sections
      .iter()
      .flat_map(|s| s.questions.iter().map(|q| (q.question.content.as_str(), q.number, q.display_number)))
      .collect();
    assert_eq!(flat, vec![("m1", 1, 1), ("m2", 2, 2), ("t1", 1, 3), ("s1", 1, 4), ("e1", 1, 5)]);
  }

  #[test]
  fn numbering_is_stable_across_renders() {
    let qs = mixed();
    let cfg = ExamConfig::default();
    assert_eq!(build(&qs, &cfg), build(&qs, &cfg));
  }

  #[test]
  fn answer_key_layout() {
    let mut qs: Vec<Question> = (0..12).map(|i| question("Bài 1", QuestionType::Mcq, &format!("m{i}"))).collect();
    qs.push(question("Bài 1", QuestionType::Tf, "t"));
    let doc = build(&qs, &ExamConfig::default());
    assert_eq!(doc.key.mcq_rows.len(), 2);
    assert_eq!(doc.key.mcq_rows[1][0].number, 11);
    assert_eq!(doc.key.tf[0].answer, "a) Đúng, b) Sai, c) Đúng, d) Sai");
  }

  #[test]
  fn titles_use_score_split() {
    let doc = build(&[], &ExamConfig::default());
    assert_eq!(doc.objective_title, "A. PHẦN TRẮC NGHIỆM KHÁCH QUAN (6 ĐIỂM)");
    assert_eq!(doc.essay_title, "B. PHẦN TỰ LUẬN (4 ĐIỂM)");
    assert_eq!(format_points(2.5), "2,5");
    assert_eq!(format_points(0.25), "0,25");
  }

  #[test]
  fn filename_and_escaping() {
    let cfg = ExamConfig { subject: "Toán".into(), grade: "7".into(), exam_type: "Cuối kì  I".into(), ..ExamConfig::default() };
    assert_eq!(download_filename(&cfg), "DE_THI_TOÁN_7_Cuối_kì_I.doc");
    let html = to_html(&build(&[question("Bài 1", QuestionType::Short, "x < 2 & y")], &cfg));
    assert!(html.contains("x &lt; 2 &amp; y"));
    assert!(html.contains("PHẦN III. TRẢ LỜI NGẮN"));
  }
}

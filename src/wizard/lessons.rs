//! Step 1: lessons extracted from the syllabus and the user's selection.

use serde::{Deserialize, Serialize};

use crate::domain::Lesson;
use crate::error::WizardError;

/// Subject / grade / exam period chosen on the first screen.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupMeta {
  pub subject: String,
  pub grade: String,
  pub exam_type: String,
}

impl SetupMeta {
  pub fn is_complete(&self) -> bool {
    !self.subject.trim().is_empty() && !self.grade.trim().is_empty() && !self.exam_type.trim().is_empty()
  }

  /// Title given to the exam when setup completes, e.g.
  /// "MA TRẬN KIỂM TRA CKI MÔN TOÁN 7".
  pub fn default_exam_name(&self) -> String {
    format!(
      "MA TRẬN KIỂM TRA {} MÔN {} {}",
      self.exam_type.to_uppercase(),
      self.subject.to_uppercase(),
      self.grade
    )
  }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct LessonSelection {
  lessons: Vec<Lesson>,
}

impl LessonSelection {
  /// A new analysis replaces the whole list.
  pub fn replace(&mut self, lessons: Vec<Lesson>) {
    self.lessons = lessons;
  }

  pub fn clear(&mut self) {
    self.lessons.clear();
  }

  /// Flip inclusion of one lesson; returns the new flag.
  pub fn toggle(&mut self, id: &str) -> Result<bool, WizardError> {
    let lesson = self
      .lessons
      .iter_mut()
      .find(|l| l.id == id)
      .ok_or_else(|| WizardError::NotFound(format!("bài học {id}")))?;
    lesson.selected = !lesson.selected;
    Ok(lesson.selected)
  }

  pub fn all(&self) -> &[Lesson] {
    &self.lessons
  }

  pub fn selected(&self) -> Vec<Lesson> {
    self.lessons.iter().filter(|l| l.selected).cloned().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.lessons.is_empty()
  }

  pub fn can_continue(&self, meta: &SetupMeta) -> bool {
    meta.is_complete() && self.lessons.iter().any(|l| l.selected)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lesson(id: &str, selected: bool) -> Lesson {
    Lesson { id: id.into(), name: format!("Bài {id}"), topic: "A".into(), week: 1, periods: 1, selected }
  }

  fn meta() -> SetupMeta {
    SetupMeta { subject: "Toán".into(), grade: "7".into(), exam_type: "CKI".into() }
  }

  #[test]
  fn toggle_flips_and_filters() {
    let mut sel = LessonSelection::default();
    sel.replace(vec![lesson("1", true), lesson("2", true)]);
    assert_eq!(sel.toggle("2").expect("known id"), false);
    let ids: Vec<String> = sel.selected().into_iter().map(|l| l.id).collect();
    assert_eq!(ids, vec!["1".to_string()]);
    assert!(sel.toggle("nope").is_err());
  }

  #[test]
  fn continue_requires_selection_and_meta() {
    let mut sel = LessonSelection::default();
    sel.replace(vec![lesson("1", false)]);
    assert!(!sel.can_continue(&meta()));
    sel.toggle("1").expect("known id");
    assert!(sel.can_continue(&meta()));
    assert!(!sel.can_continue(&SetupMeta { grade: " ".into(), ..meta() }));
  }

  #[test]
  fn exam_name_is_uppercased() {
    assert_eq!(meta().default_exam_name(), "MA TRẬN KIỂM TRA CKI MÔN TOÁN 7");
  }
}

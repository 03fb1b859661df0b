//! Small utility helpers used across modules.

use rand::{distributions::Alphanumeric, Rng};

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Keep at most `max` characters (not bytes) of `s`.
/// Prompt inputs are bounded this way before being sent to the model.
pub fn truncate_chars(s: &str, max: usize) -> &str {
  match s.char_indices().nth(max) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  let head = truncate_chars(s, max);
  if head.len() == s.len() { s.to_string() } else { format!("{}… ({} bytes total)", head, s.len()) }
}

/// Short random id for lessons (9 lowercase alphanumerics).
pub fn short_id() -> String {
  rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(9)
    .map(|b| (b as char).to_ascii_lowercase())
    .collect()
}

/// Replace the `[start, end)` char range of `text` with `insert` and return the
/// new text plus the caret position right after the insertion.
/// Offsets past the end are clamped; a reversed range collapses to `start`.
pub fn splice_at_caret(text: &str, start: usize, end: usize, insert: &str) -> (String, usize) {
  let len = text.chars().count();
  let start = start.min(len);
  let end = end.clamp(start, len);
  let byte = |pos: usize| text.char_indices().nth(pos).map(|(i, _)| i).unwrap_or(text.len());
  let (a, b) = (byte(start), byte(end));
  let mut out = String::with_capacity(text.len() + insert.len());
  out.push_str(&text[..a]);
  out.push_str(insert);
  out.push_str(&text[b..]);
  (out, start + insert.chars().count())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_all_keys() {
    let s = fill_template("môn {subject} lớp {grade}, {subject}", &[("subject", "TOÁN"), ("grade", "7")]);
    assert_eq!(s, "môn TOÁN lớp 7, TOÁN");
  }

  #[test]
  fn truncate_counts_chars_not_bytes() {
    assert_eq!(truncate_chars("Bài học", 3), "Bài");
    assert_eq!(truncate_chars("abc", 10), "abc");
  }

  #[test]
  fn splice_inserts_at_caret() {
    let (s, caret) = splice_at_caret("Tính x = 2", 5, 5, "$\\sqrt{x}$");
    assert_eq!(s, "Tính $\\sqrt{x}$x = 2");
    assert_eq!(caret, 5 + "$\\sqrt{x}$".chars().count());
  }

  #[test]
  fn splice_replaces_selection_and_clamps() {
    let (s, _) = splice_at_caret("abcdef", 1, 3, "X");
    assert_eq!(s, "aXdef");
    let (s, caret) = splice_at_caret("ab", 10, 20, "Z");
    assert_eq!(s, "abZ");
    assert_eq!(caret, 3);
  }

  #[test]
  fn short_ids_are_nine_chars() {
    let id = short_id();
    assert_eq!(id.len(), 9);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
  }
}

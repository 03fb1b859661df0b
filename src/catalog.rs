//! Fixed pick lists offered by the client: subjects, grades, exam periods and
//! the math-symbol palette of the question editor.

use serde::Serialize;

pub const SUBJECTS: &[&str] = &["KHTN", "TOÁN", "NGỮ VĂN", "TIẾNG ANH", "GDCD", "LS-ĐL", "CÔNG NGHỆ"];

pub const GRADES: &[&str] = &["6", "7", "8", "9"];

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ExamPeriod {
  pub id: &'static str,
  pub name: &'static str,
}

/// The exam type stored on a session is the period's `name`.
pub const EXAM_TYPES: &[ExamPeriod] = &[
  ExamPeriod { id: "GKI", name: "Giữa học kỳ I" },
  ExamPeriod { id: "CKI", name: "Cuối học kỳ I" },
  ExamPeriod { id: "GKII", name: "Giữa học kỳ II" },
  ExamPeriod { id: "CKII", name: "Cuối học kỳ II" },
];

#[derive(Clone, Copy, Debug, Serialize)]
pub struct MathSymbol {
  pub label: &'static str,
  pub tex: &'static str,
}

const fn sym(label: &'static str, tex: &'static str) -> MathSymbol {
  MathSymbol { label, tex }
}

pub const MATH_SYMBOLS: &[MathSymbol] = &[
  sym("x²", "x^2"),
  sym("xⁿ", "x^n"),
  sym("X₁", "x_1"),
  sym("Xₙ", "x_n"),
  sym("a/b", "\\frac{a}{b}"),
  sym("√x", "\\sqrt{x}"),
  sym("×", "\\times"),
  sym("÷", "\\div"),
  sym("π", "\\pi"),
  sym("α", "\\alpha"),
  sym("β", "\\beta"),
  sym("Δ", "\\Delta"),
  sym("Ω", "\\Omega"),
  sym("°", "^{\\circ}"),
  sym("→", "\\rightarrow"),
  sym("⇒", "\\Rightarrow"),
  sym("≤", "\\le"),
  sym("≥", "\\ge"),
  sym("≈", "\\approx"),
  sym("≠", "\\neq"),
  sym("#", "\\#"),
  sym("∞", "\\infty"),
  sym("Σ", "\\Sigma"),
  sym("∈", "\\in"),
  sym("⊂", "\\subset"),
];

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
  pub subjects: &'static [&'static str],
  pub grades: &'static [&'static str],
  pub exam_types: &'static [ExamPeriod],
}

pub fn catalog() -> Catalog {
  Catalog { subjects: SUBJECTS, grades: GRADES, exam_types: EXAM_TYPES }
}

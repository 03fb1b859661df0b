//! Pure aggregation over the allocation matrix: per-row level totals, point
//! contributions and the footer sums shown against the configured targets.
//!
//! The formulas must match documents produced by earlier versions of the tool,
//! including the per-type fallback scores used when a score is left at zero.

use serde::Serialize;

use crate::domain::{ExamConfig, LevelCounts, MatrixRow, QuestionType};

/// Points per question for each type, after applying fallbacks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TypeScores {
  pub mcq: f64,
  pub tf: f64,
  pub short: f64,
  pub essay: f64,
}

impl TypeScores {
  pub fn from_config(cfg: &ExamConfig) -> Self {
    Self {
      mcq: or_fallback(cfg.mcq_score, 0.25),
      tf: or_fallback(cfg.tf_score, 1.0),
      short: or_fallback(cfg.short_score, 0.25),
      essay: or_fallback(cfg.essay_score, 2.0),
    }
  }

  pub fn get(&self, ty: QuestionType) -> f64 {
    match ty {
      QuestionType::Mcq => self.mcq,
      QuestionType::Tf => self.tf,
      QuestionType::Short => self.short,
      QuestionType::Essay => self.essay,
    }
  }
}

fn or_fallback(score: f64, fallback: f64) -> f64 {
  if score.is_finite() && score != 0.0 { score } else { fallback }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowTotals {
  pub know: u32,
  pub understand: u32,
  pub apply: u32,
  pub points: f64,
  pub percentage: f64,
}

pub fn row_totals(row: &MatrixRow, scores: &TypeScores) -> RowTotals {
  let mut levels = LevelCounts::default();
  let mut points = 0.0;
  for ty in QuestionType::ALL {
    let cells = row.cells(ty);
    levels.add(cells);
    points += f64::from(cells.sum()) * scores.get(ty);
  }
  RowTotals {
    know: levels.recognition,
    understand: levels.understanding,
    apply: levels.application,
    points,
    percentage: (points / 10.0) * 100.0,
  }
}

/// Refresh the derived fields of a row in place.
pub fn recompute(row: &mut MatrixRow, scores: &TypeScores) {
  let t = row_totals(row, scores);
  row.total_know = t.know;
  row.total_understand = t.understand;
  row.total_apply = t.apply;
  row.percentage = t.percentage;
}

/// Config-stage live preview: TNKQ subtotal and the essay remainder up to 10.
/// Uses the raw configured scores, no fallbacks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSplit {
  pub objective_score: f64,
  pub essay_score: f64,
}

pub fn score_split(cfg: &ExamConfig) -> ScoreSplit {
  let objective = f64::from(cfg.mcq_count) * cfg.mcq_score
    + f64::from(cfg.tf_count) * cfg.tf_score
    + f64::from(cfg.short_count) * cfg.short_score;
  ScoreSplit { objective_score: objective, essay_score: 10.0 - objective }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypePoints {
  pub mcq: f64,
  pub tf: f64,
  pub short: f64,
  pub essay: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelTargets {
  pub know: u32,
  pub understand: u32,
  pub apply: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelShare {
  pub know: f64,
  pub understand: f64,
  pub apply: f64,
}

/// Footer row of the matrix table. Discrepancies against `targets` are shown,
/// never corrected.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixFooter {
  pub mcq: LevelCounts,
  pub tf: LevelCounts,
  pub short: LevelCounts,
  pub essay: LevelCounts,
  pub total_know: u32,
  pub total_understand: u32,
  pub total_apply: u32,
  pub percentage: f64,
  pub points: TypePoints,
  pub total_points: f64,
  /// Share of question count per level, in percent of all allocated questions.
  pub level_share: LevelShare,
  pub targets: LevelTargets,
}

pub fn footer(rows: &[MatrixRow], cfg: &ExamConfig) -> MatrixFooter {
  let scores = TypeScores::from_config(cfg);
  let mut f = MatrixFooter::default();
  for row in rows {
    f.mcq.add(&row.mcq);
    f.tf.add(&row.tf);
    f.short.add(&row.short);
    f.essay.add(&row.essay);
    f.total_know += row.total_know;
    f.total_understand += row.total_understand;
    f.total_apply += row.total_apply;
    f.percentage += row.percentage;
  }
  f.points = TypePoints {
    mcq: f64::from(f.mcq.sum()) * scores.mcq,
    tf: f64::from(f.tf.sum()) * scores.tf,
    short: f64::from(f.short.sum()) * scores.short,
    essay: f64::from(f.essay.sum()) * scores.essay,
  };
  f.total_points = f.points.mcq + f.points.tf + f.points.short + f.points.essay;

  let all = f.total_know + f.total_understand + f.total_apply;
  if all > 0 {
    let pct = |n: u32| f64::from(n) / f64::from(all) * 100.0;
    f.level_share = LevelShare {
      know: pct(f.total_know),
      understand: pct(f.total_understand),
      apply: pct(f.total_apply),
    };
  }
  f.targets = LevelTargets {
    know: cfg.percent_know,
    understand: cfg.percent_understand,
    apply: cfg.percent_apply,
  };
  f
}

/// First index of each run of equal topics, with the run length. Used to merge
/// the topic column in the matrix and specification tables.
pub fn topic_spans(rows: &[MatrixRow]) -> Vec<Option<usize>> {
  let mut spans = vec![None; rows.len()];
  let mut i = 0;
  while i < rows.len() {
    let mut j = i + 1;
    while j < rows.len() && rows[j].topic == rows[i].topic {
      j += 1;
    }
    spans[i] = Some(j - i);
    i = j;
  }
  spans
}

//! Progress aggregator: overall score, level label and practice streak derived from
//! submission history, plus the planner's weekly view. Everything is computed on
//! demand from raw history; nothing here is stored.
//!
//! Calendar days are UTC dates.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::domain::{LevelLabel, Modality, PlannerEntry, SubmissionRecord};

/// Number of most recent scored submissions considered for the overall score.
pub const RECENT_SCORED: usize = 12;
pub const WEEKLY_GOAL_MINUTES: u32 = 60;
pub const STREAK_WINDOW_DAYS: i64 = 7;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Progress {
  /// `None` means no data; never coerced to 0.
  pub overall_score: Option<u32>,
  pub level: LevelLabel,
  pub streak: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DayMark {
  pub date: NaiveDate,
  pub done: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeeklyPlan {
  pub week_start: NaiveDate,
  pub week_end: NaiveDate,
  pub minutes: u32,
  pub goal: u32,
}

pub fn aggregate(history: &[SubmissionRecord], today: NaiveDate) -> Progress {
  let overall_score = overall_score(history);
  Progress {
    overall_score,
    level: LevelLabel::from_overall(overall_score),
    streak: streak(history, today),
  }
}

/// Average of the positive scores among the 12 most recent scored submissions,
/// rounded half-to-even. Zero scores are failed attempts and do not count.
pub fn overall_score(history: &[SubmissionRecord]) -> Option<u32> {
  let mut scored: Vec<&SubmissionRecord> = history.iter().filter(|s| s.score.is_some()).collect();
  scored.sort_by(|a, b| b.created_at.cmp(&a.created_at));

  let positive: Vec<f64> = scored
    .iter()
    .take(RECENT_SCORED)
    .filter_map(|s| s.score)
    .filter(|v| v.is_finite() && *v > 0.0)
    .collect();
  if positive.is_empty() {
    return None;
  }
  let mean = positive.iter().sum::<f64>() / positive.len() as f64;
  Some(mean.round_ties_even() as u32)
}

fn practiced_days(history: &[SubmissionRecord]) -> HashSet<NaiveDate> {
  history.iter().map(|s| s.created_at.date_naive()).collect()
}

/// Consecutive practice days ending today, or yesterday when today has no
/// submission yet (the streak stays alive until the day is over).
pub fn streak(history: &[SubmissionRecord], today: NaiveDate) -> u32 {
  let days = practiced_days(history);
  let mut day = if days.contains(&today) { today } else { today - Duration::days(1) };
  let mut count = 0;
  while days.contains(&day) {
    count += 1;
    day -= Duration::days(1);
  }
  count
}

/// Last seven days, oldest first, each marked with whether any practice happened.
pub fn streak_window(history: &[SubmissionRecord], today: NaiveDate) -> Vec<DayMark> {
  let days = practiced_days(history);
  (0..STREAK_WINDOW_DAYS)
    .rev()
    .map(|back| {
      let date = today - Duration::days(back);
      DayMark { date, done: days.contains(&date) }
    })
    .collect()
}

/// Monday..=Sunday of the week containing `today`.
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
  let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
  (start, start + Duration::days(6))
}

/// Planned minutes within the current week. Planner entries are intentions,
/// so this is reported next to the streak and never merged with it.
pub fn weekly_plan(entries: &[PlannerEntry], today: NaiveDate) -> WeeklyPlan {
  let (week_start, week_end) = week_bounds(today);
  let minutes = entries
    .iter()
    .filter(|e| e.date >= week_start && e.date <= week_end)
    .map(|e| e.minutes)
    .sum();
  WeeklyPlan { week_start, week_end, minutes, goal: WEEKLY_GOAL_MINUTES }
}

/// e.g. `Mon 2026-10-19 — 30 min Writing`
pub fn next_session_text(entry: &PlannerEntry) -> String {
  format!("{} — {} min {}", entry.date.format("%a %Y-%m-%d"), entry.minutes, entry.activity)
}

/// Submission count per modality; every modality is present.
pub fn modality_counts(history: &[SubmissionRecord]) -> BTreeMap<String, usize> {
  let mut counts: BTreeMap<String, usize> = Modality::ALL.iter().map(|m| (m.to_string(), 0)).collect();
  for s in history {
    *counts.entry(s.modality.to_string()).or_default() += 1;
  }
  counts
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{EvaluationResult, ProficiencyLevel, SubmissionContent};
  use chrono::{TimeZone, Utc};

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
  }

  fn sub(days_ago: i64, minute: u32, score: Option<f64>) -> SubmissionRecord {
    let day = today() - Duration::days(days_ago);
    let at = Utc.from_utc_datetime(&day.and_hms_opt(10, minute, 0).unwrap());
    let mut rec = SubmissionRecord::evaluated(
      "u1",
      SubmissionContent::Writing { essay: String::new(), prompt: None },
      &EvaluationResult::new(0.0, vec![]),
      at,
    );
    rec.score = score;
    rec
  }

  #[test]
  fn streak_stops_at_first_gap() {
    let h = vec![sub(0, 0, Some(70.0)), sub(1, 0, Some(70.0)), sub(2, 0, Some(0.0)), sub(4, 0, Some(70.0))];
    assert_eq!(streak(&h, today()), 3);
  }

  #[test]
  fn streak_anchors_on_yesterday() {
    assert_eq!(streak(&[sub(1, 0, Some(60.0))], today()), 1);
    assert_eq!(streak(&[sub(1, 0, None), sub(2, 0, None)], today()), 2);
    assert_eq!(streak(&[sub(2, 0, Some(60.0))], today()), 0);
  }

  #[test]
  fn empty_history_has_no_streak_and_no_data() {
    let p = aggregate(&[], today());
    assert_eq!(p.streak, 0);
    assert_eq!(p.overall_score, None);
    assert_eq!(p.level, LevelLabel::NoData);
  }

  #[test]
  fn zero_scores_are_excluded_from_average() {
    let h = vec![sub(0, 1, Some(80.0)), sub(0, 2, Some(0.0)), sub(1, 0, Some(60.0)), sub(1, 1, None)];
    assert_eq!(overall_score(&h), Some(70));
  }

  #[test]
  fn only_the_twelve_most_recent_scored_count() {
    // 12 recent zero scores hide an older good one.
    let mut h: Vec<_> = (0..12).map(|m| sub(0, m, Some(0.0))).collect();
    h.push(sub(3, 0, Some(95.0)));
    let p = aggregate(&h, today());
    assert_eq!(p.overall_score, None);
    assert_eq!(p.level, LevelLabel::NoData);

    // Unscored records don't take a slot.
    let mut h: Vec<_> = (0..11).map(|m| sub(0, m, Some(50.0))).collect();
    h.extend((20..30).map(|m| sub(0, m, None)));
    h.push(sub(1, 0, Some(74.0)));
    h.push(sub(2, 0, Some(100.0)));
    assert_eq!(overall_score(&h), Some(52));
  }

  #[test]
  fn rounding_is_half_to_even() {
    assert_eq!(overall_score(&[sub(0, 0, Some(62.0)), sub(0, 1, Some(63.0))]), Some(62));
    assert_eq!(overall_score(&[sub(0, 0, Some(63.0)), sub(0, 1, Some(64.0))]), Some(64));
  }

  #[test]
  fn level_follows_overall_score() {
    let p = aggregate(&[sub(0, 0, Some(78.0))], today());
    assert_eq!(p.level, LevelLabel::Level(ProficiencyLevel::C1));
    assert_eq!(p.streak, 1);
  }

  #[test]
  fn window_lists_seven_days_oldest_first() {
    let w = streak_window(&[sub(0, 0, None), sub(6, 0, None), sub(7, 0, None)], today());
    assert_eq!(w.len(), 7);
    assert_eq!(w[0].date, today() - Duration::days(6));
    assert!(w[0].done && w[6].done);
    assert!(w[1..6].iter().all(|d| !d.done));
  }

  #[test]
  fn weekly_plan_covers_monday_to_sunday() {
    // 2026-10-18 is a Sunday.
    let (start, end) = week_bounds(today());
    assert_eq!(start, NaiveDate::from_ymd_opt(2026, 10, 12).unwrap());
    assert_eq!(end, today());

    let entry = |d: u32, minutes| PlannerEntry {
      user_id: "u1".into(),
      date: NaiveDate::from_ymd_opt(2026, 10, d).unwrap(),
      activity: "Listening".into(),
      minutes,
    };
    let plan = weekly_plan(&[entry(11, 40), entry(12, 20), entry(18, 25), entry(19, 30)], today());
    assert_eq!(plan.minutes, 45);
    assert_eq!(plan.goal, 60);
  }

  #[test]
  fn next_session_is_formatted() {
    let e = PlannerEntry {
      user_id: "u1".into(),
      date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
      activity: "Writing".into(),
      minutes: 30,
    };
    assert_eq!(next_session_text(&e), "Mon 2026-10-19 — 30 min Writing");
  }

  #[test]
  fn counts_include_every_modality() {
    let c = modality_counts(&[sub(0, 0, None), sub(1, 0, None)]);
    assert_eq!(c["WRITING"], 2);
    assert_eq!(c["SPEAKING"], 0);
    assert_eq!(c["LISTENING"], 0);
  }
}

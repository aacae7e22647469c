use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalog::Catalog;
use crate::models::{StudyPlan, Subject};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    pub total: u32,
    pub completed: u32,
}

impl ProgressCounts {
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((f64::from(self.completed) / f64::from(self.total)) * 100.0).round() as u32
    }

    pub fn combine(self, other: ProgressCounts) -> ProgressCounts {
        ProgressCounts {
            total: self.total + other.total,
            completed: self.completed + other.completed,
        }
    }
}

/// Unit counts for one subject. Topics with no subtopics count as one unit;
/// otherwise every nested subtopic at any depth is a unit.
pub fn subject_counts(subject: &Subject) -> ProgressCounts {
    subject
        .topics
        .iter()
        .fold(ProgressCounts::default(), |acc, topic| ProgressCounts {
            total: acc.total + topic.unit_count(),
            completed: acc.completed + topic.completed_count(),
        })
}

pub fn tree_counts(subjects: &[Subject]) -> ProgressCounts {
    subjects
        .iter()
        .map(subject_counts)
        .fold(ProgressCounts::default(), ProgressCounts::combine)
}

/// Question totals: every catalog question is a unit; completed is the
/// overlap of the stored set with catalog ids, so stale ids in storage are
/// harmless.
pub fn question_counts(catalog: &Catalog, completed: &BTreeSet<String>) -> ProgressCounts {
    let total = catalog.question_count() as u32;
    let done = catalog
        .questions()
        .filter(|q| completed.contains(&q.question_id))
        .count() as u32;
    ProgressCounts {
        total,
        completed: done,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaysRemaining {
    pub total_days: u32,
    pub remaining_days: u32,
}

/// Combined figure across both subsystems: a straight sum of every
/// contributor's day count (overlapping windows are not deduplicated),
/// elapsed measured from the earliest contributing start date.
pub fn days_remaining(
    subjects: &[Subject],
    plan: Option<&StudyPlan>,
    today: NaiveDate,
) -> DaysRemaining {
    let mut total_days: u32 = 0;
    let mut earliest_start: Option<NaiveDate> = None;

    for subject in subjects {
        if subject.schedule.total_days == 0 {
            continue;
        }
        total_days += subject.schedule.total_days;
        let start = subject.schedule.start_date;
        earliest_start = Some(earliest_start.map_or(start, |e| e.min(start)));
    }
    if let Some(plan) = plan {
        total_days += plan.number_of_days;
        earliest_start = Some(earliest_start.map_or(plan.start_date, |e| e.min(plan.start_date)));
    }

    let Some(earliest) = earliest_start else {
        return DaysRemaining::default();
    };

    let elapsed = (today - earliest).num_days().max(0) as u32;
    DaysRemaining {
        total_days,
        remaining_days: total_days.saturating_sub(elapsed),
    }
}

/// The plan-only parallel figure.
pub fn plan_days_remaining(plan: &StudyPlan, today: NaiveDate) -> DaysRemaining {
    let elapsed = (today - plan.start_date).num_days().max(0) as u32;
    DaysRemaining {
        total_days: plan.number_of_days,
        remaining_days: plan.number_of_days.saturating_sub(elapsed),
    }
}

/// Current streak: consecutive calendar days, walked backward from the most
/// recent logged date, whose logged completions meet the per-day target.
/// Stops at the first calendar gap or missed target. The source app folded
/// the log in ascending order, which measures a prefix run instead; the
/// backward walk is the deliberate fix.
pub fn current_streak(plan: &StudyPlan) -> u32 {
    if plan.questions_per_day == 0 {
        return 0;
    }

    let mut days: Vec<(NaiveDate, usize)> = plan
        .completed_questions_by_date
        .iter()
        .filter_map(|(key, ids)| key.parse::<NaiveDate>().ok().map(|d| (d, ids.len())))
        .collect();
    days.sort_unstable_by_key(|&(d, _)| d);

    let mut streak = 0u32;
    let mut expected: Option<NaiveDate> = None;
    for &(day, count) in days.iter().rev() {
        if let Some(exp) = expected {
            if day != exp {
                break;
            }
        }
        if count < plan.questions_per_day as usize {
            break;
        }
        streak += 1;
        expected = day.checked_sub_days(Days::new(1));
    }
    streak
}

use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::models::{StudyPlan, Subject};

fn div_ceil(numerator: usize, denominator: usize) -> usize {
    // callers guarantee denominator >= 1
    (numerator + denominator - 1) / denominator
}

/// Distributes a subject's pending subtopics evenly across its schedule
/// window, writing a `scheduled_date` onto each.
///
/// Only direct subtopics of topics are scheduled; deeper nesting is tracked
/// for completion but not dated. Completed subtopics are skipped and keep any
/// stale date they already carry. `schedule.end_date` is rewritten to the
/// last date actually used, which can fall short of the nominal window when
/// the per-day quota rounds up.
pub fn generate_subject_plan(subject: &mut Subject) -> Result<()> {
    if subject.schedule.total_days == 0 {
        return Err(Error::invalid_input(
            "schedule has no days; set a start date and day count first",
        ));
    }

    let pending: usize = subject
        .topics
        .iter()
        .flat_map(|t| t.subtopics.iter())
        .filter(|st| !st.completed)
        .count();

    if pending == 0 {
        subject.schedule.end_date = subject.schedule.start_date;
        return Ok(());
    }

    let per_day = div_ceil(pending, subject.schedule.total_days as usize);
    debug!(
        subject = %subject.id,
        pending,
        per_day,
        total_days = subject.schedule.total_days,
        "generating subject plan"
    );

    let mut cursor = subject.schedule.start_date;
    let mut assigned_today = 0usize;
    let mut last_used = subject.schedule.start_date;

    for topic in &mut subject.topics {
        for subtopic in &mut topic.subtopics {
            if subtopic.completed {
                continue;
            }
            if assigned_today == per_day {
                cursor = cursor + Days::new(1);
                assigned_today = 0;
            }
            subtopic.scheduled_date = Some(cursor);
            last_used = cursor;
            assigned_today += 1;
        }
    }

    subject.schedule.end_date = last_used;
    Ok(())
}

/// Builds a fresh study plan for the question catalog: remaining questions
/// are grouped by section, each section gets a day allocation proportional to
/// its share of the remainder (independently rounded up, so allocations may
/// sum past `number_of_days`), and one date cursor advances monotonically
/// across all sections.
pub fn build_study_plan(
    catalog: &Catalog,
    completed: &BTreeSet<String>,
    start_date: NaiveDate,
    number_of_days: u32,
) -> Result<StudyPlan> {
    if number_of_days == 0 {
        return Err(Error::invalid_input("number of days must be at least 1"));
    }

    let remaining_by_section: Vec<Vec<&str>> = catalog
        .sections
        .iter()
        .map(|section| {
            section
                .questions()
                .filter(|q| !completed.contains(&q.question_id))
                .map(|q| q.question_id.as_str())
                .collect()
        })
        .collect();
    let total_remaining: usize = remaining_by_section.iter().map(Vec::len).sum();

    let mut assignments: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut cursor = start_date;
    let mut cursor_used = false;

    for section_questions in &remaining_by_section {
        let section_count = section_questions.len();
        if section_count == 0 {
            continue;
        }

        let share = section_count as f64 / total_remaining as f64 * f64::from(number_of_days);
        let section_days = (share.ceil() as usize).max(1);
        let per_day = div_ceil(section_count, section_days);
        debug!(section_count, section_days, per_day, "packing section");

        // the cursor is shared across sections; a new section starts on the
        // day after the previous section's last used day
        if cursor_used {
            cursor = cursor + Days::new(1);
        }

        let mut filled_today = 0usize;
        for &question_id in section_questions {
            if filled_today == per_day {
                cursor = cursor + Days::new(1);
                filled_today = 0;
            }
            assignments
                .entry(cursor.to_string())
                .or_default()
                .push(question_id.to_string());
            filled_today += 1;
            cursor_used = true;
        }
    }

    let questions_per_day = if total_remaining == 0 {
        0
    } else {
        div_ceil(total_remaining, number_of_days as usize) as u32
    };

    Ok(StudyPlan {
        start_date,
        number_of_days,
        questions_per_day,
        question_assignments: assignments,
        completed_questions_by_date: BTreeMap::new(),
    })
}

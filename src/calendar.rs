use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{StudyPlan, SubTopic, Subject};

/// One topic's matches for a queried day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTopics<'a> {
    pub subject_id: &'a str,
    pub subject_title: &'a str,
    pub topic_id: &'a str,
    pub topic_title: &'a str,
    pub subtopics: Vec<&'a SubTopic>,
}

/// Filters every topic's direct subtopics to those scheduled on `date`.
/// Topics with no match are omitted; an empty subject list yields an empty
/// result.
pub fn topics_for_date<'a>(subjects: &'a [Subject], date: NaiveDate) -> Vec<DayTopics<'a>> {
    let mut out = Vec::new();
    for subject in subjects {
        for topic in &subject.topics {
            let matched: Vec<&SubTopic> = topic
                .subtopics
                .iter()
                .filter(|st| st.scheduled_date == Some(date))
                .collect();
            if !matched.is_empty() {
                out.push(DayTopics {
                    subject_id: &subject.id,
                    subject_title: &subject.title,
                    topic_id: &topic.id,
                    topic_title: &topic.title,
                    subtopics: matched,
                });
            }
        }
    }
    out
}

/// Question ids assigned to `date`, empty when no plan exists or the day
/// received nothing.
pub fn questions_for_date(plan: Option<&StudyPlan>, date: NaiveDate) -> &[String] {
    plan.and_then(|p| p.question_assignments.get(&date.to_string()))
        .map_or(&[], Vec::as_slice)
}

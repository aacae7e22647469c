use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A leaf (or recursively nested) study item. Completion is settable at any
/// depth; nesting below the first level never cascades automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTopic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub subtopics: Vec<SubTopic>,
    #[serde(default)]
    pub url: Option<String>,
}

impl SubTopic {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            completed: false,
            scheduled_date: None,
            subtopics: Vec::new(),
            url: None,
        }
    }

    /// Counts this node and every nested descendant as one unit each.
    pub fn unit_count(&self) -> u32 {
        1 + self.subtopics.iter().map(SubTopic::unit_count).sum::<u32>()
    }

    pub fn completed_count(&self) -> u32 {
        u32::from(self.completed)
            + self
                .subtopics
                .iter()
                .map(SubTopic::completed_count)
                .sum::<u32>()
    }

    /// Depth-first search by id, any depth.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut SubTopic> {
        if self.id == id {
            return Some(self);
        }
        self.subtopics.iter_mut().find_map(|st| st.find_mut(id))
    }

    fn clear_recursive(&mut self) {
        self.completed = false;
        self.scheduled_date = None;
        for st in &mut self.subtopics {
            st.clear_recursive();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    /// Legacy bulk-scheduling field. Persisted for round-trip fidelity; the
    /// scheduler only ever writes per-subtopic dates.
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub subtopics: Vec<SubTopic>,
}

impl Topic {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            completed: false,
            scheduled_date: None,
            subtopics: Vec::new(),
        }
    }

    /// A topic with no subtopics counts as one unit itself; otherwise every
    /// nested subtopic is a unit and the topic contributes none of its own.
    pub fn unit_count(&self) -> u32 {
        if self.subtopics.is_empty() {
            1
        } else {
            self.subtopics.iter().map(SubTopic::unit_count).sum()
        }
    }

    pub fn completed_count(&self) -> u32 {
        if self.subtopics.is_empty() {
            u32::from(self.completed)
        } else {
            self.subtopics.iter().map(SubTopic::completed_count).sum()
        }
    }

    /// Sets the topic's flag and forces every direct subtopic to match.
    /// Grandchildren keep their own flags.
    pub fn set_completed_cascade(&mut self, completed: bool) {
        self.completed = completed;
        for st in &mut self.subtopics {
            st.completed = completed;
        }
    }

    /// One-way derivation run after a direct subtopic toggles: complete iff
    /// there is at least one subtopic and all direct subtopics are complete.
    pub fn derive_completed(&mut self) {
        self.completed = !self.subtopics.is_empty() && self.subtopics.iter().all(|st| st.completed);
    }

    pub fn clear_recursive(&mut self) {
        self.completed = false;
        self.scheduled_date = None;
        for st in &mut self.subtopics {
            st.clear_recursive();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub start_date: NaiveDate,
    /// 0 is the "unscheduled" sentinel.
    #[serde(default)]
    pub total_days: u32,
    pub end_date: NaiveDate,
}

impl Schedule {
    /// An unscheduled placeholder anchored on the given day.
    pub fn unscheduled(today: NaiveDate) -> Self {
        Self {
            start_date: today,
            total_days: 0,
            end_date: today,
        }
    }

    /// Nominal window: `start + total_days - 1`, or `start` when unscheduled.
    /// The subject scheduler later overwrites `end_date` with the last date
    /// actually used.
    pub fn with_window(start_date: NaiveDate, total_days: u32) -> Self {
        let end_date = if total_days == 0 {
            start_date
        } else {
            start_date + chrono::Days::new(u64::from(total_days) - 1)
        };
        Self {
            start_date,
            total_days,
            end_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<Topic>,
    pub schedule: Schedule,
}

impl Subject {
    pub fn new(id: impl Into<String>, title: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            icon: String::from("book"),
            description: String::new(),
            topics: Vec::new(),
            schedule: Schedule::unscheduled(today),
        }
    }

    pub fn find_topic_mut(&mut self, topic_id: &str) -> Option<&mut Topic> {
        self.topics.iter_mut().find(|t| t.id == topic_id)
    }

    /// Clears completion and scheduling at every depth without deleting
    /// structure, and zeroes the schedule back to the unscheduled sentinel.
    pub fn reset(&mut self, today: NaiveDate) {
        for topic in &mut self.topics {
            topic.clear_recursive();
        }
        self.schedule = Schedule::unscheduled(today);
    }
}

/// The flat-question scheduler's persisted state. Replaced wholesale by each
/// `plan create`; never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub start_date: NaiveDate,
    pub number_of_days: u32,
    /// Stored global figure: `ceil(remaining / number_of_days)`. Day packing
    /// uses a per-section figure instead; both are kept on purpose.
    pub questions_per_day: u32,
    /// ISO date -> ordered question ids; keys are exactly the days that
    /// received at least one assignment.
    #[serde(default)]
    pub question_assignments: BTreeMap<String, Vec<String>>,
    /// Append-only log of ids marked done while each date was "today". Feeds
    /// the streak only; never used to re-derive totals.
    #[serde(default)]
    pub completed_questions_by_date: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

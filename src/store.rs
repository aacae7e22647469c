use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

use crate::catalog::{Catalog, Question};
use crate::error::{Error, Result};
use crate::models::{Schedule, StudyPlan, SubTopic, Subject, Topic};
use crate::scheduler;

const KEY_SUBJECTS: &str = "subjects";
const KEY_COMPLETED: &str = "completedQuestions";
const KEY_REVISION: &str = "revisionList";
const KEY_STUDY_PLAN: &str = "studyPlan";

const SEED_SUBJECTS: &str = include_str!("data/subjects.json");

/// Persistence port: a string key-value namespace, one JSON blob per key.
pub trait Storage {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// SQLite-backed storage: a single kv table, blobs keyed by fixed names.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-memory test double for the persistence port.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
    entries: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Seed shape: subjects ship without schedules; each gets the unscheduled
/// sentinel anchored on the day the store is seeded.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedSubject {
    id: String,
    title: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    topics: Vec<Topic>,
}

/// The state root. Every action validates first, mutates the in-memory value
/// second, and persists third; a failed write is logged and swallowed so the
/// in-memory state stays authoritative for the rest of the process.
pub struct Store<S: Storage> {
    storage: S,
    subjects: Vec<Subject>,
    completed_questions: BTreeSet<String>,
    revision_list: BTreeSet<String>,
    study_plan: Option<StudyPlan>,
}

impl<S: Storage> Store<S> {
    /// Loads each blob with defensive recovery: a missing key, unreadable
    /// storage, or malformed JSON falls back to the empty default.
    pub fn open(storage: S) -> Self {
        let subjects = load_or_default(&storage, KEY_SUBJECTS);
        let completed_questions = load_or_default(&storage, KEY_COMPLETED);
        let revision_list = load_or_default(&storage, KEY_REVISION);
        let study_plan = load_or_default(&storage, KEY_STUDY_PLAN);
        Self {
            storage,
            subjects,
            completed_questions,
            revision_list,
            study_plan,
        }
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn subject(&self, id: &str) -> Result<&Subject> {
        self.subjects
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found("subject", id))
    }

    pub fn completed_questions(&self) -> &BTreeSet<String> {
        &self.completed_questions
    }

    pub fn revision_list(&self) -> &BTreeSet<String> {
        &self.revision_list
    }

    pub fn study_plan(&self) -> Option<&StudyPlan> {
        self.study_plan.as_ref()
    }

    /// Populates the subject tree from the bundled seed set if the store is
    /// empty. Returns whether seeding happened.
    pub fn seed_if_empty(&mut self, today: NaiveDate) -> Result<bool> {
        if !self.subjects.is_empty() {
            return Ok(false);
        }
        let seeds: Vec<SeedSubject> = serde_json::from_str(SEED_SUBJECTS)
            .map_err(|e| Error::Catalog(format!("seed subjects: {e}")))?;
        self.subjects = seeds
            .into_iter()
            .map(|seed| Subject {
                id: seed.id,
                title: seed.title,
                icon: seed.icon,
                description: seed.description,
                topics: seed.topics,
                schedule: Schedule::unscheduled(today),
            })
            .collect();
        self.persist_subjects();
        Ok(true)
    }

    pub fn add_subject(
        &mut self,
        title: &str,
        icon: Option<&str>,
        description: Option<&str>,
        today: NaiveDate,
    ) -> Result<String> {
        if title.trim().is_empty() {
            return Err(Error::invalid_input("subject title must not be empty"));
        }
        let id = self.unique_subject_id(title);
        let mut subject = Subject::new(id.clone(), title.trim(), today);
        if let Some(icon) = icon {
            subject.icon = icon.to_string();
        }
        if let Some(description) = description {
            subject.description = description.to_string();
        }
        self.subjects.push(subject);
        self.persist_subjects();
        Ok(id)
    }

    pub fn remove_subject(&mut self, id: &str) -> Result<()> {
        let before = self.subjects.len();
        self.subjects.retain(|s| s.id != id);
        if self.subjects.len() == before {
            return Err(Error::not_found("subject", id));
        }
        self.persist_subjects();
        Ok(())
    }

    pub fn reset_subject(&mut self, id: &str, today: NaiveDate) -> Result<()> {
        let subject = self.subject_mut(id)?;
        subject.reset(today);
        self.persist_subjects();
        Ok(())
    }

    pub fn add_topic(&mut self, subject_id: &str, title: &str) -> Result<String> {
        if title.trim().is_empty() {
            return Err(Error::invalid_input("topic title must not be empty"));
        }
        let subject = self.subject_mut(subject_id)?;
        let id = unique_child_id(
            &subject.id,
            title,
            &subject.topics.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
        );
        subject.topics.push(Topic::new(id.clone(), title.trim()));
        self.persist_subjects();
        Ok(id)
    }

    /// Adds a subtopic under a topic, or nested under an existing subtopic of
    /// that topic when `parent` is given.
    pub fn add_subtopic(
        &mut self,
        subject_id: &str,
        topic_id: &str,
        title: &str,
        parent: Option<&str>,
        url: Option<String>,
    ) -> Result<String> {
        if title.trim().is_empty() {
            return Err(Error::invalid_input("subtopic title must not be empty"));
        }
        let subject = self.subject_mut(subject_id)?;
        let topic = subject
            .find_topic_mut(topic_id)
            .ok_or_else(|| Error::not_found("topic", topic_id))?;

        let (container_id, siblings) = match parent {
            None => (
                topic.id.clone(),
                topic.subtopics.iter().map(|st| st.id.clone()).collect::<Vec<_>>(),
            ),
            Some(parent_id) => {
                let parent_node = topic
                    .subtopics
                    .iter_mut()
                    .find_map(|st| st.find_mut(parent_id))
                    .ok_or_else(|| Error::not_found("subtopic", parent_id))?;
                (
                    parent_node.id.clone(),
                    parent_node.subtopics.iter().map(|st| st.id.clone()).collect(),
                )
            }
        };
        let id = unique_child_id(&container_id, title, &siblings);

        let mut subtopic = SubTopic::new(id.clone(), title.trim());
        subtopic.url = url;
        match parent {
            None => topic.subtopics.push(subtopic),
            Some(parent_id) => {
                // lookup succeeded above; the node is still there
                if let Some(parent_node) =
                    topic.subtopics.iter_mut().find_map(|st| st.find_mut(parent_id))
                {
                    parent_node.subtopics.push(subtopic);
                }
            }
        }
        self.persist_subjects();
        Ok(id)
    }

    /// Toggles a topic and cascades the new state onto its direct subtopics.
    /// Returns the new state.
    pub fn toggle_topic(&mut self, subject_id: &str, topic_id: &str) -> Result<bool> {
        let subject = self.subject_mut(subject_id)?;
        let topic = subject
            .find_topic_mut(topic_id)
            .ok_or_else(|| Error::not_found("topic", topic_id))?;
        let next = !topic.completed;
        topic.set_completed_cascade(next);
        self.persist_subjects();
        Ok(next)
    }

    /// Toggles a subtopic anywhere in the subject's tree. When the toggled
    /// node is a direct child of its topic, the topic's own completion is
    /// re-derived; deeper toggles leave the topic flag alone.
    pub fn toggle_subtopic(&mut self, subject_id: &str, subtopic_id: &str) -> Result<bool> {
        let subject = self.subject_mut(subject_id)?;
        let mut toggled = None;
        for topic in &mut subject.topics {
            let is_direct = topic.subtopics.iter().any(|st| st.id == subtopic_id);
            if let Some(node) = topic.subtopics.iter_mut().find_map(|st| st.find_mut(subtopic_id)) {
                node.completed = !node.completed;
                toggled = Some(node.completed);
                if is_direct {
                    topic.derive_completed();
                }
                break;
            }
        }
        match toggled {
            Some(next) => {
                self.persist_subjects();
                Ok(next)
            }
            None => Err(Error::not_found("subtopic", subtopic_id)),
        }
    }

    /// Sets the subject's schedule window and regenerates its day plan.
    pub fn schedule_subject(
        &mut self,
        subject_id: &str,
        start_date: NaiveDate,
        total_days: u32,
    ) -> Result<()> {
        if total_days == 0 {
            return Err(Error::invalid_input("day count must be at least 1"));
        }
        let subject = self.subject_mut(subject_id)?;
        // compute into a copy and swap in whole, so a failed generation
        // leaves the stored subject untouched
        let mut next = subject.clone();
        next.schedule = Schedule::with_window(start_date, total_days);
        scheduler::generate_subject_plan(&mut next)?;
        *subject = next;
        self.persist_subjects();
        Ok(())
    }

    /// Builds and swaps in a fresh study plan, replacing any prior plan
    /// wholesale.
    pub fn create_study_plan(
        &mut self,
        catalog: &Catalog,
        start_date: NaiveDate,
        number_of_days: u32,
    ) -> Result<()> {
        let plan = scheduler::build_study_plan(
            catalog,
            &self.completed_questions,
            start_date,
            number_of_days,
        )?;
        self.study_plan = Some(plan);
        self.persist_study_plan();
        Ok(())
    }

    pub fn reset_study_plan(&mut self) {
        self.study_plan = None;
        if let Err(e) = self.storage.remove(KEY_STUDY_PLAN) {
            warn!(key = KEY_STUDY_PLAN, error = %e, "failed to clear stored plan");
        }
    }

    /// Marks a catalog question done. Idempotent: re-marking neither errors
    /// nor duplicates the per-day log entry.
    pub fn mark_question_done(
        &mut self,
        catalog: &Catalog,
        question_id: &str,
        today: NaiveDate,
    ) -> Result<()> {
        if !catalog.contains(question_id) {
            return Err(Error::not_found("question", question_id));
        }
        let newly_done = self.completed_questions.insert(question_id.to_string());
        self.persist_completed();
        if newly_done {
            if let Some(plan) = &mut self.study_plan {
                plan.completed_questions_by_date
                    .entry(today.to_string())
                    .or_default()
                    .push(question_id.to_string());
                self.persist_study_plan();
            }
        }
        Ok(())
    }

    /// Removes a question from the completion set. The per-day log is
    /// append-only and is not rewritten.
    pub fn unmark_question_done(&mut self, question_id: &str) -> Result<()> {
        if !self.completed_questions.remove(question_id) {
            return Err(Error::not_found("completed question", question_id));
        }
        self.persist_completed();
        Ok(())
    }

    pub fn mark_revision(&mut self, catalog: &Catalog, question_id: &str) -> Result<()> {
        if !catalog.contains(question_id) {
            return Err(Error::not_found("question", question_id));
        }
        self.revision_list.insert(question_id.to_string());
        self.persist_revision();
        Ok(())
    }

    pub fn unmark_revision(&mut self, question_id: &str) -> Result<()> {
        if !self.revision_list.remove(question_id) {
            return Err(Error::not_found("revision question", question_id));
        }
        self.persist_revision();
        Ok(())
    }

    /// Uniform random pick: from the revision list when it has catalog
    /// members, otherwise from the non-completed remainder.
    pub fn random_pick<'a>(&self, catalog: &'a Catalog) -> Option<&'a Question> {
        use rand::seq::IteratorRandom;
        let mut rng = rand::thread_rng();

        let revision: Vec<&Question> = catalog
            .questions()
            .filter(|q| self.revision_list.contains(&q.question_id))
            .collect();
        if !revision.is_empty() {
            return revision.into_iter().choose(&mut rng);
        }
        catalog
            .questions()
            .filter(|q| !self.completed_questions.contains(&q.question_id))
            .choose(&mut rng)
    }

    fn subject_mut(&mut self, id: &str) -> Result<&mut Subject> {
        self.subjects
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found("subject", id))
    }

    fn unique_subject_id(&self, title: &str) -> String {
        let taken: Vec<String> = self.subjects.iter().map(|s| s.id.clone()).collect();
        unique_id(&slugify(title), &taken)
    }

    fn persist_subjects(&mut self) {
        persist(&mut self.storage, KEY_SUBJECTS, &self.subjects);
    }

    fn persist_completed(&mut self) {
        persist(&mut self.storage, KEY_COMPLETED, &self.completed_questions);
    }

    fn persist_revision(&mut self) {
        persist(&mut self.storage, KEY_REVISION, &self.revision_list);
    }

    fn persist_study_plan(&mut self) {
        if let Some(plan) = &self.study_plan {
            persist(&mut self.storage, KEY_STUDY_PLAN, plan);
        }
    }
}

fn load_or_default<T: serde::de::DeserializeOwned + Default>(storage: &dyn Storage, key: &str) -> T {
    match storage.read(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "stored blob is malformed, starting from default");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            warn!(key, error = %e, "storage unreadable, starting from default");
            T::default()
        }
    }
}

fn persist<T: serde::Serialize>(storage: &mut dyn Storage, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => {
            if let Err(e) = storage.write(key, &raw) {
                warn!(key, error = %e, "persist failed, keeping in-memory state");
            }
        }
        Err(e) => warn!(key, error = %e, "serialization failed, keeping in-memory state"),
    }
}

fn slugify(title: &str) -> String {
    let slug: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    let mut out = String::with_capacity(slug.len());
    let mut prev_dash = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash {
                out.push(c);
            }
            prev_dash = true;
        } else {
            out.push(c);
            prev_dash = false;
        }
    }
    if out.is_empty() {
        String::from("item")
    } else {
        out
    }
}

fn unique_id(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken.iter().any(|t| *t == candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn unique_child_id(parent_id: &str, title: &str, siblings: &[String]) -> String {
    unique_id(&format!("{parent_id}-{}", slugify(title)), siblings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn setup_store() -> Store<MemoryStorage> {
        let mut store = Store::open(MemoryStorage::default());
        store.seed_if_empty(date("2024-01-01")).unwrap();
        store
    }

    fn small_catalog() -> Catalog {
        Catalog::parse(
            r#"{"sections":[{"title":"Arrays","categories":[{"title":"All","questions":[
                {"questionId":"two-sum","questionHeading":"Two Sum"},
                {"questionId":"three-sum","questionHeading":"Three Sum"},
                {"questionId":"four-sum","questionHeading":"Four Sum"}]}]}]}"#,
        )
        .unwrap()
    }

    mod slug_tests {
        use super::*;

        #[test]
        fn slugify_lowercases_and_dashes() {
            assert_eq!(slugify("Operating Systems"), "operating-systems");
            assert_eq!(slugify("  C++ / Rust  "), "c-rust");
            assert_eq!(slugify("***"), "item");
        }

        #[test]
        fn unique_id_appends_numeric_suffix() {
            let taken = vec!["os".to_string(), "os-2".to_string()];
            assert_eq!(unique_id("os", &taken), "os-3");
            assert_eq!(unique_id("dbms", &taken), "dbms");
        }
    }

    mod seed_tests {
        use super::*;

        #[test]
        fn seeding_populates_subjects_once() {
            let mut store = Store::open(MemoryStorage::default());
            assert!(store.seed_if_empty(date("2024-01-01")).unwrap());
            assert!(!store.subjects().is_empty());
            assert!(!store.seed_if_empty(date("2024-01-01")).unwrap());
        }

        #[test]
        fn seeded_subjects_start_unscheduled() {
            let store = setup_store();
            for subject in store.subjects() {
                assert_eq!(subject.schedule.total_days, 0);
                assert_eq!(subject.schedule.start_date, date("2024-01-01"));
            }
        }
    }

    mod subject_action_tests {
        use super::*;

        #[test]
        fn add_and_remove_subject() {
            let mut store = setup_store();
            let id = store
                .add_subject("Compilers", Some("wrench"), None, date("2024-01-01"))
                .unwrap();
            assert_eq!(id, "compilers");
            assert!(store.subject("compilers").is_ok());

            store.remove_subject("compilers").unwrap();
            assert!(matches!(
                store.subject("compilers"),
                Err(Error::NotFound { .. })
            ));
        }

        #[test]
        fn duplicate_titles_get_suffixed_ids() {
            let mut store = setup_store();
            let a = store
                .add_subject("Compilers", None, None, date("2024-01-01"))
                .unwrap();
            let b = store
                .add_subject("Compilers", None, None, date("2024-01-01"))
                .unwrap();
            assert_eq!(a, "compilers");
            assert_eq!(b, "compilers-2");
        }

        #[test]
        fn remove_unknown_subject_is_not_found() {
            let mut store = setup_store();
            assert!(matches!(
                store.remove_subject("nope"),
                Err(Error::NotFound { .. })
            ));
        }

        #[test]
        fn blank_title_is_invalid() {
            let mut store = setup_store();
            assert!(matches!(
                store.add_subject("   ", None, None, date("2024-01-01")),
                Err(Error::InvalidInput(_))
            ));
        }

        #[test]
        fn add_topic_and_subtopic_with_nesting() {
            let mut store = setup_store();
            let sid = store
                .add_subject("Compilers", None, None, date("2024-01-01"))
                .unwrap();
            let tid = store.add_topic(&sid, "Parsing").unwrap();
            assert_eq!(tid, "compilers-parsing");

            let direct = store
                .add_subtopic(&sid, &tid, "Recursive descent", None, None)
                .unwrap();
            let nested = store
                .add_subtopic(&sid, &tid, "Pratt parsing", Some(&direct), None)
                .unwrap();
            assert_eq!(nested, format!("{direct}-pratt-parsing"));

            let subject = store.subject(&sid).unwrap();
            assert_eq!(subject.topics[0].subtopics[0].subtopics[0].id, nested);
        }

        #[test]
        fn add_subtopic_under_unknown_parent_is_not_found() {
            let mut store = setup_store();
            let sid = store
                .add_subject("Compilers", None, None, date("2024-01-01"))
                .unwrap();
            let tid = store.add_topic(&sid, "Parsing").unwrap();
            assert!(matches!(
                store.add_subtopic(&sid, &tid, "X", Some("ghost"), None),
                Err(Error::NotFound { .. })
            ));
        }
    }

    mod toggle_action_tests {
        use super::*;

        #[test]
        fn toggle_topic_cascades_to_direct_subtopics() {
            let mut store = setup_store();
            let on = store.toggle_topic("os", "os-scheduling").unwrap();
            assert!(on);

            let subject = store.subject("os").unwrap();
            let topic = subject.topics.iter().find(|t| t.id == "os-scheduling").unwrap();
            assert!(topic.completed);
            assert!(topic.subtopics.iter().all(|st| st.completed));
        }

        #[test]
        fn toggle_all_subtopics_derives_topic_completion() {
            let mut store = setup_store();
            store.toggle_subtopic("os", "os-deadlock-conditions").unwrap();
            assert!(!store
                .subject("os")
                .unwrap()
                .topics
                .iter()
                .find(|t| t.id == "os-deadlock")
                .unwrap()
                .completed);

            store.toggle_subtopic("os", "os-deadlock-avoidance").unwrap();
            assert!(store
                .subject("os")
                .unwrap()
                .topics
                .iter()
                .find(|t| t.id == "os-deadlock")
                .unwrap()
                .completed);
        }

        #[test]
        fn deep_toggle_does_not_rederive_topic() {
            let mut store = setup_store();
            // complete the topic first, then un-complete a grandchild
            store.toggle_topic("os", "os-memory").unwrap();
            store.toggle_subtopic("os", "os-memory-replacement-lru").unwrap();

            let subject = store.subject("os").unwrap();
            let topic = subject.topics.iter().find(|t| t.id == "os-memory").unwrap();
            // grandchild toggled on, topic flag untouched by the deep toggle
            assert!(topic.completed);
            assert!(topic.subtopics[2].subtopics[0].completed);
        }

        #[test]
        fn toggle_unknown_ids_are_not_found() {
            let mut store = setup_store();
            assert!(store.toggle_topic("os", "ghost").is_err());
            assert!(store.toggle_subtopic("os", "ghost").is_err());
            assert!(store.toggle_topic("ghost", "os-memory").is_err());
        }
    }

    mod schedule_action_tests {
        use super::*;

        #[test]
        fn schedule_subject_assigns_dates_and_persists() {
            let mut store = setup_store();
            store
                .schedule_subject("os", date("2024-01-01"), 3)
                .unwrap();

            let subject = store.subject("os").unwrap();
            assert_eq!(subject.schedule.total_days, 3);
            assert!(subject
                .topics
                .iter()
                .flat_map(|t| t.subtopics.iter())
                .all(|st| st.scheduled_date.is_some()));

            // survives a reload through the same storage
            let raw = store.storage.read(KEY_SUBJECTS).unwrap().unwrap();
            let reloaded: Vec<Subject> = serde_json::from_str(&raw).unwrap();
            let os = reloaded.iter().find(|s| s.id == "os").unwrap();
            assert_eq!(os.schedule.total_days, 3);
        }

        #[test]
        fn zero_days_is_rejected_before_mutation() {
            let mut store = setup_store();
            let err = store
                .schedule_subject("os", date("2024-01-01"), 0)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
            assert_eq!(store.subject("os").unwrap().schedule.total_days, 0);
        }

        #[test]
        fn reset_subject_returns_to_unscheduled() {
            let mut store = setup_store();
            store.schedule_subject("os", date("2024-01-01"), 5).unwrap();
            store.toggle_topic("os", "os-memory").unwrap();

            store.reset_subject("os", date("2024-02-01")).unwrap();

            let subject = store.subject("os").unwrap();
            assert_eq!(subject.schedule.total_days, 0);
            assert_eq!(subject.schedule.start_date, date("2024-02-01"));
            assert!(subject
                .topics
                .iter()
                .all(|t| !t.completed
                    && t.subtopics
                        .iter()
                        .all(|st| !st.completed && st.scheduled_date.is_none())));
        }
    }

    mod question_action_tests {
        use super::*;

        #[test]
        fn mark_done_appends_to_log_once() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store
                .create_study_plan(&catalog, date("2024-01-01"), 3)
                .unwrap();

            store
                .mark_question_done(&catalog, "two-sum", date("2024-01-01"))
                .unwrap();
            store
                .mark_question_done(&catalog, "two-sum", date("2024-01-01"))
                .unwrap();

            assert!(store.completed_questions().contains("two-sum"));
            let plan = store.study_plan().unwrap();
            assert_eq!(
                plan.completed_questions_by_date["2024-01-01"],
                vec!["two-sum"]
            );
        }

        #[test]
        fn mark_done_without_plan_skips_the_log() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store
                .mark_question_done(&catalog, "two-sum", date("2024-01-01"))
                .unwrap();
            assert!(store.completed_questions().contains("two-sum"));
            assert!(store.study_plan().is_none());
        }

        #[test]
        fn unknown_question_is_not_found() {
            let mut store = setup_store();
            let catalog = small_catalog();
            assert!(store
                .mark_question_done(&catalog, "ghost", date("2024-01-01"))
                .is_err());
            assert!(store.unmark_question_done("ghost").is_err());
        }

        #[test]
        fn undo_removes_from_set_but_keeps_the_log() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store
                .create_study_plan(&catalog, date("2024-01-01"), 3)
                .unwrap();
            store
                .mark_question_done(&catalog, "two-sum", date("2024-01-01"))
                .unwrap();
            store.unmark_question_done("two-sum").unwrap();

            assert!(!store.completed_questions().contains("two-sum"));
            assert_eq!(
                store.study_plan().unwrap().completed_questions_by_date["2024-01-01"],
                vec!["two-sum"]
            );
        }

        #[test]
        fn revision_set_is_independent() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store.mark_revision(&catalog, "three-sum").unwrap();
            assert!(store.revision_list().contains("three-sum"));
            assert!(!store.completed_questions().contains("three-sum"));

            store.unmark_revision("three-sum").unwrap();
            assert!(store.revision_list().is_empty());
        }

        #[test]
        fn random_pick_prefers_revision_list() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store.mark_revision(&catalog, "four-sum").unwrap();
            let picked = store.random_pick(&catalog).unwrap();
            assert_eq!(picked.question_id, "four-sum");
        }

        #[test]
        fn random_pick_falls_back_to_pending_and_respects_completion() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store
                .mark_question_done(&catalog, "two-sum", date("2024-01-01"))
                .unwrap();
            store
                .mark_question_done(&catalog, "three-sum", date("2024-01-01"))
                .unwrap();
            let picked = store.random_pick(&catalog).unwrap();
            assert_eq!(picked.question_id, "four-sum");

            store
                .mark_question_done(&catalog, "four-sum", date("2024-01-01"))
                .unwrap();
            assert!(store.random_pick(&catalog).is_none());
        }
    }

    mod plan_action_tests {
        use super::*;

        #[test]
        fn create_replaces_prior_plan_wholesale() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store
                .create_study_plan(&catalog, date("2024-01-01"), 3)
                .unwrap();
            store
                .mark_question_done(&catalog, "two-sum", date("2024-01-01"))
                .unwrap();

            store
                .create_study_plan(&catalog, date("2024-02-01"), 2)
                .unwrap();
            let plan = store.study_plan().unwrap();
            assert_eq!(plan.start_date, date("2024-02-01"));
            // the log does not carry over
            assert!(plan.completed_questions_by_date.is_empty());
            // completed question is excluded from the new assignments
            let assigned: Vec<&String> =
                plan.question_assignments.values().flatten().collect();
            assert!(!assigned.iter().any(|id| *id == "two-sum"));
        }

        #[test]
        fn reset_clears_plan_and_storage() {
            let mut store = setup_store();
            let catalog = small_catalog();
            store
                .create_study_plan(&catalog, date("2024-01-01"), 3)
                .unwrap();
            store.reset_study_plan();
            assert!(store.study_plan().is_none());
            assert!(store.storage.read(KEY_STUDY_PLAN).unwrap().is_none());
        }
    }

    mod persistence_tests {
        use super::*;

        #[test]
        fn sqlite_round_trip_preserves_the_tree() {
            let mut storage = SqliteStorage::open(":memory:").unwrap();

            {
                let mut store = Store::open(MemoryStorage::default());
                store.seed_if_empty(date("2024-01-01")).unwrap();
                store.schedule_subject("os", date("2024-03-01"), 4).unwrap();
                store.toggle_subtopic("os", "os-memory-replacement-lru").unwrap();
                let raw = serde_json::to_string(store.subjects()).unwrap();
                storage.write(KEY_SUBJECTS, &raw).unwrap();
            }

            let store = Store::open(storage);
            let os = store.subject("os").unwrap();
            assert_eq!(os.schedule.start_date, date("2024-03-01"));
            let mem = os.topics.iter().find(|t| t.id == "os-memory").unwrap();
            assert!(mem.subtopics[2].subtopics[0].completed);
            assert!(mem.subtopics[0].scheduled_date.is_some());
        }

        #[test]
        fn malformed_blob_falls_back_to_default() {
            let mut storage = MemoryStorage::default();
            storage.write(KEY_SUBJECTS, "{definitely not json").unwrap();
            storage.write(KEY_COMPLETED, "42").unwrap();

            let store = Store::open(storage);
            assert!(store.subjects().is_empty());
            assert!(store.completed_questions().is_empty());
        }

        #[test]
        fn failed_writes_keep_in_memory_state() {
            struct FailingStorage;
            impl Storage for FailingStorage {
                fn read(&self, _key: &str) -> Result<Option<String>> {
                    Ok(None)
                }
                fn write(&mut self, _key: &str, _value: &str) -> Result<()> {
                    Err(Error::invalid_input("disk full"))
                }
                fn remove(&mut self, _key: &str) -> Result<()> {
                    Err(Error::invalid_input("disk full"))
                }
            }

            let mut store = Store::open(FailingStorage);
            store.seed_if_empty(date("2024-01-01")).unwrap();
            assert!(!store.subjects().is_empty());
            store.schedule_subject("os", date("2024-01-01"), 2).unwrap();
            assert_eq!(store.subject("os").unwrap().schedule.total_days, 2);
        }

        #[test]
        fn sqlite_storage_upserts() {
            let mut storage = SqliteStorage::open(":memory:").unwrap();
            storage.write("k", "one").unwrap();
            storage.write("k", "two").unwrap();
            assert_eq!(storage.read("k").unwrap().as_deref(), Some("two"));
            storage.remove("k").unwrap();
            assert!(storage.read("k").unwrap().is_none());
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};

const BUNDLED_CATALOG: &str = include_str!("data/questions.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: String,
    pub question_heading: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub question_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Section {
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.categories.iter().flat_map(|c| c.questions.iter())
    }

    pub fn question_count(&self) -> usize {
        self.categories.iter().map(|c| c.questions.len()).sum()
    }
}

/// The read-only practice-question dataset. Loaded once from the bundled
/// asset; never mutated. User state lives in the store as id sets keyed
/// against `question_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub sections: Vec<Section>,
}

impl Catalog {
    /// Parses and validates the bundled dataset. Malformed entries fail fast
    /// rather than leaking blank or duplicate ids into scheduling.
    pub fn load() -> Result<Self> {
        Self::parse(BUNDLED_CATALOG)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let catalog: Catalog =
            serde_json::from_str(raw).map_err(|e| Error::Catalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for section in &self.sections {
            if section.title.trim().is_empty() {
                return Err(Error::Catalog(String::from("section with empty title")));
            }
            for question in section.questions() {
                if question.question_id.trim().is_empty() {
                    return Err(Error::Catalog(format!(
                        "question with empty id in section '{}'",
                        section.title
                    )));
                }
                if question.question_heading.trim().is_empty() {
                    return Err(Error::Catalog(format!(
                        "question '{}' has an empty heading",
                        question.question_id
                    )));
                }
                if !seen.insert(question.question_id.as_str()) {
                    return Err(Error::Catalog(format!(
                        "duplicate question id '{}'",
                        question.question_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// All questions in catalog order (section order, then category order,
    /// then question order).
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(Section::questions)
    }

    pub fn question_count(&self) -> usize {
        self.sections.iter().map(Section::question_count).sum()
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.questions().any(|q| q.question_id == question_id)
    }

    pub fn find_section(&self, title: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.title.eq_ignore_ascii_case(title))
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{deserialize_decimal, Progress, Tag, Yarn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Knit,
    Crochet,
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectKind::Knit => write!(f, "Knitting"),
            ProjectKind::Crochet => write!(f, "Crochet"),
        }
    }
}

impl std::str::FromStr for ProjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "knit" | "knitting" => Ok(ProjectKind::Knit),
            "crochet" => Ok(ProjectKind::Crochet),
            other => Err(format!("unknown project type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub needle_or_hook_size: String,
    #[serde(default)]
    pub yarns: Vec<ProjectYarn>,
    #[serde(default)]
    pub pattern_link: String,
    /// Sanitized HTML from the pattern editor.
    #[serde(default)]
    pub pattern_text: String,
    #[serde(default)]
    pub notes: String,
    pub main_image: Option<String>,
    #[serde(default)]
    pub progress_updates: Vec<Progress>,
}

impl Project {
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }

    pub fn total_rows(&self) -> u64 {
        self.progress_updates
            .iter()
            .map(|p| u64::from(p.rows_completed))
            .sum()
    }
}

/// A stash yarn as embedded in a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectYarn {
    pub id: i64,
    pub yarn: Yarn,
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub quantity_used_skeins: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_names: Vec<String>,
    pub start_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub needle_or_hook_size: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pattern_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pattern_text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

/// Client-side project list filter: free-text name search, kind, and tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub query: String,
    pub kind: Option<ProjectKind>,
    pub tag: Option<String>,
}

impl ProjectFilter {
    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty() && self.kind.is_none() && self.tag.is_none()
    }

    pub fn matches(&self, project: &Project) -> bool {
        let query = self.query.trim().to_lowercase();
        if !query.is_empty() && !project.name.to_lowercase().contains(&query) {
            return false;
        }
        if let Some(kind) = self.kind {
            if project.kind != kind {
                return false;
            }
        }
        match self.tag.as_deref() {
            Some(tag) if !tag.is_empty() => project.has_tag(tag),
            _ => true,
        }
    }

    pub fn apply<'a>(&self, projects: &'a [Project]) -> Vec<&'a Project> {
        projects.iter().filter(|p| self.matches(p)).collect()
    }
}

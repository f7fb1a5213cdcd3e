use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dated progress update on a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub id: i64,
    pub project: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub rows_completed: u32,
    #[serde(default)]
    pub stitches_completed: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub images: Vec<ProgressImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressImage {
    pub id: i64,
    /// Absolute URL of the uploaded photo.
    pub image: String,
    #[serde(default)]
    pub caption: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressInput {
    pub project: i64,
    pub rows_completed: u32,
    pub stitches_completed: u32,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_parses_offset_dates() {
        let progress: Progress = serde_json::from_str(
            r#"{"id":1,"project":2,"date":"2025-03-01T23:30:00+02:00","rows_completed":4,
                "stitches_completed":120,"notes":"",
                "images":[{"id":5,"image":"http://h/media/progress/a.jpg","caption":"",
                           "created":"2025-03-01T21:31:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(progress.date.to_rfc3339(), "2025-03-01T21:30:00+00:00");
        assert_eq!(progress.images.len(), 1);
    }
}

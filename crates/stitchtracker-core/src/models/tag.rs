use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub project_count: Option<i64>,
}

/// Tag names sorted case-insensitively, for filter pickers.
pub fn tag_names(tags: &[Tag]) -> Vec<String> {
    let mut names: Vec<String> = tags.iter().map(|t| t.name.clone()).collect();
    names.sort_by_key(|n| n.to_lowercase());
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_sorted() {
        let tags: Vec<Tag> = serde_json::from_str(
            r#"[{"id":1,"name":"socks","project_count":2},{"id":2,"name":"Gifts"},{"id":3,"name":"baby"}]"#,
        )
        .unwrap();
        assert_eq!(tag_names(&tags), vec!["baby", "Gifts", "socks"]);
        assert_eq!(tags[0].project_count, Some(2));
        assert_eq!(tags[1].project_count, None);
    }
}

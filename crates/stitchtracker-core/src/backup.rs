//! Export of everything the signed-in user can read, as one JSON document.
//!
//! Collections are fetched concurrently and fail independently: a collection
//! that cannot be read is exported empty. Only an authentication failure
//! aborts the export, since every other collection would fail the same way.
//!
//! Local-only state (the shelf layout) travels in a separate `local` section
//! and is the only part restored on import.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{Progress, Project, Tag, User, Yarn};
use crate::shelf::ShelfLayout;

const BACKUP_APP: &str = "stitch-tracker";
const BACKUP_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMeta {
    pub app: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupData {
    pub user: Option<User>,
    pub projects: Vec<Project>,
    pub tags: Vec<Tag>,
    pub yarn: Vec<Yarn>,
    pub progress: Vec<Progress>,
}

/// State that lives only on this machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupLocal {
    #[serde(default)]
    pub shelf_layout: Option<ShelfLayout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub meta: BackupMeta,
    pub data: BackupData,
    #[serde(default)]
    pub local: BackupLocal,
}

/// Keep a fetched collection, or fall back to its default on non-auth failure.
fn or_empty<T: Default>(name: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            warn!(collection = name, error = %e, "Skipping collection in backup");
            Ok(T::default())
        }
    }
}

impl Backup {
    pub async fn collect(client: &ApiClient, local: BackupLocal) -> Result<Self, ApiError> {
        let (user, projects, tags, yarn, progress) = futures::join!(
            client.current_user(),
            client.list_projects(),
            client.list_tags(""),
            client.list_yarn(),
            client.list_all_progress(None, None),
        );

        let user = or_empty("user", user.map(Some))?;
        let listed = or_empty("projects", projects)?;
        let tags = or_empty("tags", tags)?;
        let yarn = or_empty("yarn", yarn)?;
        let progress = or_empty("progress", progress)?;

        // The list endpoint may be abbreviated; prefer the full payload
        let mut projects = Vec::with_capacity(listed.len());
        for project in listed {
            match client.get_project(project.id).await {
                Ok(full) => projects.push(full),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!(project_id = project.id, error = %e, "Using list entry for project");
                    projects.push(project);
                }
            }
        }

        let backup = Self {
            meta: BackupMeta {
                app: BACKUP_APP.to_string(),
                version: BACKUP_VERSION,
                created_at: Utc::now(),
                user_id: user.as_ref().map(|u| u.id),
            },
            data: BackupData {
                user,
                projects,
                tags,
                yarn,
                progress,
            },
            local,
        };
        info!(summary = %backup.summary(), "Backup collected");
        Ok(backup)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write backup to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read backup {}", path.display()))?;
        let backup: Self = serde_json::from_str(&contents).context("Failed to parse backup")?;
        if backup.meta.app != BACKUP_APP {
            anyhow::bail!("Not a {} backup (app = {})", BACKUP_APP, backup.meta.app);
        }
        Ok(backup)
    }

    /// Write the backup's shelf layout to `shelf_path`. Returns false when
    /// the backup carries none. Server data is never re-created.
    pub fn restore_local(&self, shelf_path: &Path) -> Result<bool> {
        match self.local.shelf_layout {
            Some(ref layout) => {
                layout.save(shelf_path)?;
                info!(path = %shelf_path.display(), "Restored shelf layout");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} projects, {} progress updates, {} yarns, {} tags",
            self.data.projects.len(),
            self.data.progress.len(),
            self.data.yarn.len(),
            self.data.tags.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::tests::client_with;
    use reqwest::Method;
    use serde_json::json;

    fn project_json(id: i64, notes: &str) -> serde_json::Value {
        json!({"id": id, "name": format!("P{}", id), "type": "crochet",
               "start_date": "2025-01-01", "expected_end_date": null,
               "main_image": null, "notes": notes})
    }

    #[tokio::test]
    async fn test_collect_prefers_full_projects_and_skips_failures() {
        let (client, _) = client_with(vec![
            (Method::GET, "/auth/me/", 200, json!({"id": 7, "username": "alice"})),
            (Method::GET, "/projects/", 200, json!([project_json(1, ""), project_json(2, "")])),
            (Method::GET, "/projects/1/", 200, project_json(1, "full")),
            (Method::GET, "/tags/", 500, json!({"detail": "boom"})),
            (Method::GET, "/yarns/", 200, json!([])),
            (Method::GET, "/progress/", 200, json!([])),
        ]);

        let backup = Backup::collect(&client, BackupLocal::default()).await.unwrap();

        assert_eq!(backup.meta.user_id, Some(7));
        assert_eq!(backup.meta.version, 1);
        assert_eq!(backup.data.projects[0].notes, "full");
        // /projects/2/ is not routed: falls back to the list entry
        assert_eq!(backup.data.projects[1].notes, "");
        assert!(backup.data.tags.is_empty());
        assert_eq!(backup.summary(), "2 projects, 0 progress updates, 0 yarns, 0 tags");
    }

    #[tokio::test]
    async fn test_collect_aborts_when_unauthorized() {
        // No refresh route: the renewal is rejected and the session ends
        let (client, _) = client_with(vec![(Method::GET, "/auth/me/", 401, json!({}))]);

        let err = Backup::collect(&client, BackupLocal::default()).await.unwrap_err();

        assert!(err.is_auth());
        assert!(!client.session().is_authenticated());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        let backup = Backup {
            meta: BackupMeta {
                app: BACKUP_APP.to_string(),
                version: BACKUP_VERSION,
                created_at: Utc::now(),
                user_id: None,
            },
            data: BackupData::default(),
            local: BackupLocal::default(),
        };

        backup.save(&path).unwrap();
        assert_eq!(Backup::load(&path).unwrap(), backup);

        std::fs::write(&path, r#"{"meta":{"app":"other","version":1,"created_at":"2025-01-01T00:00:00Z","user_id":null},"data":{"user":null,"projects":[],"tags":[],"yarn":[],"progress":[]}}"#).unwrap();
        assert!(Backup::load(&path).is_err());
    }

    #[tokio::test]
    async fn test_shelf_layout_survives_export_and_restore() {
        let (client, _) = client_with(vec![
            (Method::GET, "/auth/me/", 200, json!({"id": 7, "username": "alice"})),
            (Method::GET, "/projects/", 200, json!([])),
        ]);
        let mut layout = ShelfLayout::new();
        layout.add("B2", 11);
        let local = BackupLocal {
            shelf_layout: Some(layout.clone()),
        };

        let dir = tempfile::tempdir().unwrap();
        let backup_path = dir.path().join("backup.json");
        Backup::collect(&client, local).await.unwrap().save(&backup_path).unwrap();

        let shelf_path = dir.path().join("data").join("shelf.json");
        let restored = Backup::load(&backup_path).unwrap();
        assert!(restored.restore_local(&shelf_path).unwrap());
        assert_eq!(ShelfLayout::load(&shelf_path), layout);
    }

    #[test]
    fn test_backup_without_local_section_restores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, r#"{"meta":{"app":"stitch-tracker","version":1,"created_at":"2025-01-01T00:00:00Z","user_id":null},"data":{"user":null,"projects":[],"tags":[],"yarn":[],"progress":[]}}"#).unwrap();

        let backup = Backup::load(&path).unwrap();
        let shelf_path = dir.path().join("shelf.json");
        assert!(!backup.restore_local(&shelf_path).unwrap());
        assert!(!shelf_path.exists());
    }
}

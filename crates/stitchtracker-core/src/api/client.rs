//! Typed access to the craft tracker REST API.
//!
//! Every call is routed through [`SessionManager::authorized_request`], so
//! token renewal and the single retry happen in one place.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::SessionManager;
use crate::models::{
    AdminUser, AdminUserPatch, Progress, ProgressInput, Project, ProjectInput, ProjectYarnLink,
    Tag, User, Yarn, YarnInput,
};

use super::transport::{HttpResponse, RequestOptions};
use super::ApiError;

/// API client for the craft tracker backend.
/// Clone is cheap - the session is shared.
#[derive(Clone)]
pub struct ApiClient {
    session: SessionManager,
}

impl ApiClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    async fn request(&self, path: &str, options: RequestOptions) -> Result<HttpResponse, ApiError> {
        self.session.authorized_request(path, options).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(path, RequestOptions::get()).await?.json()
    }

    async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(path, options).await?.json()
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(path, RequestOptions::post(body)).await?.json()
    }

    async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(path, RequestOptions::patch(body)).await?.json()
    }

    /// DELETE endpoints answer 204 with an empty body.
    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request(path, RequestOptions::delete()).await?;
        debug!(path, "Deleted");
        Ok(())
    }

    // ===== Account =====

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get("/auth/me/").await
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<(), ApiError> {
        let body = json!({ "old_password": old_password, "new_password": new_password });
        self.request("/auth/change-password/", RequestOptions::post(body))
            .await?;
        Ok(())
    }

    // ===== Projects =====

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.get("/projects/").await
    }

    pub async fn get_project(&self, id: i64) -> Result<Project, ApiError> {
        self.get(&format!("/projects/{}/", id)).await
    }

    pub async fn create_project(&self, input: &ProjectInput) -> Result<Project, ApiError> {
        self.post("/projects/", input).await
    }

    /// Partial update; `patch` holds only the fields to change.
    pub async fn update_project(&self, id: i64, patch: &Value) -> Result<Project, ApiError> {
        self.patch(&format!("/projects/{}/", id), patch).await
    }

    pub async fn delete_project(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/projects/{}/", id)).await
    }

    // ===== Progress =====

    pub async fn list_progress_by_project(&self, project_id: i64) -> Result<Vec<Progress>, ApiError> {
        self.get_with(
            "/progress/",
            RequestOptions::get().query("project", project_id.to_string()),
        )
        .await
    }

    /// All of the caller's progress, optionally windowed by date strings.
    pub async fn list_all_progress(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<Progress>, ApiError> {
        let mut options = RequestOptions::get();
        if let Some(start) = start {
            options = options.query("start", start);
        }
        if let Some(end) = end {
            options = options.query("end", end);
        }
        self.get_with("/progress/", options).await
    }

    pub async fn create_progress(&self, input: &ProgressInput) -> Result<Progress, ApiError> {
        self.post("/progress/", input).await
    }

    pub async fn update_progress(&self, id: i64, patch: &Value) -> Result<Progress, ApiError> {
        self.patch(&format!("/progress/{}/", id), patch).await
    }

    pub async fn delete_progress(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/progress/{}/", id)).await
    }

    // ===== Yarn stash =====

    pub async fn list_yarn(&self) -> Result<Vec<Yarn>, ApiError> {
        self.get("/yarns/").await
    }

    pub async fn create_yarn(&self, input: &YarnInput) -> Result<Yarn, ApiError> {
        self.post("/yarns/", input).await
    }

    pub async fn update_yarn(&self, id: i64, patch: &Value) -> Result<Yarn, ApiError> {
        self.patch(&format!("/yarns/{}/", id), patch).await
    }

    pub async fn delete_yarn(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/yarns/{}/", id)).await
    }

    // ===== Project <-> yarn links =====

    pub async fn create_project_yarn(
        &self,
        project: i64,
        yarn: i64,
        quantity_used_skeins: Option<f64>,
    ) -> Result<ProjectYarnLink, ApiError> {
        let link = ProjectYarnLink {
            id: 0,
            project,
            yarn,
            quantity_used_skeins,
        };
        self.post("/project-yarns/", &link).await
    }

    pub async fn update_project_yarn(
        &self,
        id: i64,
        quantity_used_skeins: Option<f64>,
    ) -> Result<ProjectYarnLink, ApiError> {
        self.patch(
            &format!("/project-yarns/{}/", id),
            &json!({ "quantity_used_skeins": quantity_used_skeins }),
        )
        .await
    }

    pub async fn delete_project_yarn(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/project-yarns/{}/", id)).await
    }

    // ===== Tags =====

    pub async fn list_tags(&self, search: &str) -> Result<Vec<Tag>, ApiError> {
        let mut options = RequestOptions::get();
        if !search.is_empty() {
            options = options.query("search", search);
        }
        self.get_with("/tags/", options).await
    }

    pub async fn create_tag(&self, name: &str) -> Result<Tag, ApiError> {
        self.post("/tags/", &json!({ "name": name })).await
    }

    pub async fn rename_tag(&self, id: i64, name: &str) -> Result<Tag, ApiError> {
        self.patch(&format!("/tags/{}/", id), &json!({ "name": name }))
            .await
    }

    pub async fn delete_tag(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/tags/{}/", id)).await
    }

    // ===== Admin =====

    pub async fn admin_list_users(&self, search: &str) -> Result<Vec<AdminUser>, ApiError> {
        let mut options = RequestOptions::get();
        if !search.is_empty() {
            options = options.query("search", search);
        }
        self.get_with("/admin/users/", options).await
    }

    pub async fn admin_set_password(&self, user_id: i64, new_password: &str) -> Result<(), ApiError> {
        let body = json!({ "new_password": new_password });
        self.request(
            &format!("/admin/users/{}/set-password/", user_id),
            RequestOptions::post(body),
        )
        .await?;
        Ok(())
    }

    pub async fn admin_update_user(
        &self,
        user_id: i64,
        patch: &AdminUserPatch,
    ) -> Result<AdminUser, ApiError> {
        self.patch(&format!("/admin/users/{}/", user_id), patch).await
    }

    pub async fn admin_delete_user(&self, user_id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/admin/users/{}/", user_id)).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::transport::{HttpRequest, Transport};
    use crate::auth::{CredentialStore, MemoryStore};
    use async_trait::async_trait;
    use reqwest::Method;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// In-process backend keyed by method and path.
    pub(crate) struct StubBackend {
        pub(crate) routes: Vec<(Method, &'static str, u16, Value)>,
        pub(crate) seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl Transport for StubBackend {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.lock().unwrap().push(request.clone());
            let path = request.url.trim_start_matches("http://stub/api");
            for (method, route, status, body) in &self.routes {
                if *method == request.method && *route == path {
                    let body = if body.is_null() { String::new() } else { body.to_string() };
                    return Ok(HttpResponse { status: *status, body });
                }
            }
            Ok(HttpResponse {
                status: 404,
                body: json!({"detail": "Not found."}).to_string(),
            })
        }
    }

    pub(crate) fn client_with(routes: Vec<(Method, &'static str, u16, Value)>) -> (ApiClient, Arc<StubBackend>) {
        let backend = Arc::new(StubBackend {
            routes,
            seen: Mutex::new(Vec::new()),
        });
        let session = SessionManager::new(
            "http://stub/api",
            backend.clone(),
            CredentialStore::new(Box::new(MemoryStore::new())),
            Duration::from_secs(30),
        );
        session.set_credentials("A1", "R1");
        (ApiClient::new(session), backend)
    }

    #[tokio::test]
    async fn test_list_projects_sends_bearer() {
        let (client, backend) = client_with(vec![(
            Method::GET,
            "/projects/",
            200,
            json!([{"id": 1, "name": "Socks", "type": "knit", "start_date": "2025-01-01",
                    "expected_end_date": null, "main_image": null}]),
        )]);

        let projects = client.list_projects().await.unwrap();

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Socks");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].bearer.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_progress_by_project_uses_query() {
        let (client, backend) = client_with(vec![(Method::GET, "/progress/", 200, json!([]))]);

        client.list_progress_by_project(12).await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].query, vec![("project".to_string(), "12".to_string())]);
    }

    #[tokio::test]
    async fn test_list_tags_without_search_has_no_query() {
        let (client, backend) = client_with(vec![(Method::GET, "/tags/", 200, json!([]))]);

        client.list_tags("").await.unwrap();
        client.list_tags("sock").await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].query.is_empty());
        assert_eq!(seen[1].query, vec![("search".to_string(), "sock".to_string())]);
    }

    #[tokio::test]
    async fn test_delete_accepts_empty_body() {
        let (client, _) = client_with(vec![(Method::DELETE, "/tags/3/", 204, Value::Null)]);
        client.delete_tag(3).await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_error_is_request_error() {
        let (client, _) = client_with(vec![(
            Method::POST,
            "/tags/",
            400,
            json!({"name": ["Tag with this name already exists."]}),
        )]);

        let err = client.create_tag("socks").await.unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_project_yarn_body() {
        let (client, backend) = client_with(vec![(
            Method::POST,
            "/project-yarns/",
            201,
            json!({"id": 8, "project": 1, "yarn": 2, "quantity_used_skeins": "1.50"}),
        )]);

        let link = client.create_project_yarn(1, 2, Some(1.5)).await.unwrap();

        assert_eq!(link.id, 8);
        let seen = backend.seen.lock().unwrap();
        assert_eq!(
            seen[0].body,
            Some(json!({"project": 1, "yarn": 2, "quantity_used_skeins": 1.5}))
        );
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let (client, _) = client_with(vec![]);
        let err = client.get_project(99).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}

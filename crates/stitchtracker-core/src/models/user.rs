use serde::{Deserialize, Serialize};

/// The signed-in account, as returned by `/auth/me/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn role(&self) -> &'static str {
        if self.is_superuser {
            "superuser"
        } else if self.is_staff {
            "staff"
        } else {
            "member"
        }
    }
}

/// A user as seen through the admin endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub date_joined: Option<String>,
    pub last_login: Option<String>,
}

/// Flag changes for an admin user update; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminUserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_staff: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defaults() {
        let user: User = serde_json::from_str(r#"{"id": 1, "username": "alice"}"#).unwrap();
        assert_eq!(user.email, "");
        assert!(user.is_active);
        assert_eq!(user.role(), "member");
    }

    #[test]
    fn test_admin_patch_omits_unset_fields() {
        let patch = AdminUserPatch {
            is_active: Some(false),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"is_active":false}"#);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// The capability a caller acts with. Derived once from the authenticated
/// user and passed explicitly into the scheduling core instead of
/// re-checking role strings at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Provider,
    Admin,
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRole::Patient => write!(f, "patient"),
            ActorRole::Provider => write!(f, "provider"),
            ActorRole::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    /// Maps an authenticated user onto an actor capability. Unknown or
    /// missing roles are rejected rather than defaulted.
    pub fn from_user(user: &User) -> Result<Self, String> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| format!("invalid user id: {}", user.id))?;

        let role = match user.role.as_deref() {
            Some("patient") => ActorRole::Patient,
            Some("provider") => ActorRole::Provider,
            Some("admin") => ActorRole::Admin,
            other => return Err(format!("unknown role: {:?}", other)),
        };

        Ok(Self { id, role })
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    AdminGarderie,
    Educateur,
    Parent,
}

impl UserRole {
    /// Staff may operate the attendance screens; parents only the portal.
    pub fn is_staff(&self) -> bool {
        !matches!(self, UserRole::Parent)
    }

    /// Time-clock corrections are reserved to garderie admins.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::AdminGarderie | UserRole::SuperAdmin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::AdminGarderie => "admin_garderie",
            UserRole::Educateur => "educateur",
            UserRole::Parent => "parent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(UserRole::SuperAdmin),
            "admin_garderie" => Ok(UserRole::AdminGarderie),
            "educateur" => Ok(UserRole::Educateur),
            "parent" => Ok(UserRole::Parent),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

/// DB row struct — role is fetched as TEXT to avoid schema-qualified enum mismatch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Stored as TEXT in queries (role::TEXT) to bypass SQLx enum OID mismatch.
    pub role: String,
    #[serde(skip_serializing)]
    pub pin_hash: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

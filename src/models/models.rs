use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub owner: u64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Comment {
    pub id: u64,
    pub post: u64,
    pub owner: u64,
    pub body: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub parent: Option<u64>,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Project {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub category: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// Stored as its integer value (`MEMBER = 0`, `OWNER = 1`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(into = "u8", try_from = "u8")]
pub enum RoleType {
    Member,
    Owner,
}

impl From<RoleType> for u8 {
    fn from(role: RoleType) -> Self {
        match role {
            RoleType::Member => 0,
            RoleType::Owner => 1,
        }
    }
}

impl TryFrom<u8> for RoleType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoleType::Member),
            1 => Ok(RoleType::Owner),
            other => Err(format!("unknown role {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Membership {
    pub id: u64,
    pub person: u64,
    pub project: u64,
    pub role: RoleType,
}

impl Membership {
    /// `"{username} - {project title}"`, the admin-facing label.
    pub fn label(&self, person: &User, project: &Project) -> String {
        format!("{} - {}", person.username, project.title)
    }
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: u64,
    pub created_at: String,
}

use super::Lifecycle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Member => "member",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct GroupMember {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub status: Lifecycle,
    pub joined_at: DateTime<Utc>,
}

impl GroupMember {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_active_admin(&self) -> bool {
        self.is_active() && self.role == Role::Admin
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Display label only, amounts are never converted
    pub currency: String,
    pub members: Vec<GroupMember>,
    pub created_by: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn member(&self, user_id: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn is_active_member(&self, user_id: &str) -> bool {
        self.member(user_id).is_some_and(GroupMember::is_active)
    }

    pub fn is_active_admin(&self, user_id: &str) -> bool {
        self.member(user_id).is_some_and(GroupMember::is_active_admin)
    }

    pub fn active_admin_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_active_admin()).count()
    }

    pub fn active_member_ids(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| m.is_active())
            .map(|m| m.user_id.clone())
            .collect()
    }
}

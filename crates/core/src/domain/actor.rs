use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed role set. Storage keeps roles as text; anything that does not
/// parse into one of these five values counts as "no role" and sees nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    ApproverL1,
    ApproverL2,
    Finance,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "staff" => Some(Self::Staff),
            "approver_l1" => Some(Self::ApproverL1),
            "approver_l2" => Some(Self::ApproverL2),
            "finance" => Some(Self::Finance),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::ApproverL1 => "approver_l1",
            Self::ApproverL2 => "approver_l2",
            Self::Finance => "finance",
            Self::Admin => "admin",
        }
    }

    pub const ALL: [Role; 5] =
        [Role::Staff, Role::ApproverL1, Role::ApproverL2, Role::Finance, Role::Admin];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity + role pair every lifecycle operation receives. Role lookup
/// happens at the boundary (session/auth collaborator); the engine trusts the
/// context it is handed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Option<Role>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Option<Role>) -> Self {
        Self { user_id: UserId(user_id.into()), role }
    }
}

/// Role directory record. Provisioned explicitly after user registration
/// (default `staff`), mutated only through the admin change-role operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

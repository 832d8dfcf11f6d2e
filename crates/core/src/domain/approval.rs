use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Role, UserId};
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

/// The two fixed approval gates. The approver's role determines the level;
/// an actor never chooses it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApprovalLevel {
    One,
    Two,
}

impl ApprovalLevel {
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::ApproverL1 => Some(Self::One),
            Role::ApproverL2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// An immutable record of one approver's decision at one level for one
/// request. Absence of a row means the approver has not acted; there is no
/// persisted "pending" decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub request_id: RequestId,
    pub approver_id: UserId,
    pub level: ApprovalLevel,
    pub approved: bool,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A decision about to be recorded; the store assigns id and timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApproval {
    pub approver_id: UserId,
    pub level: ApprovalLevel,
    pub approved: bool,
    pub comment: String,
}

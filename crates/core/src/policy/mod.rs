//! Access policy: pure functions from (role, action, ownership) to
//! permit/deny, plus the per-role visibility scope that the persistence
//! layer turns into a query filter.

use serde::{Deserialize, Serialize};

use crate::domain::actor::{Role, UserId};
use crate::domain::approval::{Approval, ApprovalLevel};
use crate::domain::request::{PurchaseRequest, RequestStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    CreateRequest,
    ViewRequests,
    Approve,
    Reject,
    SubmitReceipt,
    ChangeRole,
}

/// Role/action gate. Ownership checks (receipt submission, updates) are
/// separate and sit on top of this.
pub fn permits(role: Option<Role>, action: LifecycleAction) -> bool {
    let Some(role) = role else {
        return false;
    };

    match action {
        LifecycleAction::CreateRequest => matches!(role, Role::Staff),
        LifecycleAction::ViewRequests => matches!(
            role,
            Role::Staff | Role::ApproverL1 | Role::ApproverL2 | Role::Finance | Role::Admin
        ),
        LifecycleAction::Approve | LifecycleAction::Reject => {
            matches!(role, Role::ApproverL1 | Role::ApproverL2)
        }
        LifecycleAction::SubmitReceipt => matches!(role, Role::Staff),
        LifecycleAction::ChangeRole => matches!(role, Role::Admin),
    }
}

/// The slice of the request collection a role may see. Not just a permission
/// bit: list queries are filtered by this scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityScope {
    /// Unknown or unset role.
    Nothing,
    /// Staff: only requests they created.
    OwnOnly,
    /// Approver L1 and admin: the full collection.
    All,
    /// Approver L2: only requests with a recorded, approved L1 decision.
    LevelOneApproved,
    /// Finance: only fully approved requests.
    ApprovedOnly,
}

pub fn visibility(role: Option<Role>) -> VisibilityScope {
    match role {
        None => VisibilityScope::Nothing,
        Some(Role::Staff) => VisibilityScope::OwnOnly,
        Some(Role::ApproverL1) => VisibilityScope::All,
        Some(Role::ApproverL2) => VisibilityScope::LevelOneApproved,
        Some(Role::Finance) => VisibilityScope::ApprovedOnly,
        Some(Role::Admin) => VisibilityScope::All,
    }
}

/// Whether a single fetched request falls inside a viewer's scope. The SQL
/// layer applies the same predicate as a WHERE clause for lists.
pub fn scope_admits(
    scope: VisibilityScope,
    viewer: &UserId,
    request: &PurchaseRequest,
    approvals: &[Approval],
) -> bool {
    match scope {
        VisibilityScope::Nothing => false,
        VisibilityScope::OwnOnly => request.created_by == *viewer,
        VisibilityScope::All => true,
        VisibilityScope::LevelOneApproved => {
            approvals.iter().any(|a| a.level == ApprovalLevel::One && a.approved)
        }
        VisibilityScope::ApprovedOnly => request.status == RequestStatus::Approved,
    }
}

use crate::domain::actor::UserId;
use crate::domain::approval::{Approval, ApprovalLevel, NewApproval};
use crate::domain::request::RequestStatus;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// Snapshot of everything the planner needs, read under the request's lock.
#[derive(Clone, Debug)]
pub struct DecisionInput<'a> {
    pub status: RequestStatus,
    pub approvals: &'a [Approval],
    pub actor: &'a UserId,
    pub level: ApprovalLevel,
    pub decision: Decision,
    pub comment: String,
}

/// What to persist for a legal decision. The store executes this verbatim
/// inside the same transaction the snapshot was read in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionPlan {
    pub record: NewApproval,
    pub transition: Option<RequestStatus>,
    pub last_approved_by: Option<UserId>,
    pub generate_order: bool,
}

/// Decide an approve/reject action against the two-level approval chain.
///
/// Gates, in order: the request must still be PENDING; this (actor, level)
/// pair must not have acted before; a level-2 approval additionally requires
/// an approved level-1 row. Rejection at either level is final and needs no
/// prior approvals. A level-1 approval records a fact without moving the
/// status; a level-2 approval transitions to APPROVED and triggers order
/// generation.
pub fn plan_decision(input: DecisionInput<'_>) -> Result<DecisionPlan, DomainError> {
    if input.status != RequestStatus::Pending {
        return Err(DomainError::AlreadyFinalized { status: input.status });
    }

    // One row per (request, approver, level), whichever way the decision
    // goes; the storage UNIQUE index backs this same invariant.
    if input
        .approvals
        .iter()
        .any(|a| a.approver_id == *input.actor && a.level == input.level)
    {
        return Err(DomainError::DuplicateApproval { level: input.level });
    }

    match input.decision {
        Decision::Approve => {
            let record = NewApproval {
                approver_id: input.actor.clone(),
                level: input.level,
                approved: true,
                comment: input.comment,
            };

            match input.level {
                ApprovalLevel::One => Ok(DecisionPlan {
                    record,
                    transition: None,
                    last_approved_by: None,
                    generate_order: false,
                }),
                ApprovalLevel::Two => {
                    let level_one_approved = input
                        .approvals
                        .iter()
                        .any(|a| a.level == ApprovalLevel::One && a.approved);
                    if !level_one_approved {
                        return Err(DomainError::MissingLevelOneApproval);
                    }

                    Ok(DecisionPlan {
                        record,
                        transition: Some(RequestStatus::Approved),
                        last_approved_by: Some(input.actor.clone()),
                        generate_order: true,
                    })
                }
            }
        }
        Decision::Reject => Ok(DecisionPlan {
            record: NewApproval {
                approver_id: input.actor.clone(),
                level: input.level,
                approved: false,
                comment: input.comment,
            },
            transition: Some(RequestStatus::Rejected),
            last_approved_by: None,
            generate_order: false,
        }),
    }
}

/// Updates are allowed only while the request is PENDING and no approver has
/// acted at any level.
pub fn ensure_editable(status: RequestStatus, approval_count: usize) -> Result<(), DomainError> {
    if status != RequestStatus::Pending {
        return Err(DomainError::AlreadyFinalized { status });
    }
    if approval_count > 0 {
        return Err(DomainError::EditLocked);
    }
    Ok(())
}

/// Receipts are only accepted once the request is fully approved.
pub fn ensure_receipt_accepted(status: RequestStatus) -> Result<(), DomainError> {
    if status != RequestStatus::Approved {
        return Err(DomainError::ReceiptBeforeApproval { status });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::actor::UserId;
    use crate::domain::approval::{Approval, ApprovalId, ApprovalLevel};
    use crate::domain::request::{RequestId, RequestStatus};
    use crate::errors::DomainError;

    use super::{
        ensure_editable, ensure_receipt_accepted, plan_decision, Decision, DecisionInput,
    };

    fn approval(approver: &str, level: ApprovalLevel, approved: bool) -> Approval {
        Approval {
            id: ApprovalId(format!("APR-{approver}-{level}")),
            request_id: RequestId("PR-1".to_string()),
            approver_id: UserId(approver.to_string()),
            level,
            approved,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    fn input<'a>(
        status: RequestStatus,
        approvals: &'a [Approval],
        actor: &'a UserId,
        level: ApprovalLevel,
        decision: Decision,
    ) -> DecisionInput<'a> {
        DecisionInput { status, approvals, actor, level, decision, comment: String::new() }
    }

    #[test]
    fn level_one_approval_records_without_transition() {
        let actor = UserId("u-l1".to_string());
        let plan = plan_decision(input(
            RequestStatus::Pending,
            &[],
            &actor,
            ApprovalLevel::One,
            Decision::Approve,
        ))
        .expect("legal L1 approval");

        assert!(plan.record.approved);
        assert_eq!(plan.record.level, ApprovalLevel::One);
        assert_eq!(plan.transition, None);
        assert!(!plan.generate_order);
        assert_eq!(plan.last_approved_by, None);
    }

    #[test]
    fn level_two_approval_requires_an_approved_level_one_row() {
        let actor = UserId("u-l2".to_string());

        let error = plan_decision(input(
            RequestStatus::Pending,
            &[],
            &actor,
            ApprovalLevel::Two,
            Decision::Approve,
        ))
        .expect_err("L2 before L1");
        assert_eq!(error, DomainError::MissingLevelOneApproval);

        // A rejected L1 row does not satisfy the gate either.
        let rejected_l1 = [approval("u-l1", ApprovalLevel::One, false)];
        let error = plan_decision(input(
            RequestStatus::Pending,
            &rejected_l1,
            &actor,
            ApprovalLevel::Two,
            Decision::Approve,
        ))
        .expect_err("rejected L1 does not count");
        assert_eq!(error, DomainError::MissingLevelOneApproval);
    }

    #[test]
    fn level_two_approval_transitions_and_triggers_order_generation() {
        let actor = UserId("u-l2".to_string());
        let chain = [approval("u-l1", ApprovalLevel::One, true)];

        let plan = plan_decision(input(
            RequestStatus::Pending,
            &chain,
            &actor,
            ApprovalLevel::Two,
            Decision::Approve,
        ))
        .expect("legal L2 approval");

        assert_eq!(plan.transition, Some(RequestStatus::Approved));
        assert!(plan.generate_order);
        assert_eq!(plan.last_approved_by, Some(actor));
    }

    #[test]
    fn duplicate_decision_by_same_actor_and_level_is_a_conflict() {
        let actor = UserId("u-l1".to_string());
        let existing = [approval("u-l1", ApprovalLevel::One, true)];

        let error = plan_decision(input(
            RequestStatus::Pending,
            &existing,
            &actor,
            ApprovalLevel::One,
            Decision::Approve,
        ))
        .expect_err("double approval");
        assert_eq!(error, DomainError::DuplicateApproval { level: ApprovalLevel::One });

        // Rejecting after having approved at the same level would violate the
        // one-row-per-(request, approver, level) invariant too.
        let error = plan_decision(input(
            RequestStatus::Pending,
            &existing,
            &actor,
            ApprovalLevel::One,
            Decision::Reject,
        ))
        .expect_err("reject after approve at same level");
        assert_eq!(error, DomainError::DuplicateApproval { level: ApprovalLevel::One });
    }

    #[test]
    fn a_different_approver_at_the_same_level_is_not_a_duplicate() {
        let actor = UserId("u-l1-b".to_string());
        let existing = [approval("u-l1-a", ApprovalLevel::One, true)];

        plan_decision(input(
            RequestStatus::Pending,
            &existing,
            &actor,
            ApprovalLevel::One,
            Decision::Approve,
        ))
        .expect("second L1 approver may act");
    }

    #[test]
    fn rejection_is_final_at_either_level_without_prior_approvals() {
        for level in [ApprovalLevel::One, ApprovalLevel::Two] {
            let actor = UserId("u-approver".to_string());
            let plan = plan_decision(input(
                RequestStatus::Pending,
                &[],
                &actor,
                level,
                Decision::Reject,
            ))
            .expect("rejection needs no prior approvals");

            assert!(!plan.record.approved);
            assert_eq!(plan.transition, Some(RequestStatus::Rejected));
            assert!(!plan.generate_order);
        }
    }

    #[test]
    fn finalized_requests_reject_any_decision() {
        for status in [RequestStatus::Approved, RequestStatus::Rejected] {
            let actor = UserId("u-l1".to_string());
            let error = plan_decision(input(
                status,
                &[],
                &actor,
                ApprovalLevel::One,
                Decision::Approve,
            ))
            .expect_err("finalized request");
            assert_eq!(error, DomainError::AlreadyFinalized { status });
        }
    }

    #[test]
    fn editable_requires_pending_and_zero_approvals() {
        assert!(ensure_editable(RequestStatus::Pending, 0).is_ok());
        assert_eq!(
            ensure_editable(RequestStatus::Pending, 1),
            Err(DomainError::EditLocked)
        );
        assert_eq!(
            ensure_editable(RequestStatus::Approved, 0),
            Err(DomainError::AlreadyFinalized { status: RequestStatus::Approved })
        );
    }

    #[test]
    fn receipts_only_for_approved_requests() {
        assert!(ensure_receipt_accepted(RequestStatus::Approved).is_ok());
        for status in [RequestStatus::Pending, RequestStatus::Rejected] {
            assert_eq!(
                ensure_receipt_accepted(status),
                Err(DomainError::ReceiptBeforeApproval { status })
            );
        }
    }
}

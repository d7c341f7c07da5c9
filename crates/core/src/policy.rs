//! The declarative authorization table and the single guard that
//! evaluates it. One row per `(entity family, transition)`; every
//! workflow action goes through [`authorize`] instead of carrying its
//! own role list.

use serde::{Deserialize, Serialize};

use crate::identity::Actor;
use crate::roles::Role;
use crate::workflow::{EntityKind, TransitionKind};

/// Whether the entity owner may perform the transition without holding
/// one of the elevated roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipRule {
    OwnerOrElevated,
    ElevatedOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub elevated: &'static [Role],
    pub ownership: OwnershipRule,
}

const fn policy(elevated: &'static [Role], ownership: OwnershipRule) -> TransitionPolicy {
    TransitionPolicy { elevated, ownership }
}

/// Looks up the policy row for a transition. `None` means the
/// transition is not defined for that entity family at all.
pub fn policy_for(kind: EntityKind, transition: TransitionKind) -> Option<TransitionPolicy> {
    use OwnershipRule::{ElevatedOnly, OwnerOrElevated};
    use Role::{Admin, GroupLeader, Hr, It, PlantManager, ProductionManager, Quality};
    use TransitionKind::{
        Acknowledge, Activate, Approve, Assign, Cancel, Close, Complete, Delete, Dispose,
        MarkAccounted, Reactivate, Reject, Reopen, Resolve, Return, SendRepair, StartWork, Submit,
    };

    let row = match (kind, transition) {
        (EntityKind::Deviation, Submit) => {
            policy(&[Admin, PlantManager, Quality], OwnerOrElevated)
        }
        (EntityKind::Deviation, Approve | Reject) => {
            policy(&[Admin, PlantManager, Quality, ProductionManager], ElevatedOnly)
        }
        (EntityKind::Deviation, StartWork) => policy(
            &[Admin, PlantManager, Quality, ProductionManager, GroupLeader],
            OwnerOrElevated,
        ),
        (EntityKind::Deviation, Close) => policy(&[Admin, PlantManager, Quality], ElevatedOnly),
        (EntityKind::Deviation, Reactivate) => {
            policy(&[Admin, PlantManager, Quality], OwnerOrElevated)
        }
        (EntityKind::Deviation, Delete) => policy(&[Admin], ElevatedOnly),

        (EntityKind::Overtime, Activate) => {
            policy(&[Admin, PlantManager, Hr, GroupLeader], OwnerOrElevated)
        }
        (EntityKind::Overtime, Approve) => policy(&[Admin, PlantManager, Hr], ElevatedOnly),
        (EntityKind::Overtime, Cancel) => policy(&[Admin, PlantManager, Hr], OwnerOrElevated),
        (EntityKind::Overtime, Complete) => {
            policy(&[Admin, PlantManager, GroupLeader], OwnerOrElevated)
        }
        (EntityKind::Overtime, MarkAccounted) => policy(&[Admin, Hr], ElevatedOnly),
        // Reactivate exits the canceled terminal status; admin only.
        (EntityKind::Overtime, Reactivate) => policy(&[Admin], ElevatedOnly),
        (EntityKind::Overtime, Delete) => policy(&[Admin], ElevatedOnly),

        (EntityKind::Inventory, Assign | Return | SendRepair | Dispose) => {
            policy(&[Admin, It], ElevatedOnly)
        }
        (EntityKind::Inventory, Delete) => policy(&[Admin], ElevatedOnly),

        (EntityKind::Failure, Acknowledge | Resolve) => policy(
            &[Admin, PlantManager, ProductionManager, GroupLeader],
            OwnerOrElevated,
        ),
        (EntityKind::Failure, Reopen) => policy(&[Admin], ElevatedOnly),
        (EntityKind::Failure, Delete) => policy(&[Admin], ElevatedOnly),

        _ => return None,
    };

    Some(row)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DenyReason {
    UnknownTransition { kind: EntityKind, transition: TransitionKind },
    TerminalLocked { status: &'static str },
    NotPermitted { transition: TransitionKind, required: Vec<Role> },
    MissingDecisionRole { role: Role },
    NotActionParticipant { required: Vec<Role> },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTransition { kind, transition } => {
                write!(f, "`{transition}` is not a {kind} transition")
            }
            Self::TerminalLocked { status } => {
                write!(f, "entity is locked in terminal status `{status}`")
            }
            Self::NotPermitted { transition, required } => {
                let roles: Vec<&str> = required.iter().map(|role| role.as_str()).collect();
                write!(f, "`{transition}` requires ownership or one of: {}", roles.join(", "))
            }
            Self::MissingDecisionRole { role } => {
                write!(f, "a `{role}` decision requires that role")
            }
            Self::NotActionParticipant { required } => {
                let roles: Vec<&str> = required.iter().map(|role| role.as_str()).collect();
                write!(
                    f,
                    "corrective-action changes require the creator, the deviation owner, the assigned responsible, or one of: {}",
                    roles.join(", ")
                )
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny(DenyReason),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// The shared authorization guard. Pure: it decides, it never mutates
/// and never errors.
///
/// Admission order: admins are always admitted; terminal statuses lock
/// everyone else out; then the policy row's elevated roles and
/// ownership rule apply.
pub fn authorize(
    kind: EntityKind,
    transition: TransitionKind,
    actor: &Actor,
    owner_id: &str,
    current_status: &'static str,
    current_is_terminal: bool,
) -> GuardDecision {
    let Some(policy) = policy_for(kind, transition) else {
        return GuardDecision::Deny(DenyReason::UnknownTransition { kind, transition });
    };

    if actor.is_admin() {
        return GuardDecision::Allow;
    }

    if current_is_terminal {
        return GuardDecision::Deny(DenyReason::TerminalLocked { status: current_status });
    }

    if actor.has_any_role(policy.elevated) {
        return GuardDecision::Allow;
    }

    if policy.ownership == OwnershipRule::OwnerOrElevated && actor.is_same_user(owner_id) {
        return GuardDecision::Allow;
    }

    GuardDecision::Deny(DenyReason::NotPermitted {
        transition,
        required: policy.elevated.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use crate::identity::Actor;
    use crate::roles::Role;
    use crate::workflow::{EntityKind, TransitionKind};

    use super::{authorize, policy_for, DenyReason, GuardDecision, OwnershipRule};

    fn employee(user_id: &str) -> Actor {
        Actor::new(user_id, [Role::Employee])
    }

    #[test]
    fn owner_may_cancel_their_own_order() {
        let decision = authorize(
            EntityKind::Overtime,
            TransitionKind::Cancel,
            &employee("jan.kowalski@plant.example"),
            "jan.kowalski@plant.example",
            "pending",
            false,
        );
        assert_eq!(decision, GuardDecision::Allow);
    }

    #[test]
    fn non_owner_without_role_is_denied() {
        let decision = authorize(
            EntityKind::Overtime,
            TransitionKind::Cancel,
            &employee("ewa.nowak@plant.example"),
            "jan.kowalski@plant.example",
            "pending",
            false,
        );
        assert!(matches!(decision, GuardDecision::Deny(DenyReason::NotPermitted { .. })));
    }

    #[test]
    fn ownership_never_grants_elevated_only_transitions() {
        let decision = authorize(
            EntityKind::Overtime,
            TransitionKind::Approve,
            &employee("jan.kowalski@plant.example"),
            "jan.kowalski@plant.example",
            "pending",
            false,
        );
        assert!(!decision.is_allowed());
    }

    #[test]
    fn hr_may_approve_regardless_of_ownership() {
        let hr = Actor::new("anna.lis@plant.example", [Role::Hr]);
        let decision = authorize(
            EntityKind::Overtime,
            TransitionKind::Approve,
            &hr,
            "jan.kowalski@plant.example",
            "pending",
            false,
        );
        assert_eq!(decision, GuardDecision::Allow);
    }

    #[test]
    fn production_manager_covers_group_leader_policies() {
        let pm = Actor::new("marek.wrona@plant.example", [Role::ProductionManager]);
        let decision = authorize(
            EntityKind::Overtime,
            TransitionKind::Complete,
            &pm,
            "someone.else@plant.example",
            "approved",
            false,
        );
        assert_eq!(decision, GuardDecision::Allow);
    }

    #[test]
    fn terminal_status_locks_out_everyone_but_admin() {
        let hr = Actor::new("anna.lis@plant.example", [Role::Hr]);
        let decision = authorize(
            EntityKind::Overtime,
            TransitionKind::Reactivate,
            &hr,
            "jan.kowalski@plant.example",
            "accounted",
            true,
        );
        assert!(matches!(
            decision,
            GuardDecision::Deny(DenyReason::TerminalLocked { status: "accounted" })
        ));

        let admin = Actor::new("root@plant.example", [Role::Admin]);
        let decision = authorize(
            EntityKind::Overtime,
            TransitionKind::Reactivate,
            &admin,
            "jan.kowalski@plant.example",
            "accounted",
            true,
        );
        assert_eq!(decision, GuardDecision::Allow);
    }

    #[test]
    fn undeclared_transition_is_denied_not_panicked() {
        let admin = Actor::new("root@plant.example", [Role::Admin]);
        let decision = authorize(
            EntityKind::Inventory,
            TransitionKind::Approve,
            &admin,
            "it.desk@plant.example",
            "in-stock",
            false,
        );
        assert!(matches!(
            decision,
            GuardDecision::Deny(DenyReason::UnknownTransition { .. })
        ));
    }

    #[test]
    fn bulk_delete_is_admin_only_everywhere() {
        for kind in
            [EntityKind::Deviation, EntityKind::Overtime, EntityKind::Inventory, EntityKind::Failure]
        {
            let row = policy_for(kind, TransitionKind::Delete).expect("delete policy");
            assert_eq!(row.elevated, &[Role::Admin]);
            assert_eq!(row.ownership, OwnershipRule::ElevatedOnly);
        }
    }
}

use serde::{Deserialize, Serialize};

/// Plant roles as assigned by the directory. Stored in documents as
/// kebab-case strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    PlantManager,
    ProductionManager,
    GroupLeader,
    Hr,
    Quality,
    It,
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::PlantManager => "plant-manager",
            Self::ProductionManager => "production-manager",
            Self::GroupLeader => "group-leader",
            Self::Hr => "hr",
            Self::Quality => "quality",
            Self::It => "it",
            Self::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "plant-manager" => Some(Self::PlantManager),
            "production-manager" => Some(Self::ProductionManager),
            "group-leader" => Some(Self::GroupLeader),
            "hr" => Some(Self::Hr),
            "quality" => Some(Self::Quality),
            "it" => Some(Self::It),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }

    /// Whether holding `self` satisfies a requirement for `required`.
    /// Production managers cover group-leader duties on the floor.
    pub fn satisfies(self, required: Role) -> bool {
        if self == required {
            return true;
        }
        matches!((self, required), (Self::ProductionManager, Self::GroupLeader))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn roles_round_trip_from_storage_encoding() {
        let cases = [
            Role::Admin,
            Role::PlantManager,
            Role::ProductionManager,
            Role::GroupLeader,
            Role::Hr,
            Role::Quality,
            Role::It,
            Role::Employee,
        ];

        for role in cases {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn production_manager_covers_group_leader() {
        assert!(Role::ProductionManager.satisfies(Role::GroupLeader));
        assert!(!Role::GroupLeader.satisfies(Role::ProductionManager));
        assert!(!Role::Hr.satisfies(Role::GroupLeader));
    }

    #[test]
    fn every_role_satisfies_itself() {
        assert!(Role::Quality.satisfies(Role::Quality));
        assert!(Role::Admin.satisfies(Role::Admin));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Stamp, StampMap};
use crate::workflow::executor::WorkflowEntity;
use crate::workflow::{EntityKind, StatusMachine, TransitionKind, TransitionSpec};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetStatus {
    InStock,
    Assigned,
    InRepair,
    Disposed,
}

const ASSET_TRANSITIONS: &[TransitionSpec<AssetStatus>] = &[
    TransitionSpec {
        transition: TransitionKind::Assign,
        from: &[AssetStatus::InStock],
        to: AssetStatus::Assigned,
    },
    TransitionSpec {
        transition: TransitionKind::Return,
        from: &[AssetStatus::Assigned, AssetStatus::InRepair],
        to: AssetStatus::InStock,
    },
    TransitionSpec {
        transition: TransitionKind::SendRepair,
        from: &[AssetStatus::InStock, AssetStatus::Assigned],
        to: AssetStatus::InRepair,
    },
    TransitionSpec {
        transition: TransitionKind::Dispose,
        from: &[AssetStatus::InStock, AssetStatus::InRepair],
        to: AssetStatus::Disposed,
    },
];

impl StatusMachine for AssetStatus {
    const KIND: EntityKind = EntityKind::Inventory;

    fn transitions() -> &'static [TransitionSpec<Self>] {
        ASSET_TRANSITIONS
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Disposed)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::InStock => "in-stock",
            Self::Assigned => "assigned",
            Self::InRepair => "in-repair",
            Self::Disposed => "disposed",
        }
    }
}

impl AssetStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in-stock" => Some(Self::InStock),
            "assigned" => Some(Self::Assigned),
            "in-repair" => Some(Self::InRepair),
            "disposed" => Some(Self::Disposed),
            _ => None,
        }
    }
}

/// An IT asset: laptop, scanner, badge printer. Workflow covers the
/// custody lifecycle; purchase and depreciation live elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub internal_id: String,
    pub name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub status: AssetStatus,
    /// Current holder while `assigned`; cleared on return.
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub registered_by: String,
    #[serde(default)]
    pub stamps: StampMap,
    #[serde(default)]
    pub edited: Option<Stamp>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(
        id: AssetId,
        internal_id: String,
        name: impl Into<String>,
        registered_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            internal_id,
            name: name.into(),
            serial_number: None,
            location: None,
            status: AssetStatus::InStock,
            assigned_to: None,
            registered_by: registered_by.into(),
            stamps: StampMap::new(),
            edited: None,
            version: 1,
            created_at,
        }
    }
}

impl WorkflowEntity for Asset {
    type Status = AssetStatus;

    fn entity_id(&self) -> &str {
        &self.id.0
    }

    fn status(&self) -> AssetStatus {
        self.status
    }

    fn set_status(&mut self, status: AssetStatus) {
        self.status = status;
        if status != AssetStatus::Assigned {
            self.assigned_to = None;
        }
    }

    fn owner(&self) -> &str {
        &self.registered_by
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    fn record_stamp(&mut self, status: AssetStatus, stamp: Stamp) {
        self.stamps.insert(status.as_str().to_owned(), stamp);
    }

    fn record_edited(&mut self, stamp: Stamp) {
        self.edited = Some(stamp);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::errors::DomainError;
    use crate::identity::Actor;
    use crate::policy::DenyReason;
    use crate::roles::Role;
    use crate::workflow::executor::execute;
    use crate::workflow::TransitionKind;

    use super::{Asset, AssetId, AssetStatus};

    fn asset() -> Asset {
        Asset::new(
            AssetId("as-1".to_owned()),
            "21/26".to_owned(),
            "Zebra ZT411 label printer",
            "it.desk@plant.example",
            Utc::now(),
        )
    }

    fn it_staff() -> Actor {
        Actor::new("piotr.zawada@plant.example", [Role::It])
    }

    #[test]
    fn custody_cycle_assign_repair_return() {
        let mut asset = asset();
        let actor = it_staff();
        let now = Utc::now();

        execute(&mut asset, TransitionKind::Assign, &actor, now).expect("in-stock -> assigned");
        asset.assigned_to = Some("jan.kowalski@plant.example".to_owned());

        execute(&mut asset, TransitionKind::SendRepair, &actor, now)
            .expect("assigned -> in-repair");
        assert_eq!(asset.assigned_to, None);

        execute(&mut asset, TransitionKind::Return, &actor, now).expect("in-repair -> in-stock");
        assert_eq!(asset.status, AssetStatus::InStock);
        assert!(asset.stamps.contains_key("in-repair"));
    }

    #[test]
    fn disposal_is_terminal_for_non_admins() {
        let mut asset = asset();
        let actor = it_staff();
        execute(&mut asset, TransitionKind::Dispose, &actor, Utc::now())
            .expect("in-stock -> disposed");

        let error = execute(&mut asset, TransitionKind::Return, &actor, Utc::now())
            .expect_err("disposed assets are locked");
        assert!(matches!(
            error,
            DomainError::Unauthorized(DenyReason::TerminalLocked { status: "disposed" })
        ));
    }

    #[test]
    fn an_assigned_asset_cannot_be_disposed_directly() {
        let mut asset = asset();
        let actor = it_staff();
        execute(&mut asset, TransitionKind::Assign, &actor, Utc::now()).expect("assign");

        let error = execute(&mut asset, TransitionKind::Dispose, &actor, Utc::now())
            .expect_err("must return or repair first");
        assert!(matches!(error, DomainError::InvalidTransition { from: "assigned", .. }));
    }

    #[test]
    fn custody_transitions_require_the_it_role() {
        let mut asset = asset();
        let outsider = Actor::new("jan.kowalski@plant.example", [Role::Employee]);

        let error = execute(&mut asset, TransitionKind::Assign, &outsider, Utc::now())
            .expect_err("employees cannot assign hardware");
        assert!(matches!(error, DomainError::Unauthorized(_)));
    }
}

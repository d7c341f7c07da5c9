use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Stamp, StampMap};
use crate::errors::DomainError;
use crate::outbox::NotificationIntent;
use crate::workflow::executor::WorkflowEntity;
use crate::workflow::{EntityKind, StatusMachine, TransitionKind, TransitionSpec};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OvertimeOrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OvertimeStatus {
    Forecast,
    Pending,
    Approved,
    Canceled,
    Completed,
    Accounted,
}

const OVERTIME_TRANSITIONS: &[TransitionSpec<OvertimeStatus>] = &[
    TransitionSpec {
        transition: TransitionKind::Activate,
        from: &[OvertimeStatus::Forecast],
        to: OvertimeStatus::Pending,
    },
    TransitionSpec {
        transition: TransitionKind::Approve,
        from: &[OvertimeStatus::Pending],
        to: OvertimeStatus::Approved,
    },
    TransitionSpec {
        transition: TransitionKind::Cancel,
        from: &[OvertimeStatus::Forecast, OvertimeStatus::Pending, OvertimeStatus::Approved],
        to: OvertimeStatus::Canceled,
    },
    TransitionSpec {
        transition: TransitionKind::Complete,
        from: &[OvertimeStatus::Approved],
        to: OvertimeStatus::Completed,
    },
    TransitionSpec {
        transition: TransitionKind::MarkAccounted,
        from: &[OvertimeStatus::Completed],
        to: OvertimeStatus::Accounted,
    },
    TransitionSpec {
        transition: TransitionKind::Reactivate,
        from: &[OvertimeStatus::Canceled],
        to: OvertimeStatus::Pending,
    },
];

impl StatusMachine for OvertimeStatus {
    const KIND: EntityKind = EntityKind::Overtime;

    fn transitions() -> &'static [TransitionSpec<Self>] {
        OVERTIME_TRANSITIONS
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Accounted)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Forecast => "forecast",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Canceled => "canceled",
            Self::Completed => "completed",
            Self::Accounted => "accounted",
        }
    }
}

impl OvertimeStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "forecast" => Some(Self::Forecast),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "canceled" => Some(Self::Canceled),
            "completed" => Some(Self::Completed),
            "accounted" => Some(Self::Accounted),
            _ => None,
        }
    }
}

/// Orders whose work date lies further out than the forecast window
/// start as `forecast`; they are activated into the approval queue once
/// the date approaches.
pub fn initial_status(
    work_date: NaiveDate,
    created_on: NaiveDate,
    forecast_window_days: i64,
) -> OvertimeStatus {
    let lead_days = (work_date - created_on).num_days();
    if lead_days > forecast_window_days {
        OvertimeStatus::Forecast
    } else {
        OvertimeStatus::Pending
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeOrder {
    pub id: OvertimeOrderId,
    pub internal_id: String,
    pub status: OvertimeStatus,
    pub requested_by: String,
    #[serde(default)]
    pub department: Option<String>,
    pub work_date: NaiveDate,
    pub hours: Decimal,
    pub headcount: u32,
    pub reason: String,
    #[serde(default)]
    pub requires_vacancy_check: bool,
    #[serde(default)]
    pub vacancy_confirmed: bool,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub stamps: StampMap,
    #[serde(default)]
    pub edited: Option<Stamp>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl OvertimeOrder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OvertimeOrderId,
        internal_id: String,
        requested_by: impl Into<String>,
        work_date: NaiveDate,
        hours: Decimal,
        headcount: u32,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
        forecast_window_days: i64,
    ) -> Self {
        let requested_by = requested_by.into();
        let status = initial_status(work_date, created_at.date_naive(), forecast_window_days);

        let mut stamps = StampMap::new();
        if status == OvertimeStatus::Pending {
            stamps.insert("pending".to_owned(), Stamp::new(requested_by.clone(), created_at));
        }

        Self {
            id,
            internal_id,
            status,
            requested_by,
            department: None,
            work_date,
            hours,
            headcount,
            reason: reason.into(),
            requires_vacancy_check: false,
            vacancy_confirmed: false,
            cancel_reason: None,
            stamps,
            edited: None,
            version: 1,
            created_at,
        }
    }
}

impl WorkflowEntity for OvertimeOrder {
    type Status = OvertimeStatus;

    fn entity_id(&self) -> &str {
        &self.id.0
    }

    fn status(&self) -> OvertimeStatus {
        self.status
    }

    fn set_status(&mut self, status: OvertimeStatus) {
        self.status = status;
    }

    fn owner(&self) -> &str {
        &self.requested_by
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    fn record_stamp(&mut self, status: OvertimeStatus, stamp: Stamp) {
        self.stamps.insert(status.as_str().to_owned(), stamp);
    }

    fn record_edited(&mut self, stamp: Stamp) {
        self.edited = Some(stamp);
    }

    fn check_preconditions(&self, transition: TransitionKind) -> Result<(), DomainError> {
        if transition == TransitionKind::Approve
            && self.requires_vacancy_check
            && !self.vacancy_confirmed
        {
            return Err(DomainError::VacancyRequired);
        }
        Ok(())
    }

    fn notifications(&self, transition: TransitionKind) -> Vec<NotificationIntent> {
        if transition != TransitionKind::Approve {
            return Vec::new();
        }

        vec![NotificationIntent {
            event_type: "overtime.approved".to_owned(),
            recipient: self.requested_by.clone(),
            subject: format!("Overtime order {} approved", self.internal_id),
            template: "overtime-approved".to_owned(),
            fields: BTreeMap::from([
                ("internal_id".to_owned(), self.internal_id.clone()),
                ("work_date".to_owned(), self.work_date.to_string()),
                ("hours".to_owned(), self.hours.to_string()),
                ("headcount".to_owned(), self.headcount.to_string()),
            ]),
        }]
    }
}

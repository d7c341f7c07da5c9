//! Read-side projections: list filters with a hard row cap, display
//! fields derived at projection time, and per-status tallies for the
//! dashboard cards. No pagination; the cap substitutes for cursoring.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::deviation::Deviation;
use crate::domain::failure::FailureReport;
use crate::domain::inventory::Asset;
use crate::domain::overtime::OvertimeOrder;
use crate::identity::display_name_from_email;
use crate::workflow::StatusMachine;

/// Hard cap applied to every list view.
pub const LIST_CAP: u32 = 2000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Matched against internal id and document text.
    pub search: Option<String>,
    /// Status storage strings; empty means all.
    pub statuses: Vec<String>,
    /// Restricts to one creator identity. Set for callers without an
    /// elevated role so they only see their own records.
    pub owner: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl ListFilter {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(LIST_CAP).clamp(1, LIST_CAP)
    }

    pub fn scoped_to_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviationSummary {
    pub internal_id: String,
    pub title: String,
    pub status: &'static str,
    pub reported_by_name: String,
    pub created_on: String,
    pub open_actions: usize,
    pub overdue_actions: usize,
}

impl DeviationSummary {
    pub fn project(deviation: &Deviation, today: NaiveDate) -> Self {
        Self {
            internal_id: deviation.internal_id.clone(),
            title: deviation.title.clone(),
            status: deviation.status.as_str(),
            reported_by_name: display_name_from_email(&deviation.reported_by),
            created_on: deviation.created_at.date_naive().to_string(),
            open_actions: deviation.open_action_count(),
            overdue_actions: deviation.overdue_action_count(today),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OvertimeSummary {
    pub internal_id: String,
    pub status: &'static str,
    pub requested_by_name: String,
    pub work_date: String,
    pub hours: Decimal,
    pub headcount: u32,
}

impl OvertimeSummary {
    pub fn project(order: &OvertimeOrder) -> Self {
        Self {
            internal_id: order.internal_id.clone(),
            status: order.status.as_str(),
            requested_by_name: display_name_from_email(&order.requested_by),
            work_date: order.work_date.to_string(),
            hours: order.hours,
            headcount: order.headcount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssetSummary {
    pub internal_id: String,
    pub name: String,
    pub status: &'static str,
    pub assigned_to_name: Option<String>,
    pub location: Option<String>,
}

impl AssetSummary {
    pub fn project(asset: &Asset) -> Self {
        Self {
            internal_id: asset.internal_id.clone(),
            name: asset.name.clone(),
            status: asset.status.as_str(),
            assigned_to_name: asset.assigned_to.as_deref().map(display_name_from_email),
            location: asset.location.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub internal_id: String,
    pub machine: String,
    pub status: &'static str,
    pub reported_by_name: String,
    pub reported_on: String,
}

impl FailureSummary {
    pub fn project(report: &FailureReport) -> Self {
        Self {
            internal_id: report.internal_id.clone(),
            machine: report.machine.clone(),
            status: report.status.as_str(),
            reported_by_name: display_name_from_email(&report.reported_by),
            reported_on: report.created_at.date_naive().to_string(),
        }
    }
}

/// Per-status totals for summary cards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    counts: BTreeMap<String, u64>,
}

impl StatusCounts {
    pub fn tally<I: IntoIterator<Item = &'static str>>(statuses: I) -> Self {
        let mut counts = BTreeMap::new();
        for status in statuses {
            *counts.entry(status.to_owned()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn get(&self, status: &str) -> u64 {
        self.counts.get(status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::domain::deviation::{
        ActionStatus, CorrectiveAction, CorrectiveActionId, Deviation, DeviationId,
    };
    use crate::identity::Actor;
    use crate::roles::Role;

    use super::{DeviationSummary, ListFilter, StatusCounts, LIST_CAP};

    #[test]
    fn effective_limit_is_capped() {
        assert_eq!(ListFilter::default().effective_limit(), LIST_CAP);
        assert_eq!(ListFilter { limit: Some(50), ..Default::default() }.effective_limit(), 50);
        assert_eq!(
            ListFilter { limit: Some(100_000), ..Default::default() }.effective_limit(),
            LIST_CAP
        );
        assert_eq!(ListFilter { limit: Some(0), ..Default::default() }.effective_limit(), 1);
    }

    #[test]
    fn deviation_summary_derives_display_fields() {
        let mut deviation = Deviation::new(
            DeviationId("dev-1".to_owned()),
            "3/26".to_owned(),
            "label printer mixes batch codes",
            "details",
            "jan.kowalski@plant.example",
            Utc.with_ymd_and_hms(2026, 2, 10, 6, 45, 0).unwrap(),
        );
        let creator = Actor::new("iza.krol@plant.example", [Role::Quality]);
        let mut overdue = CorrectiveAction::new(
            CorrectiveActionId("act-1".to_owned()),
            "retrain crew",
            "marek.wrona@plant.example",
            NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(),
            "iza.krol@plant.example",
            Utc::now(),
        );
        overdue.status = ActionStatus::Open;
        deviation.add_action(overdue, &creator, Utc::now());

        let summary =
            DeviationSummary::project(&deviation, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());

        assert_eq!(summary.reported_by_name, "Jan Kowalski");
        assert_eq!(summary.created_on, "2026-02-10");
        assert_eq!(summary.open_actions, 1);
        assert_eq!(summary.overdue_actions, 1);
    }

    #[test]
    fn status_counts_tally_and_total() {
        let counts = StatusCounts::tally(["pending", "pending", "approved"]);
        assert_eq!(counts.get("pending"), 2);
        assert_eq!(counts.get("approved"), 1);
        assert_eq!(counts.get("canceled"), 0);
        assert_eq!(counts.total(), 3);
    }
}

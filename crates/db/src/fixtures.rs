//! Demo dataset for local environments and the CLI `seed` command.
//! Content is deterministic; ids come from the normal uuid path.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use plantdesk_core::domain::deviation::DecisionVerdict;
use plantdesk_core::domain::failure::FailureSeverity;
use plantdesk_core::errors::ApplicationError;
use plantdesk_core::identity::Actor;
use plantdesk_core::roles::Role;
use plantdesk_core::workflow::TransitionKind;

use crate::service::{
    NewAsset, NewCorrectiveAction, NewDeviation, NewFailureReport, NewOvertimeOrder,
    WorkflowService,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub deviations: u32,
    pub overtime_orders: u32,
    pub assets: u32,
    pub failure_reports: u32,
}

pub async fn seed_demo_dataset(
    service: &WorkflowService,
    now: DateTime<Utc>,
) -> Result<SeedSummary, ApplicationError> {
    let reporter = Actor::new("jan.kowalski@plant.example", [Role::Employee]);
    let quality = Actor::new("iza.krol@plant.example", [Role::Quality]);
    let manager = Actor::new("maria.zajac@plant.example", [Role::PlantManager]);
    let it_desk = Actor::new("piotr.zawada@plant.example", [Role::It]);

    let deviation = service
        .create_deviation(
            NewDeviation {
                title: "label printer mixes batch codes".to_owned(),
                description: "wrong batch code printed on pallet labels during shift B".to_owned(),
                area: Some("packaging".to_owned()),
                category: Some("labeling".to_owned()),
            },
            &reporter,
            now,
        )
        .await?;
    service
        .transition_deviation(&deviation.id, TransitionKind::Submit, &reporter, now)
        .await?;
    service
        .record_deviation_decision(
            &deviation.id,
            Role::Quality,
            DecisionVerdict::Approved,
            Some("containment verified".to_owned()),
            &quality,
            now,
        )
        .await?;
    service
        .add_corrective_action(
            &deviation.id,
            NewCorrectiveAction {
                title: "retrain label crew".to_owned(),
                responsible: "marek.wrona@plant.example".to_owned(),
                due_date: (now + Duration::days(14)).date_naive(),
            },
            &quality,
            now,
        )
        .await?;
    service
        .add_deviation_note(
            &deviation.id,
            "second pallet from the same shift checked, labels correct",
            &quality,
            now,
        )
        .await?;

    let pending = service
        .create_overtime(
            NewOvertimeOrder {
                work_date: (now + Duration::days(3)).date_naive(),
                hours: Decimal::new(40, 1),
                headcount: 3,
                reason: "line 2 changeover backlog".to_owned(),
                department: Some("packaging".to_owned()),
                requires_vacancy_check: false,
            },
            &reporter,
            now,
        )
        .await?;
    service.transition_overtime(&pending.id, TransitionKind::Approve, &manager, now).await?;

    service
        .create_overtime(
            NewOvertimeOrder {
                work_date: (now + Duration::days(21)).date_naive(),
                hours: Decimal::new(80, 1),
                headcount: 5,
                reason: "annual maintenance shutdown prep".to_owned(),
                department: Some("maintenance".to_owned()),
                requires_vacancy_check: true,
            },
            &reporter,
            now,
        )
        .await?;

    let asset = service
        .create_asset(
            NewAsset {
                name: "Zebra ZT411 label printer".to_owned(),
                serial_number: Some("ZT411-8842-A".to_owned()),
                location: Some("packaging hall".to_owned()),
            },
            &it_desk,
            now,
        )
        .await?;
    service.assign_asset(&asset.id, "jan.kowalski@plant.example", &it_desk, now).await?;

    service
        .create_failure_report(
            NewFailureReport {
                machine: "palletizer L2".to_owned(),
                description: "gripper jams on layer change".to_owned(),
                severity: FailureSeverity::High,
            },
            &reporter,
            now,
        )
        .await?;

    Ok(SeedSummary { deviations: 1, overtime_orders: 2, assets: 1, failure_reports: 1 })
}

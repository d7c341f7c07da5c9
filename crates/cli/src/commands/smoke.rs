use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use crate::commands::CommandResult;
use plantdesk_core::cache::RecordingCacheInvalidator;
use plantdesk_core::config::{AppConfig, LoadOptions};
use plantdesk_core::identity::Actor;
use plantdesk_core::outbox::OutboxStore;
use plantdesk_core::roles::Role;
use plantdesk_core::workflow::TransitionKind;
use plantdesk_db::repositories::SqlOutboxRepository;
use plantdesk_db::{connect_with_settings, migrations, NewOvertimeOrder, WorkflowService};
use plantdesk_notify::{InMemoryEmailSender, OutboxDispatcher};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Runs the whole stack once against a throwaway in-memory database:
/// migrate, create a pending overtime order, approve it, deliver the
/// queued notification through an in-memory sender.
pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_pass"));
            checks.push(skipped("outbox_dispatch"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("workflow_pass"));
            checks.push(skipped("outbox_dispatch"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    runtime.block_on(async {
        let migration_started = Instant::now();
        let pool = match connect_with_settings("sqlite::memory:", 1, 30).await {
            Ok(pool) => pool,
            Err(error) => {
                checks.push(SmokeCheck {
                    name: "migration_visibility",
                    status: SmokeStatus::Fail,
                    elapsed_ms: migration_started.elapsed().as_millis() as u64,
                    message: format!("failed to open throwaway database: {error}"),
                });
                checks.push(skipped("workflow_pass"));
                checks.push(skipped("outbox_dispatch"));
                return;
            }
        };

        if let Err(error) = migrations::run_pending(&pool).await {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: migration_started.elapsed().as_millis() as u64,
                message: format!("migration execution failed: {error}"),
            });
            checks.push(skipped("workflow_pass"));
            checks.push(skipped("outbox_dispatch"));
            return;
        }
        checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: "migrations are visible and executable".to_string(),
        });

        let workflow_started = Instant::now();
        let invalidator = Arc::new(RecordingCacheInvalidator::default());
        let service = WorkflowService::from_pool(
            pool.clone(),
            invalidator.clone(),
            config.workflow.forecast_window_days,
        );
        let requester = Actor::new("smoke.requester@plant.example", [Role::Employee]);
        let approver = Actor::new("smoke.manager@plant.example", [Role::PlantManager]);
        let now = Utc::now();

        let workflow_result = async {
            let order = service
                .create_overtime(
                    NewOvertimeOrder {
                        work_date: (now + Duration::days(2)).date_naive(),
                        hours: Decimal::new(20, 1),
                        headcount: 2,
                        reason: "smoke validation".to_owned(),
                        department: None,
                        requires_vacancy_check: false,
                    },
                    &requester,
                    now,
                )
                .await
                .map_err(|error| format!("create failed: {error}"))?;

            let approved = service
                .transition_overtime(&order.id, TransitionKind::Approve, &approver, now)
                .await
                .map_err(|error| format!("approve failed: {error}"))?;
            if approved.status != "approved" {
                return Err(format!("unexpected status after approval: {}", approved.status));
            }
            if !invalidator.tags().iter().any(|tag| tag == "overtime-orders") {
                return Err("cache tag was not invalidated".to_owned());
            }
            Ok(order)
        }
        .await;

        match workflow_result {
            Ok(_) => checks.push(SmokeCheck {
                name: "workflow_pass",
                status: SmokeStatus::Pass,
                elapsed_ms: workflow_started.elapsed().as_millis() as u64,
                message: "pending order approved end to end".to_string(),
            }),
            Err(message) => {
                checks.push(SmokeCheck {
                    name: "workflow_pass",
                    status: SmokeStatus::Fail,
                    elapsed_ms: workflow_started.elapsed().as_millis() as u64,
                    message,
                });
                checks.push(skipped("outbox_dispatch"));
                return;
            }
        }

        let dispatch_started = Instant::now();
        let outbox = Arc::new(SqlOutboxRepository::new(pool.clone()));
        let sender = Arc::new(InMemoryEmailSender::default());
        let dispatcher =
            OutboxDispatcher::new(outbox.clone(), sender.clone(), config.mailer.max_attempts);

        let dispatch_result = async {
            let report = dispatcher
                .run_once(Utc::now())
                .await
                .map_err(|error| format!("dispatch failed: {error}"))?;
            if report.delivered != 1 {
                return Err(format!("expected one delivery, got {}", report.delivered));
            }
            let remaining = outbox
                .list_pending(10)
                .await
                .map_err(|error| format!("outbox readback failed: {error}"))?;
            if !remaining.is_empty() {
                return Err(format!("{} events still pending", remaining.len()));
            }
            Ok(())
        }
        .await;

        match dispatch_result {
            Ok(()) => checks.push(SmokeCheck {
                name: "outbox_dispatch",
                status: SmokeStatus::Pass,
                elapsed_ms: dispatch_started.elapsed().as_millis() as u64,
                message: format!("delivered {} notification(s)", sender.sent().len()),
            }),
            Err(message) => checks.push(SmokeCheck {
                name: "outbox_dispatch",
                status: SmokeStatus::Fail,
                elapsed_ms: dispatch_started.elapsed().as_millis() as u64,
                message,
            }),
        }

        pool.close().await;
    });

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}

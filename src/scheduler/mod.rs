//! Background scheduler — periodic jobs that scan domain state and emit
//! notifications through the adapter supervisor.
//!
//! Jobs run on independent tokio intervals; the weekly report follows a
//! cron expression checked once a minute — a tick fires when the
//! schedule has a match between the last run and now, which also covers
//! the execute-once-on-startup missed-tick policy. Every job wraps its
//! work in a log-and-continue guard; one failing job never stops the
//! others.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::db;
use crate::error::Result;
use crate::services::notification::{self as notify, NotificationType};
use crate::services::report;
use crate::telegram::{format, Supervisor};

/// Cron expression for the weekly report: Monday 09:00.
const WEEKLY_REPORT_CRON: &str = "0 0 9 * * Mon *";

/// Deadline warnings fire within this many days of `end_date`.
const DEADLINE_WINDOW_DAYS: i32 = 1;

/// A stage with no activity for this many days triggers a status prompt.
const IDLE_DAYS: i32 = 3;

/// Furniture installation lead-time window.
const FURNITURE_WINDOW_DAYS: i32 = 45;

/// Running scheduler: job handles plus the shutdown signal.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop all jobs and wait for them to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }
}

/// Start all periodic jobs.
pub fn start(db: PgPool, supervisor: Arc<Supervisor>) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let jobs: Vec<(&'static str, Duration, JobFn)> = vec![
        (
            "approaching-deadlines",
            Duration::from_secs(3600),
            |db, sup| Box::pin(check_deadlines(db, sup)),
        ),
        (
            "overdue-stages",
            Duration::from_secs(2 * 3600),
            |db, sup| Box::pin(check_overdue(db, sup)),
        ),
        (
            "status-update-prompts",
            Duration::from_secs(6 * 3600),
            |db, sup| Box::pin(check_status_updates(db, sup)),
        ),
        (
            "furniture-reminders",
            Duration::from_secs(24 * 3600),
            |db, sup| Box::pin(check_furniture_reminders(db, sup)),
        ),
        (
            "overspending",
            Duration::from_secs(4 * 3600),
            |db, sup| Box::pin(check_overspending(db, sup)),
        ),
        (
            "cache-maintenance",
            Duration::from_secs(60),
            |db, sup| Box::pin(cache_maintenance(db, sup)),
        ),
    ];

    let mut handles = Vec::new();
    for (name, period, run) in jobs {
        handles.push(spawn_interval_job(
            name,
            period,
            db.clone(),
            Arc::clone(&supervisor),
            shutdown_rx.clone(),
            run,
        ));
    }
    handles.push(spawn_weekly_report_job(
        db,
        supervisor,
        shutdown_rx,
    ));

    info!(jobs = handles.len(), "scheduler started");
    SchedulerHandle {
        shutdown_tx,
        handles,
    }
}

type JobFn = for<'a> fn(
    &'a PgPool,
    &'a Supervisor,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

fn spawn_interval_job(
    name: &'static str,
    period: Duration,
    db: PgPool,
    supervisor: Arc<Supervisor>,
    mut shutdown_rx: watch::Receiver<bool>,
    run: JobFn,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!(job = name, "scheduler job tick");
                    if let Err(e) = run(&db, &supervisor).await {
                        error!(job = name, error = %e, "scheduler job failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!(job = name, "scheduler job stopping");
                    break;
                }
            }
        }
    })
}

/// Weekly report: checked once a minute against the cron schedule.
fn spawn_weekly_report_job(
    db: PgPool,
    supervisor: Arc<Supervisor>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let schedule = match cron::Schedule::from_str(WEEKLY_REPORT_CRON) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "invalid weekly report cron expression");
                return;
            }
        };

        // Epoch start makes the first matching tick fire immediately,
        // which implements the run-once-after-missed-tick policy.
        let mut last_run: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now();
                    let due = schedule.after(&last_run).take(1).any(|next| next <= now);
                    if due {
                        if let Err(e) = send_weekly_reports(&db, &supervisor).await {
                            error!(job = "weekly-report", error = %e, "scheduler job failed");
                        }
                        last_run = now;
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Stages whose deadline is within one day → `deadline_approaching`.
async fn check_deadlines(db: &PgPool, supervisor: &Supervisor) -> Result<()> {
    let stages = db::stages::get_stages_due_soon(db, DEADLINE_WINDOW_DAYS).await?;
    for stage in &stages {
        let Some(project) = db::projects::get_project(db, stage.project_id).await? else {
            continue;
        };
        let Some(end_date) = stage.end_date else { continue };

        let mut recipients = db::projects::get_project_role_user_ids(
            db,
            project.id,
            NotificationType::DeadlineApproaching.recipient_roles(),
        )
        .await?;
        if let Some(responsible) = stage.responsible_user_id {
            if !recipients.contains(&responsible) {
                recipients.push(responsible);
            }
        }

        let notification = notify::build_deadline_approaching(
            project.id,
            &project.name,
            stage.id,
            &stage.name,
            end_date,
            stage.responsible_contact.as_deref(),
            recipients,
        );
        supervisor.deliver(&notification).await?;
    }
    info!(count = stages.len(), "deadline check completed");
    Ok(())
}

/// Stages past their deadline → `deadline_overdue`.
async fn check_overdue(db: &PgPool, supervisor: &Supervisor) -> Result<()> {
    let now = Utc::now();
    let stages = db::stages::get_overdue_stages(db).await?;
    for stage in &stages {
        let Some(project) = db::projects::get_project(db, stage.project_id).await? else {
            continue;
        };
        let Some(end_date) = stage.end_date else { continue };
        let days_overdue = (now.date_naive() - end_date.date_naive()).num_days();

        let mut recipients = db::projects::get_project_role_user_ids(
            db,
            project.id,
            NotificationType::DeadlineOverdue.recipient_roles(),
        )
        .await?;
        if let Some(responsible) = stage.responsible_user_id {
            if !recipients.contains(&responsible) {
                recipients.push(responsible);
            }
        }

        let notification = notify::build_deadline_overdue(
            project.id,
            &project.name,
            stage.id,
            &stage.name,
            end_date,
            days_overdue,
            stage.responsible_contact.as_deref(),
            recipients,
        );
        supervisor.deliver(&notification).await?;
    }
    info!(count = stages.len(), "overdue check completed");
    Ok(())
}

/// Idle `in_progress` stages → `status_update_request` to the
/// responsible person.
async fn check_status_updates(db: &PgPool, supervisor: &Supervisor) -> Result<()> {
    let stages = db::stages::get_stages_needing_status_update(db, IDLE_DAYS).await?;
    let mut prompted = 0;
    for stage in &stages {
        let Some(responsible) = stage.responsible_user_id else {
            continue;
        };
        let Some(project) = db::projects::get_project(db, stage.project_id).await? else {
            continue;
        };
        let notification = notify::build_status_update_request(
            project.id,
            &project.name,
            stage.id,
            &stage.name,
            vec![responsible],
        );
        supervisor.deliver(&notification).await?;
        prompted += 1;
    }
    info!(count = prompted, "status update check completed");
    Ok(())
}

/// Parallel installation stages within the lead-time window →
/// `furniture_order_reminder`.
async fn check_furniture_reminders(db: &PgPool, supervisor: &Supervisor) -> Result<()> {
    let now = Utc::now();
    let stages =
        db::stages::get_parallel_stages_with_upcoming_installation(db, FURNITURE_WINDOW_DAYS)
            .await?;
    for stage in &stages {
        let Some(project) = db::projects::get_project(db, stage.project_id).await? else {
            continue;
        };
        let Some(install_date) = stage.start_date else { continue };
        let days_until = (install_date.date_naive() - now.date_naive()).num_days();

        let recipients = db::projects::get_project_role_user_ids(
            db,
            project.id,
            NotificationType::FurnitureOrderReminder.recipient_roles(),
        )
        .await?;

        let notification = notify::build_furniture_order_reminder(
            project.id,
            &project.name,
            stage.id,
            &stage.name,
            install_date,
            days_until,
            recipients,
        );
        supervisor.deliver(&notification).await?;
    }
    info!(count = stages.len(), "furniture reminder check completed");
    Ok(())
}

/// Projects whose spending exceeds the budget → `overspending_alert`.
async fn check_overspending(db: &PgPool, supervisor: &Supervisor) -> Result<()> {
    let projects = db::projects::get_all_active_projects(db).await?;
    let mut alerts = 0;
    for project in &projects {
        let Some(budget) = project.total_budget.filter(|b| *b > 0.0) else {
            continue;
        };
        let totals = db::budget::get_project_totals(db, project.id).await?;
        if totals.total_spent <= budget || totals.total_spent <= 0.0 {
            continue;
        }

        let overspend_pct = (totals.total_spent - budget) / budget * 100.0;
        let owner_ids = db::projects::get_project_owner_ids(db, project.id).await?;
        let notification = notify::build_overspending_alert(
            project.id,
            &project.name,
            totals.total_spent,
            budget,
            overspend_pct,
            owner_ids,
        );
        supervisor.deliver(&notification).await?;
        alerts += 1;
    }
    info!(count = alerts, "overspending check completed");
    Ok(())
}

/// Weekly reports for every active project, delivered to owners.
async fn send_weekly_reports(db: &PgPool, supervisor: &Supervisor) -> Result<()> {
    let projects = db::projects::get_all_active_projects(db).await?;
    let mut sent = 0;
    for project in &projects {
        let owner_ids = db::projects::get_project_owner_ids(db, project.id).await?;
        if owner_ids.is_empty() {
            continue;
        }

        let stages = db::stages::get_stages_for_project(db, project.id).await?;
        let totals = db::budget::get_project_totals(db, project.id).await?;
        let categories = db::budget::get_category_summaries(db, project.id).await?;
        let weekly = report::build_weekly_report(
            &project.name,
            project.total_budget,
            &stages,
            totals.total_spent,
            categories,
            Utc::now(),
        );

        let notification = notify::build_weekly_report_notification(
            project.id,
            &project.name,
            format::format_weekly_report(&weekly),
            owner_ids,
        );
        supervisor.deliver(&notification).await?;
        sent += 1;
    }
    info!(count = sent, "weekly reports sent");
    Ok(())
}

/// Delete expired cache rows and refresh both materialized views.
async fn cache_maintenance(db: &PgPool, _supervisor: &Supervisor) -> Result<()> {
    let removed = db::cache::cache_cleanup(db).await?;
    db::cache::refresh_views(db).await?;
    if removed > 0 {
        debug!(removed, "expired cache entries removed");
    }
    Ok(())
}

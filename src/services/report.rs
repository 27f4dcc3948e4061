//! Report service — structured, formatting-free report data.
//!
//! Adapters turn these structs into platform markup; the service itself
//! never emits HTML.

use chrono::{DateTime, Utc};

use crate::db::budget::CategorySummary;
use crate::domain::{Stage, StageStatus};
use crate::services::budget::BudgetAnalysis;

/// Per-status stage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageCounts {
    /// Total stages.
    pub total: usize,
    /// Completed stages.
    pub completed: usize,
    /// Stages in progress.
    pub in_progress: usize,
    /// Delayed stages.
    pub delayed: usize,
    /// Planned stages.
    pub planned: usize,
}

/// One overdue stage with its lateness.
#[derive(Debug, Clone, PartialEq)]
pub struct OverdueStage {
    /// Stage name.
    pub name: String,
    /// Deadline that was missed.
    pub end_date: Option<DateTime<Utc>>,
    /// Days past the deadline.
    pub days_overdue: i64,
    /// Responsible contact, when set.
    pub responsible: Option<String>,
}

/// One upcoming stage.
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingStage {
    /// Stage name.
    pub name: String,
    /// Planned start.
    pub start_date: Option<DateTime<Utc>>,
    /// Days until the start.
    pub days_until: i64,
}

/// Weekly report payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyReport {
    /// Project name.
    pub project_name: String,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// Stage counters by status.
    pub stages_summary: StageCounts,
    /// Completed stages (name + end date).
    pub completed_stages: Vec<Stage>,
    /// Stages currently in progress.
    pub current_stages: Vec<Stage>,
    /// Overdue stages.
    pub overdue_stages: Vec<OverdueStage>,
    /// Stages starting within 7 days.
    pub upcoming_stages: Vec<UpcomingStage>,
    /// Budget health.
    pub budget_analysis: BudgetAnalysis,
    /// Per-category breakdown.
    pub category_breakdown: Vec<CategorySummary>,
}

/// Build the weekly report from already-loaded data.
pub fn build_weekly_report(
    project_name: &str,
    total_budget: Option<f64>,
    stages: &[Stage],
    total_spent: f64,
    category_summaries: Vec<CategorySummary>,
    now: DateTime<Utc>,
) -> WeeklyReport {
    let mut counts = StageCounts {
        total: stages.len(),
        ..StageCounts::default()
    };
    let mut completed = Vec::new();
    let mut current = Vec::new();
    let mut overdue = Vec::new();
    let mut upcoming = Vec::new();

    for stage in stages {
        match stage.status {
            StageStatus::Completed => {
                counts.completed += 1;
                completed.push(stage.clone());
            }
            StageStatus::InProgress => {
                counts.in_progress += 1;
                current.push(stage.clone());
            }
            StageStatus::Delayed => counts.delayed += 1,
            StageStatus::Planned => {
                counts.planned += 1;
                if let Some(start) = stage.start_date {
                    let days_until = (start.date_naive() - now.date_naive()).num_days();
                    if (0..=7).contains(&days_until) {
                        upcoming.push(UpcomingStage {
                            name: stage.name.clone(),
                            start_date: stage.start_date,
                            days_until,
                        });
                    }
                }
            }
        }
        if stage.is_overdue(now) {
            let days_overdue = stage
                .end_date
                .map(|end| (now.date_naive() - end.date_naive()).num_days())
                .unwrap_or_default();
            overdue.push(OverdueStage {
                name: stage.name.clone(),
                end_date: stage.end_date,
                days_overdue,
                responsible: stage.responsible_contact.clone(),
            });
        }
    }

    WeeklyReport {
        project_name: project_name.to_owned(),
        generated_at: now,
        stages_summary: counts,
        completed_stages: completed,
        current_stages: current,
        overdue_stages: overdue,
        upcoming_stages: upcoming,
        budget_analysis: super::budget::analyze_budget(total_budget, total_spent),
        category_breakdown: category_summaries,
    }
}

/// Compact per-stage status line.
#[derive(Debug, Clone, PartialEq)]
pub struct StageStatusLine {
    /// Stage name.
    pub name: String,
    /// Stage order.
    pub order: i32,
    /// Work status.
    pub status: StageStatus,
    /// Whether the stage is off the main path.
    pub is_parallel: bool,
    /// Planned start.
    pub start_date: Option<DateTime<Utc>>,
    /// Planned end.
    pub end_date: Option<DateTime<Utc>>,
    /// Responsible contact.
    pub responsible: Option<String>,
    /// Days overdue; zero when on track.
    pub days_overdue: i64,
}

/// Status report payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Project name.
    pub project_name: String,
    /// Per-stage lines, in order.
    pub stages: Vec<StageStatusLine>,
    /// Share of completed stages, 0–100.
    pub progress_pct: f64,
    /// Total stage count.
    pub total: usize,
    /// Completed stage count.
    pub completed: usize,
}

/// Build the quick status report.
pub fn build_status_report(project_name: &str, stages: &[Stage], now: DateTime<Utc>) -> StatusReport {
    let total = stages.len();
    let completed = stages
        .iter()
        .filter(|s| s.status == StageStatus::Completed)
        .count();
    let progress_pct = if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let lines = stages
        .iter()
        .map(|s| StageStatusLine {
            name: s.name.clone(),
            order: s.order,
            status: s.status,
            is_parallel: s.is_parallel,
            start_date: s.start_date,
            end_date: s.end_date,
            responsible: s.responsible_contact.clone(),
            days_overdue: if s.is_overdue(now) {
                s.end_date
                    .map(|end| (now.date_naive() - end.date_naive()).num_days())
                    .unwrap_or_default()
            } else {
                0
            },
        })
        .collect();

    StatusReport {
        project_name: project_name.to_owned(),
        stages: lines,
        progress_pct,
        total,
        completed,
    }
}

/// Current + next stage payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NextStageInfo {
    /// Project name.
    pub project_name: String,
    /// The `in_progress` main stage, if any.
    pub current_stage: Option<Stage>,
    /// The subsequent `planned` main stage, if any.
    pub next_stage: Option<Stage>,
}

/// Deadline report payload: three buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineReport {
    /// Project name.
    pub project_name: String,
    /// Past-deadline stages.
    pub overdue: Vec<OverdueStage>,
    /// Due within 3 days.
    pub due_soon: Vec<StageStatusLine>,
    /// In progress and on track.
    pub on_track: Vec<StageStatusLine>,
}

/// Build the deadline report from loaded stages.
pub fn build_deadline_report(
    project_name: &str,
    stages: &[Stage],
    now: DateTime<Utc>,
) -> DeadlineReport {
    let mut overdue = Vec::new();
    let mut due_soon = Vec::new();
    let mut on_track = Vec::new();

    for s in stages {
        if s.status == StageStatus::Completed {
            continue;
        }
        let Some(end) = s.end_date else { continue };

        if s.is_overdue(now) {
            overdue.push(OverdueStage {
                name: s.name.clone(),
                end_date: s.end_date,
                days_overdue: (now.date_naive() - end.date_naive()).num_days(),
                responsible: s.responsible_contact.clone(),
            });
            continue;
        }

        let days_left = (end.date_naive() - now.date_naive()).num_days();
        let line = StageStatusLine {
            name: s.name.clone(),
            order: s.order,
            status: s.status,
            is_parallel: s.is_parallel,
            start_date: s.start_date,
            end_date: s.end_date,
            responsible: s.responsible_contact.clone(),
            days_overdue: 0,
        };
        if (0..=3).contains(&days_left) {
            due_soon.push(line);
        } else if s.status == StageStatus::InProgress {
            on_track.push(line);
        }
    }

    DeadlineReport {
        project_name: project_name.to_owned(),
        overdue,
        due_soon,
        on_track,
    }
}

// ---------------------------------------------------------------------------
// Quick text commands
// ---------------------------------------------------------------------------

/// Canonical command identifier produced by the quick-command parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickCommand {
    Budget,
    Stages,
    Expenses,
    Report,
    NextStage,
    MyStage,
    Status,
    Deadline,
    Expert,
}

/// Bilingual quick commands that can be sent as plain text (no `/`).
const QUICK_COMMANDS: [(&str, QuickCommand); 18] = [
    ("бюджет", QuickCommand::Budget),
    ("budget", QuickCommand::Budget),
    ("этапы", QuickCommand::Stages),
    ("stages", QuickCommand::Stages),
    ("расходы", QuickCommand::Expenses),
    ("expenses", QuickCommand::Expenses),
    ("отчёт", QuickCommand::Report),
    ("отчет", QuickCommand::Report),
    ("report", QuickCommand::Report),
    ("следующий этап", QuickCommand::NextStage),
    ("next stage", QuickCommand::NextStage),
    ("мой этап", QuickCommand::MyStage),
    ("my stage", QuickCommand::MyStage),
    ("статус", QuickCommand::Status),
    ("status", QuickCommand::Status),
    ("дедлайн", QuickCommand::Deadline),
    ("deadline", QuickCommand::Deadline),
    ("эксперт", QuickCommand::Expert),
];

/// Match plain text against the quick-command set (case-insensitive).
pub fn parse_quick_command(text: &str) -> Option<QuickCommand> {
    let normalized = text.trim().to_lowercase();
    QUICK_COMMANDS
        .iter()
        .find(|(key, _)| *key == normalized)
        .map(|(_, cmd)| *cmd)
}

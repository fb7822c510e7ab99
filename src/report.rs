// Copyright (c) 2025 - Cowboy AI, Inc.
//! Outcome reporting
//!
//! Every entry outcome is reported exactly once: logged through `tracing`
//! at the level its lifecycle transition produced, appended to the
//! [`RunReport`], and for writes and failures also sent to the notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};
use uuid::Uuid;

use crate::notify::Notifier;
use crate::schema::ResourceKind;
use crate::state_machine::EntryState;

/// Result for one desired-state entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryReport {
    pub kind: ResourceKind,
    /// Natural key, or a best-effort label when no key could be built
    pub key: String,
    #[serde(flatten)]
    pub state: EntryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl fmt::Display for EntryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.key, self.state)?;
        if let Some(id) = self.id {
            write!(f, " (id {})", id)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " - {}", detail)?;
        }
        Ok(())
    }
}

/// Results for one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub kind: ResourceKind,
    pub entries: Vec<EntryReport>,
    /// The inventory became unreachable part way through
    pub aborted: bool,
    /// Entries left unprocessed after an abort
    pub not_attempted: usize,
}

/// Outcome totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub created: usize,
    pub updated: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

impl OutcomeCounts {
    fn add(&mut self, state: &EntryState) {
        match state {
            EntryState::Created => self.created += 1,
            EntryState::Updated => self.updated += 1,
            EntryState::Resolved(_) => self.resolved += 1,
            EntryState::Skipped(_) => self.skipped += 1,
            EntryState::Failed(_) => self.failed += 1,
            EntryState::Pending => self.not_attempted += 1,
        }
    }

    pub fn writes(&self) -> usize {
        self.created + self.updated
    }

    /// Whether the run left work undone: failed or unprocessed entries.
    /// Skipped entries are reported but do not count.
    pub fn has_problems(&self) -> bool {
        self.failed > 0 || self.not_attempted > 0
    }
}

/// Summary of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for stage in &self.stages {
            for entry in &stage.entries {
                counts.add(&entry.state);
            }
            counts.not_attempted += stage.not_attempted;
        }
        counts
    }

    pub fn stage(&self, kind: ResourceKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// All entry reports in processing order
    pub fn entries(&self) -> impl Iterator<Item = &EntryReport> {
        self.stages.iter().flat_map(|s| s.entries.iter())
    }

    /// Entry report for `kind` with natural key `key`
    pub fn entry(&self, kind: ResourceKind, key: &str) -> Option<&EntryReport> {
        self.entries().find(|e| e.kind == kind && e.key == key)
    }

    pub fn summary(&self) -> String {
        let c = self.counts();
        let aborted: Vec<_> = self
            .stages
            .iter()
            .filter(|s| s.aborted)
            .map(|s| s.kind.label())
            .collect();

        let mut summary = format!(
            "Run {} finished: {} created, {} updated, {} unchanged, {} skipped, {} failed, {} not attempted",
            self.run_id, c.created, c.updated, c.resolved, c.skipped, c.failed, c.not_attempted
        );
        if !aborted.is_empty() {
            summary.push_str(&format!(" (aborted: {})", aborted.join(", ")));
        }
        summary
    }
}

/// Collects outcomes and forwards them to logs and the notifier
pub struct Reporter {
    notifier: Option<Arc<dyn Notifier>>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    stages: Vec<StageReport>,
}

impl Reporter {
    pub fn new(notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            notifier,
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            stages: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn begin_stage(&mut self, kind: ResourceKind) {
        info!("🔄 Syncing {}", kind.label());
        self.stages.push(StageReport {
            kind,
            entries: Vec::new(),
            aborted: false,
            not_attempted: 0,
        });
    }

    /// Report one terminal entry outcome
    pub async fn record(&mut self, report: EntryReport, level: Level) {
        match level {
            Level::ERROR => error!("{}", report),
            Level::WARN => warn!("{}", report),
            Level::INFO => info!("{}", report),
            _ => debug!("{}", report),
        }

        if report.state.is_write() || matches!(report.state, EntryState::Failed(_)) {
            self.notify(&report.to_string()).await;
        }

        match self.stages.last_mut() {
            Some(stage) if stage.kind == report.kind => stage.entries.push(report),
            _ => {
                let kind = report.kind;
                self.stages.push(StageReport {
                    kind,
                    entries: vec![report],
                    aborted: false,
                    not_attempted: 0,
                });
            }
        }
    }

    /// Mark the current stage aborted with `remaining` entries unprocessed
    pub fn abort_stage(&mut self, remaining: usize) {
        if let Some(stage) = self.stages.last_mut() {
            stage.aborted = true;
            stage.not_attempted += remaining;
            error!(
                "❌ Inventory unreachable; {} remaining {} not attempted",
                remaining,
                stage.kind.label()
            );
        }
    }

    pub async fn finish(self) -> RunReport {
        let report = RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stages: self.stages,
        };

        let summary = report.summary();
        info!("✅ {}", summary);
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&summary).await {
                warn!("Failed to send run summary: {}", e);
            }
        }

        report
    }

    async fn notify(&self, text: &str) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(text).await {
                warn!("Failed to send notification: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingNotifier;
    use crate::state_machine::{FailureReason, ResolvedReason, SkipReason};

    fn entry(kind: ResourceKind, key: &str, state: EntryState) -> EntryReport {
        EntryReport {
            kind,
            key: key.to_string(),
            state,
            detail: None,
            id: None,
        }
    }

    #[tokio::test]
    async fn test_counts_and_summary() {
        let mut reporter = Reporter::new(None);
        reporter.begin_stage(ResourceKind::Site);
        reporter.record(entry(ResourceKind::Site, "NYC1", EntryState::Created), Level::INFO).await;
        reporter
            .record(
                entry(ResourceKind::Site, "LAX1", EntryState::Resolved(ResolvedReason::NoDrift)),
                Level::DEBUG,
            )
            .await;
        reporter.begin_stage(ResourceKind::Device);
        reporter
            .record(
                entry(ResourceKind::Device, "X", EntryState::Failed(FailureReason::Transport)),
                Level::ERROR,
            )
            .await;
        reporter.abort_stage(2);

        let report = reporter.finish().await;
        let counts = report.counts();
        assert_eq!(counts.created, 1);
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.not_attempted, 2);
        assert!(counts.has_problems());

        let skipped_only = OutcomeCounts {
            skipped: 3,
            created: 1,
            ..OutcomeCounts::default()
        };
        assert!(!skipped_only.has_problems());
        assert!(report.summary().contains("aborted: devices"));
        assert!(report.stage(ResourceKind::Device).map_or(false, |s| s.aborted));
    }

    #[tokio::test]
    async fn test_only_writes_and_failures_are_notified() {
        let notifier = Arc::new(CollectingNotifier::new());
        let mut reporter = Reporter::new(Some(notifier.clone()));
        reporter.begin_stage(ResourceKind::Site);
        reporter.record(entry(ResourceKind::Site, "NYC1", EntryState::Created), Level::INFO).await;
        reporter
            .record(
                entry(ResourceKind::Site, "LAX1", EntryState::Skipped(SkipReason::Validation)),
                Level::WARN,
            )
            .await;
        reporter.finish().await;

        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "site NYC1: created");
        assert!(messages[1].contains("1 created"));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_change_report() {
        let notifier = Arc::new(CollectingNotifier::failing());
        let mut reporter = Reporter::new(Some(notifier));
        reporter.begin_stage(ResourceKind::Site);
        reporter.record(entry(ResourceKind::Site, "NYC1", EntryState::Created), Level::INFO).await;

        let report = reporter.finish().await;
        assert_eq!(report.counts().created, 1);
    }

    #[test]
    fn test_entry_report_serializes_flat() {
        let mut report = entry(ResourceKind::Vlan, "NYC1 100 MGMT", EntryState::Updated);
        report.id = Some(4);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "vlan");
        assert_eq!(json["state"], "updated");
        assert_eq!(json["id"], 4);
        assert!(json.get("detail").is_none());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub type CampaignId = i64;
pub type RecipientId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
    Invalid,
    Responded,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Failed => "failed",
            RecipientStatus::Invalid => "invalid",
            RecipientStatus::Responded => "responded",
        }
    }

    /// 以前綴判斷狀態 (例如 "failed: timeout" => Failed)
    pub fn from_prefix(text: &str) -> Option<Self> {
        let lowered = text.trim().to_ascii_lowercase();
        [
            RecipientStatus::Pending,
            RecipientStatus::Sent,
            RecipientStatus::Failed,
            RecipientStatus::Invalid,
            RecipientStatus::Responded,
        ]
        .into_iter()
        .find(|status| lowered.starts_with(status.as_str()))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecipientStatus::Pending)
    }

    /// Whether a run should pick this recipient up.
    pub fn is_dispatchable(&self, retry_failed: bool) -> bool {
        match self {
            RecipientStatus::Pending => true,
            RecipientStatus::Failed => retry_failed,
            RecipientStatus::Sent | RecipientStatus::Invalid | RecipientStatus::Responded => false,
        }
    }
}

impl fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: RecipientStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn new(id: RecipientId, campaign_id: CampaignId, email: impl Into<String>) -> Self {
        Self {
            id,
            campaign_id,
            email: email.into(),
            name: None,
            status: RecipientStatus::Pending,
            last_error: None,
            attempts: 0,
            responded_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    /// Applies a dispatch write. Returns `false` when the write was ignored.
    ///
    /// `attempts` never decreases, and a `responded` row is owned by the
    /// external signal so dispatch writes leave it alone.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        if self.status == RecipientStatus::Responded
            || update.status == RecipientStatus::Responded
        {
            return false;
        }
        self.status = update.status;
        self.last_error = update.error.clone();
        if let Some(attempts) = update.attempts {
            self.attempts = self.attempts.max(attempts);
        }
        true
    }

    pub fn mark_responded(&mut self, at: DateTime<Utc>) {
        if self.status != RecipientStatus::Responded {
            self.status = RecipientStatus::Responded;
            self.responded_at = Some(at);
        }
    }
}

/// `updateStatus` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: RecipientStatus,
    pub error: Option<String>,
    pub attempts: Option<u32>,
}

impl StatusUpdate {
    pub fn sent(attempts: u32) -> Self {
        Self {
            status: RecipientStatus::Sent,
            error: None,
            attempts: Some(attempts),
        }
    }

    pub fn failed(error: impl Into<String>, attempts: Option<u32>) -> Self {
        Self {
            status: RecipientStatus::Failed,
            error: Some(error.into()),
            attempts,
        }
    }

    pub fn invalid(reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: RecipientStatus::Invalid,
            error: Some(reason.into()),
            attempts: Some(attempts),
        }
    }
}

/// 單次派送的執行參數，不會被持久化
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub campaign_id: CampaignId,
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub concurrency: usize,
    pub rate_per_second: f64,
    pub retry_attempts: u32,
    pub backoff_unit: Duration,
    pub send_timeout: Duration,
    pub fail_fast_on_auth: bool,
    pub retry_failed: bool,
}

impl DispatchJob {
    pub const DEFAULT_SENDER: &'static str = "noreply@example.com";
    pub const MAX_CONCURRENCY: usize = 20;

    pub fn new(campaign: &Campaign) -> Self {
        Self {
            campaign_id: campaign.id,
            subject: campaign.subject.clone(),
            body: campaign.body.clone(),
            sender: Self::DEFAULT_SENDER.to_string(),
            concurrency: 4,
            rate_per_second: 1.0,
            retry_attempts: 2,
            backoff_unit: Duration::from_secs(2),
            send_timeout: Duration::from_secs(15),
            fail_fast_on_auth: false,
            retry_failed: false,
        }
    }
}

/// Terminal result of one recipient's task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SendOutcome {
    Sent,
    Failed { reason: String },
    Invalid { reason: String },
    Stopped,
}

impl SendOutcome {
    /// Classifies a legacy status string by prefix.
    pub fn from_legacy(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let detail = || {
            trimmed
                .split_once(':')
                .map(|(_, rest)| rest.trim().to_string())
                .unwrap_or_default()
        };

        if lowered.starts_with("sent") {
            Some(SendOutcome::Sent)
        } else if lowered.starts_with("failed") || lowered.starts_with("error") {
            Some(SendOutcome::Failed { reason: detail() })
        } else if lowered.starts_with("invalid") {
            Some(SendOutcome::Invalid { reason: detail() })
        } else if lowered.starts_with("stopped") {
            Some(SendOutcome::Stopped)
        } else {
            None
        }
    }

    pub fn status(&self) -> Option<RecipientStatus> {
        match self {
            SendOutcome::Sent => Some(RecipientStatus::Sent),
            SendOutcome::Failed { .. } => Some(RecipientStatus::Failed),
            SendOutcome::Invalid { .. } => Some(RecipientStatus::Invalid),
            SendOutcome::Stopped => None,
        }
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendOutcome::Sent => f.write_str("sent"),
            SendOutcome::Failed { reason } => write!(f, "failed: {}", reason),
            SendOutcome::Invalid { reason } => write!(f, "invalid: {}", reason),
            SendOutcome::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub recipient_id: RecipientId,
    pub outcome: SendOutcome,
    /// Attempts consumed during this run.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub invalid: usize,
    pub responded: usize,
}

impl AggregateStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// 逐筆累加 (incremental strategy)
    pub fn record(&mut self, outcome: &SendOutcome) {
        match outcome {
            SendOutcome::Sent => self.sent += 1,
            SendOutcome::Failed { .. } => self.failed += 1,
            SendOutcome::Invalid { .. } => self.invalid += 1,
            SendOutcome::Stopped => {}
        }
    }

    /// 依收件人資料重新計算 (recompute strategy)
    pub fn from_recipients<'a>(recipients: impl IntoIterator<Item = &'a Recipient>) -> Self {
        let mut stats = Self::default();
        for recipient in recipients {
            stats.total += 1;
            match recipient.status {
                RecipientStatus::Pending => {}
                RecipientStatus::Sent => stats.sent += 1,
                RecipientStatus::Failed => stats.failed += 1,
                RecipientStatus::Invalid => stats.invalid += 1,
                RecipientStatus::Responded => stats.responded += 1,
            }
        }
        stats
    }

    pub fn completed(&self) -> usize {
        self.sent + self.failed + self.invalid + self.responded
    }

    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.completed())
    }

    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total as f64
        }
    }
}

impl fmt::Display for AggregateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sent={} ({:.1}%), Failed={} ({:.1}%), Invalid={}, Responded={}, Pending={}, Total={}",
            self.sent,
            self.percent(self.sent),
            self.failed,
            self.percent(self.failed),
            self.invalid,
            self.responded,
            self.pending(),
            self.total
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub campaign_id: CampaignId,
    pub stats: AggregateStats,
    pub stopped: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    /// Aggregate recomputed by the store at the end of the run.
    pub recorded: Option<AggregateStats>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Campaign {} {}: Sent={}, Failed={}, Invalid={}",
            self.campaign_id,
            if self.cancelled { "stopped" } else { "finished" },
            self.stats.sent,
            self.stats.failed,
            self.stats.invalid
        )?;
        if self.stopped > 0 {
            write!(f, ", Stopped={}", self.stopped)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        campaign_id: CampaignId,
        total: usize,
    },
    Status {
        event: StatusEvent,
        stats: AggregateStats,
    },
    Finished(RunSummary),
}

/// One message handed to the Send Operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(id: RecipientId, status: RecipientStatus) -> Recipient {
        let mut r = Recipient::new(id, 1, format!("user{}@example.com", id));
        r.status = status;
        r
    }

    #[test]
    fn test_legacy_status_strings_round_trip_through_display() {
        let outcomes = vec![
            SendOutcome::Sent,
            SendOutcome::Failed {
                reason: "Connection refused".to_string(),
            },
            SendOutcome::Invalid {
                reason: "missing '@'".to_string(),
            },
            SendOutcome::Stopped,
        ];
        for outcome in outcomes {
            assert_eq!(SendOutcome::from_legacy(&outcome.to_string()), Some(outcome));
        }
    }

    #[test]
    fn test_legacy_classification_uses_prefix() {
        assert_eq!(
            SendOutcome::from_legacy("FAILED: 421 try later: again"),
            Some(SendOutcome::Failed {
                reason: "421 try later: again".to_string()
            })
        );
        assert!(matches!(
            SendOutcome::from_legacy("error: worker panicked"),
            Some(SendOutcome::Failed { .. })
        ));
        assert_eq!(SendOutcome::from_legacy("queued"), None);
        assert_eq!(
            RecipientStatus::from_prefix("invalid: no domain"),
            Some(RecipientStatus::Invalid)
        );
    }

    #[test]
    fn test_apply_keeps_attempts_monotonic() {
        let mut r = recipient(1, RecipientStatus::Pending);
        assert!(r.apply(&StatusUpdate::failed("timeout", Some(3))));
        assert!(r.apply(&StatusUpdate::sent(1)));
        assert_eq!(r.status, RecipientStatus::Sent);
        assert_eq!(r.attempts, 3);
        assert_eq!(r.last_error, None);
    }

    #[test]
    fn test_responded_is_not_overwritten_by_dispatch() {
        let mut r = recipient(1, RecipientStatus::Sent);
        r.mark_responded(Utc::now());
        let stamped = r.responded_at;
        assert!(!r.apply(&StatusUpdate::failed("late failure", Some(1))));
        assert_eq!(r.status, RecipientStatus::Responded);

        r.mark_responded(Utc::now());
        assert_eq!(r.responded_at, stamped);

        let mut fresh = recipient(2, RecipientStatus::Pending);
        let update = StatusUpdate {
            status: RecipientStatus::Responded,
            error: None,
            attempts: None,
        };
        assert!(!fresh.apply(&update));
        assert_eq!(fresh.status, RecipientStatus::Pending);
    }

    #[test]
    fn test_incremental_and_recomputed_stats_agree() {
        let outcomes = [
            SendOutcome::Sent,
            SendOutcome::Invalid {
                reason: "no domain".to_string(),
            },
            SendOutcome::Failed {
                reason: "refused".to_string(),
            },
            SendOutcome::Sent,
            SendOutcome::Stopped,
        ];

        let mut incremental = AggregateStats::new(outcomes.len());
        let mut rows = Vec::new();
        for (i, outcome) in outcomes.iter().enumerate() {
            incremental.record(outcome);
            let mut row = recipient(i as RecipientId, RecipientStatus::Pending);
            if let Some(status) = outcome.status() {
                row.status = status;
            }
            rows.push(row);
        }

        let recomputed = AggregateStats::from_recipients(&rows);
        assert_eq!(incremental, recomputed);
        assert_eq!(incremental.pending(), 1);
        assert_eq!(
            incremental.sent + incremental.failed + incremental.invalid + incremental.pending(),
            incremental.total
        );
    }

    #[test]
    fn test_dispatchable_statuses() {
        assert!(RecipientStatus::Pending.is_dispatchable(false));
        assert!(!RecipientStatus::Failed.is_dispatchable(false));
        assert!(RecipientStatus::Failed.is_dispatchable(true));
        assert!(!RecipientStatus::Sent.is_dispatchable(true));
        assert!(!RecipientStatus::Responded.is_dispatchable(true));
    }
}

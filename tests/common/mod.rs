#![allow(dead_code)]

use async_trait::async_trait;
use bulk_mailer::domain::model::{
    AggregateStats, CampaignId, OutgoingMessage, RecipientId, StatusUpdate,
};
use bulk_mailer::domain::ports::{ProgressSink, RecipientStore, Transport};
use bulk_mailer::{
    Campaign, DispatchJob, MailerError, MemoryStore, ProgressEvent, Recipient, TransportError,
    TransportErrorKind,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    AlwaysFail(TransportErrorKind),
    /// Fails the first `n` attempts, then succeeds.
    FailTimes(u32),
    /// Takes this long before succeeding.
    Stall(Duration),
    Panic,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub to: String,
    pub at: Instant,
}

/// In-process stand-in for the mail transport.
#[derive(Default)]
pub struct ScriptedTransport {
    behaviors: HashMap<String, Behavior>,
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    started: Option<UnboundedSender<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(address.to_string(), behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn notify_started(mut self, tx: UnboundedSender<String>) -> Self {
        self.started = Some(tx);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, address: &str) -> usize {
        self.calls().iter().filter(|c| c.to == address).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                to: message.to.clone(),
                at: Instant::now(),
            });
            calls.iter().filter(|c| c.to == message.to).count() as u32
        };
        if let Some(tx) = &self.started {
            let _ = tx.send(message.to.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let behavior = self
            .behaviors
            .get(&message.to)
            .cloned()
            .unwrap_or(Behavior::Succeed);
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::AlwaysFail(kind) => Err(TransportError::new(
                kind,
                format!("attempt {} to {} failed", attempt, message.to),
            )),
            Behavior::FailTimes(n) if attempt <= n => Err(TransportError::connection(format!(
                "attempt {} to {} failed",
                attempt, message.to
            ))),
            Behavior::FailTimes(_) => Ok(()),
            Behavior::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Behavior::Panic => panic!("transport blew up for {}", message.to),
        }
    }
}

/// Store whose status writes always fail.
pub struct UnwritableStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl RecipientStore for UnwritableStore {
    async fn fetch_recipients(&self, campaign_id: CampaignId) -> bulk_mailer::Result<Vec<Recipient>> {
        self.inner.fetch_recipients(campaign_id).await
    }

    async fn update_status(
        &self,
        _recipient_id: RecipientId,
        _update: StatusUpdate,
    ) -> bulk_mailer::Result<()> {
        Err(MailerError::StoreError {
            message: "database is locked".to_string(),
        })
    }

    async fn recompute_aggregate(&self, campaign_id: CampaignId) -> bulk_mailer::Result<AggregateStats> {
        self.inner.recompute_aggregate(campaign_id).await
    }

    async fn mark_responded(&self, recipient_id: RecipientId) -> bulk_mailer::Result<()> {
        self.inner.mark_responded(recipient_id).await
    }
}

#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn status_events(&self) -> Vec<bulk_mailer::StatusEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Status { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub async fn seed(store: &MemoryStore, emails: &[&str]) -> (Campaign, Vec<Recipient>) {
    let campaign = store
        .create_campaign("launch", "Spring launch", "Hello there")
        .await;
    let entries: Vec<(String, Option<String>)> =
        emails.iter().map(|e| (e.to_string(), None)).collect();
    let recipients = store.add_recipients(campaign.id, &entries).await.unwrap();
    (campaign, recipients)
}

/// Fast defaults for tests: generous rate, short backoff.
pub fn job(campaign: &Campaign) -> DispatchJob {
    let mut job = DispatchJob::new(campaign);
    job.concurrency = 4;
    job.rate_per_second = 1000.0;
    job.retry_attempts = 2;
    job.backoff_unit = Duration::from_millis(10);
    job.send_timeout = Duration::from_secs(5);
    job
}

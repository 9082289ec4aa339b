use crate::domain::model::{
    AggregateStats, Campaign, CampaignId, Recipient, RecipientId, StatusUpdate,
};
use crate::domain::ports::RecipientStore;
use crate::utils::error::{MailerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Campaigns, recipient rows and the cached per-campaign aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    last_campaign_id: CampaignId,
    #[serde(default)]
    last_recipient_id: RecipientId,
    #[serde(default)]
    campaigns: BTreeMap<CampaignId, Campaign>,
    #[serde(default)]
    recipients: BTreeMap<RecipientId, Recipient>,
    #[serde(default)]
    aggregates: BTreeMap<CampaignId, AggregateStats>,
}

impl StoreState {
    pub fn create_campaign(&mut self, name: &str, subject: &str, body: &str) -> Campaign {
        self.last_campaign_id += 1;
        let campaign = Campaign {
            id: self.last_campaign_id,
            name: name.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.campaigns.insert(campaign.id, campaign.clone());
        self.aggregates.insert(campaign.id, AggregateStats::default());
        campaign
    }

    pub fn add_recipients(
        &mut self,
        campaign_id: CampaignId,
        entries: &[(String, Option<String>)],
    ) -> Result<Vec<Recipient>> {
        self.campaign(campaign_id)?;
        let mut added = Vec::with_capacity(entries.len());
        for (email, name) in entries {
            self.last_recipient_id += 1;
            let mut recipient = Recipient::new(self.last_recipient_id, campaign_id, email.trim());
            if let Some(name) = name {
                recipient = recipient.with_name(name.trim());
            }
            self.recipients.insert(recipient.id, recipient.clone());
            added.push(recipient);
        }
        Ok(added)
    }

    pub fn campaign(&self, campaign_id: CampaignId) -> Result<Campaign> {
        self.campaigns
            .get(&campaign_id)
            .cloned()
            .ok_or(MailerError::CampaignNotFound { id: campaign_id })
    }

    /// Newest first.
    pub fn campaigns(&self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> = self.campaigns.values().cloned().collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        campaigns
    }

    pub fn recipients(&self, campaign_id: CampaignId) -> Result<Vec<Recipient>> {
        self.campaign(campaign_id)?;
        Ok(self
            .recipients
            .values()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    pub fn recipient(&self, recipient_id: RecipientId) -> Result<Recipient> {
        self.recipients
            .get(&recipient_id)
            .cloned()
            .ok_or(MailerError::RecipientNotFound { id: recipient_id })
    }

    pub fn update_status(&mut self, recipient_id: RecipientId, update: &StatusUpdate) -> Result<bool> {
        let recipient = self
            .recipients
            .get_mut(&recipient_id)
            .ok_or(MailerError::RecipientNotFound { id: recipient_id })?;
        Ok(recipient.apply(update))
    }

    pub fn mark_responded(&mut self, recipient_id: RecipientId) -> Result<()> {
        let recipient = self
            .recipients
            .get_mut(&recipient_id)
            .ok_or(MailerError::RecipientNotFound { id: recipient_id })?;
        recipient.mark_responded(Utc::now());
        Ok(())
    }

    /// Recounts rows and refreshes the cached aggregate. Returns the new
    /// aggregate and whether the cache changed.
    pub fn recompute_aggregate(&mut self, campaign_id: CampaignId) -> Result<(AggregateStats, bool)> {
        self.campaign(campaign_id)?;
        let stats = AggregateStats::from_recipients(
            self.recipients
                .values()
                .filter(|r| r.campaign_id == campaign_id),
        );
        let changed = self.aggregates.insert(campaign_id, stats) != Some(stats);
        Ok((stats, changed))
    }

    pub fn recorded_aggregate(&self, campaign_id: CampaignId) -> Option<AggregateStats> {
        self.aggregates.get(&campaign_id).copied()
    }
}

/// In-process store. The mutex is the single serialized write path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_campaign(&self, name: &str, subject: &str, body: &str) -> Campaign {
        self.state.lock().await.create_campaign(name, subject, body)
    }

    pub async fn add_recipients(
        &self,
        campaign_id: CampaignId,
        entries: &[(String, Option<String>)],
    ) -> Result<Vec<Recipient>> {
        self.state.lock().await.add_recipients(campaign_id, entries)
    }

    pub async fn campaign(&self, campaign_id: CampaignId) -> Result<Campaign> {
        self.state.lock().await.campaign(campaign_id)
    }

    pub async fn campaigns(&self) -> Vec<Campaign> {
        self.state.lock().await.campaigns()
    }

    pub async fn recipient(&self, recipient_id: RecipientId) -> Result<Recipient> {
        self.state.lock().await.recipient(recipient_id)
    }

    pub async fn recorded_aggregate(&self, campaign_id: CampaignId) -> Option<AggregateStats> {
        self.state.lock().await.recorded_aggregate(campaign_id)
    }
}

#[async_trait]
impl RecipientStore for MemoryStore {
    async fn fetch_recipients(&self, campaign_id: CampaignId) -> Result<Vec<Recipient>> {
        self.state.lock().await.recipients(campaign_id)
    }

    async fn update_status(&self, recipient_id: RecipientId, update: StatusUpdate) -> Result<()> {
        self.state
            .lock()
            .await
            .update_status(recipient_id, &update)
            .map(|_| ())
    }

    async fn recompute_aggregate(&self, campaign_id: CampaignId) -> Result<AggregateStats> {
        self.state
            .lock()
            .await
            .recompute_aggregate(campaign_id)
            .map(|(stats, _)| stats)
    }

    async fn mark_responded(&self, recipient_id: RecipientId) -> Result<()> {
        self.state.lock().await.mark_responded(recipient_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::RecipientStatus;

    fn entries(emails: &[&str]) -> Vec<(String, Option<String>)> {
        emails.iter().map(|e| (e.to_string(), None)).collect()
    }

    #[tokio::test]
    async fn test_snapshot_keeps_insertion_order() {
        let store = MemoryStore::new();
        let campaign = store.create_campaign("c", "s", "b").await;
        store
            .add_recipients(campaign.id, &entries(&["a@x.com", "b@x.com", "c@x.com"]))
            .await
            .unwrap();

        let snapshot = store.fetch_recipients(campaign.id).await.unwrap();
        let emails: Vec<&str> = snapshot.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.com", "b@x.com", "c@x.com"]);
        assert!(snapshot.iter().all(|r| r.status == RecipientStatus::Pending));
    }

    #[tokio::test]
    async fn test_repeated_identical_update_does_not_double_count() {
        let store = MemoryStore::new();
        let campaign = store.create_campaign("c", "s", "b").await;
        let added = store
            .add_recipients(campaign.id, &entries(&["a@x.com", "b@x.com"]))
            .await
            .unwrap();

        store.update_status(added[0].id, StatusUpdate::sent(1)).await.unwrap();
        let first = store.recompute_aggregate(campaign.id).await.unwrap();
        store.update_status(added[0].id, StatusUpdate::sent(1)).await.unwrap();
        let second = store.recompute_aggregate(campaign.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.sent, 1);
        assert_eq!(second.pending(), 1);
        assert_eq!(store.recorded_aggregate(campaign.id).await, Some(second));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_errors() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.fetch_recipients(42).await,
            Err(MailerError::CampaignNotFound { id: 42 })
        ));
        assert!(matches!(
            store.update_status(7, StatusUpdate::sent(1)).await,
            Err(MailerError::RecipientNotFound { id: 7 })
        ));
        assert!(store.mark_responded(7).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_responded_counts_separately() {
        let store = MemoryStore::new();
        let campaign = store.create_campaign("c", "s", "b").await;
        let added = store
            .add_recipients(campaign.id, &entries(&["a@x.com"]))
            .await
            .unwrap();

        store.update_status(added[0].id, StatusUpdate::sent(1)).await.unwrap();
        store.mark_responded(added[0].id).await.unwrap();

        let stats = store.recompute_aggregate(campaign.id).await.unwrap();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.responded, 1);
        let row = store.recipient(added[0].id).await.unwrap();
        assert!(row.responded_at.is_some());
    }
}

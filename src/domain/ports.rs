use crate::domain::model::{
    AggregateStats, CampaignId, OutgoingMessage, ProgressEvent, Recipient, RecipientId,
    StatusUpdate,
};
use crate::utils::error::{Result, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

/// Recipient Store Gateway. Implementations serialize writers internally.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// Snapshot of a campaign's recipients, in insertion order.
    async fn fetch_recipients(&self, campaign_id: CampaignId) -> Result<Vec<Recipient>>;

    async fn update_status(&self, recipient_id: RecipientId, update: StatusUpdate) -> Result<()>;

    /// Recounts the campaign's rows. Idempotent under repeated identical updates.
    async fn recompute_aggregate(&self, campaign_id: CampaignId) -> Result<AggregateStats>;

    /// External "responded" signal. Never called by the dispatcher.
    async fn mark_responded(&self, recipient_id: RecipientId) -> Result<()>;
}

/// The opaque Send Operation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> std::result::Result<(), TransportError>;
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

#[async_trait]
impl<S: RecipientStore + ?Sized> RecipientStore for Arc<S> {
    async fn fetch_recipients(&self, campaign_id: CampaignId) -> Result<Vec<Recipient>> {
        (**self).fetch_recipients(campaign_id).await
    }

    async fn update_status(&self, recipient_id: RecipientId, update: StatusUpdate) -> Result<()> {
        (**self).update_status(recipient_id, update).await
    }

    async fn recompute_aggregate(&self, campaign_id: CampaignId) -> Result<AggregateStats> {
        (**self).recompute_aggregate(campaign_id).await
    }

    async fn mark_responded(&self, recipient_id: RecipientId) -> Result<()> {
        (**self).mark_responded(recipient_id).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, message: &OutgoingMessage) -> std::result::Result<(), TransportError> {
        (**self).send(message).await
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for Arc<P> {
    fn on_event(&self, event: &ProgressEvent) {
        (**self).on_event(event)
    }
}

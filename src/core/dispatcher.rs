use crate::core::delivery::Delivery;
use crate::core::rate_limiter::RateLimiter;
use crate::core::worker_pool::WorkerPool;
use crate::domain::model::{
    AggregateStats, CampaignId, DispatchJob, ProgressEvent, RecipientId, RunSummary, SendOutcome,
    StatusEvent, StatusUpdate,
};
use crate::domain::ports::{ProgressSink, RecipientStore, Transport};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs one campaign: loads the snapshot, fans recipients out to the worker
/// pool and drains their outcomes on the calling task, which is the only
/// writer of the run's `AggregateStats`.
pub struct DispatchEngine<S, T, P> {
    store: Arc<S>,
    transport: Arc<T>,
    sink: P,
    cancel: CancellationToken,
}

impl<S, T, P> DispatchEngine<S, T, P>
where
    S: RecipientStore + 'static,
    T: Transport + 'static,
    P: ProgressSink,
{
    pub fn new(store: S, transport: T, sink: P) -> Self {
        Self {
            store: Arc::new(store),
            transport: Arc::new(transport),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cooperative stop: in-flight sends finish, nothing new starts.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn run(&self, job: DispatchJob) -> Result<RunSummary> {
        job.validate()?;
        let started = Instant::now();
        let campaign_id = job.campaign_id;

        let recipients: Vec<_> = self
            .store
            .fetch_recipients(campaign_id)
            .await?
            .into_iter()
            .filter(|r| r.status.is_dispatchable(job.retry_failed))
            .collect();

        let mut stats = AggregateStats::new(recipients.len());
        let mut stopped = 0;
        tracing::info!(
            "Dispatching campaign {} to {} recipients (concurrency={}, rate={}/s, retries={})",
            campaign_id,
            stats.total,
            job.concurrency,
            job.rate_per_second,
            job.retry_attempts
        );
        self.sink.on_event(&ProgressEvent::Started {
            campaign_id,
            total: stats.total,
        });

        let limiter = Arc::new(RateLimiter::per_second(job.rate_per_second));
        let delivery = Arc::new(Delivery::new(
            self.store.clone(),
            self.transport.clone(),
            limiter,
            &job,
            self.cancel.clone(),
        ));

        let mut pool = WorkerPool::new(job.concurrency);
        for recipient in recipients {
            let delivery = delivery.clone();
            pool.submit(recipient.id, async move { delivery.deliver(&recipient).await });
        }

        while let Some(done) = pool.next_completed().await {
            let event = match done.result {
                Ok(event) => event,
                Err(message) => self.worker_failure(done.key, message).await,
            };

            if event.outcome == SendOutcome::Stopped {
                stopped += 1;
            } else {
                stats.record(&event.outcome);
                self.recompute(campaign_id).await;
            }

            tracing::debug!(
                "Recipient {} -> {} ({} attempts) [{}]",
                event.recipient_id,
                event.outcome,
                event.attempts,
                stats
            );
            self.sink.on_event(&ProgressEvent::Status { event, stats });
        }

        let summary = RunSummary {
            campaign_id,
            stats,
            stopped,
            cancelled: self.cancel.is_cancelled(),
            elapsed: started.elapsed(),
            recorded: self.recompute(campaign_id).await,
        };
        tracing::info!("{} in {:?}", summary, summary.elapsed);
        self.sink.on_event(&ProgressEvent::Finished(summary.clone()));

        Ok(summary)
    }

    // worker 內未預期的錯誤降級為 failed，不中斷整個 run
    async fn worker_failure(&self, recipient_id: RecipientId, message: String) -> StatusEvent {
        tracing::error!("Recipient {} task failed unexpectedly: {}", recipient_id, message);
        if let Err(e) = self
            .store
            .update_status(recipient_id, StatusUpdate::failed(message.clone(), None))
            .await
        {
            tracing::warn!("Could not record failure for recipient {}: {}", recipient_id, e);
        }
        StatusEvent {
            recipient_id,
            outcome: SendOutcome::Failed { reason: message },
            attempts: 0,
        }
    }

    async fn recompute(&self, campaign_id: CampaignId) -> Option<AggregateStats> {
        match self.store.recompute_aggregate(campaign_id).await {
            Ok(recorded) => Some(recorded),
            Err(e) => {
                tracing::warn!("Could not recompute aggregate for campaign {}: {}", campaign_id, e);
                None
            }
        }
    }
}

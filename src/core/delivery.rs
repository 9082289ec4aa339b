use crate::core::address::validate_address;
use crate::core::rate_limiter::RateLimiter;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{
    DispatchJob, OutgoingMessage, Recipient, RecipientId, SendOutcome, StatusEvent, StatusUpdate,
};
use crate::domain::ports::{RecipientStore, Transport};
use crate::utils::error::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-recipient attempt loop: validate, then rate-limit, send and back off
/// until the message goes out, the retry ceiling is hit, or the run is
/// cancelled.
pub struct Delivery<S, T> {
    store: S,
    transport: T,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    sender: String,
    subject: String,
    body: String,
    send_timeout: Duration,
    cancel: CancellationToken,
}

impl<S: RecipientStore, T: Transport> Delivery<S, T> {
    pub fn new(
        store: S,
        transport: T,
        limiter: Arc<RateLimiter>,
        job: &DispatchJob,
        cancel: CancellationToken,
    ) -> Self {
        let policy = RetryPolicy::new(job.retry_attempts, job.backoff_unit)
            .with_fail_fast_on_auth(job.fail_fast_on_auth);
        Self {
            store,
            transport,
            limiter,
            policy,
            sender: job.sender.clone(),
            subject: job.subject.clone(),
            body: job.body.clone(),
            send_timeout: job.send_timeout,
            cancel,
        }
    }

    pub async fn deliver(&self, recipient: &Recipient) -> StatusEvent {
        let id = recipient.id;
        if self.cancel.is_cancelled() {
            return stopped(id, 0);
        }

        if let Err(invalid) = validate_address(&recipient.email) {
            tracing::debug!("Recipient {} <{}> is invalid: {}", id, recipient.email, invalid);
            self.persist(id, StatusUpdate::invalid(invalid.reason.clone(), recipient.attempts))
                .await;
            return StatusEvent {
                recipient_id: id,
                outcome: SendOutcome::Invalid {
                    reason: invalid.reason,
                },
                attempts: 0,
            };
        }

        let message = self.message_for(recipient);
        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return stopped(id, attempt - 1);
            }

            // 等待速率配額時也要能被取消
            tokio::select! {
                _ = self.cancel.cancelled() => return stopped(id, attempt - 1),
                _ = self.limiter.acquire() => {}
            }
            if self.cancel.is_cancelled() {
                return stopped(id, attempt - 1);
            }

            let recorded_attempts = recipient.attempts.saturating_add(attempt);

            match self.send_once(&message).await {
                Ok(()) => {
                    tracing::debug!("Sent to {} on attempt {}", recipient.email, attempt);
                    self.persist(id, StatusUpdate::sent(recorded_attempts)).await;
                    return StatusEvent {
                        recipient_id: id,
                        outcome: SendOutcome::Sent,
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        "Attempt {}/{} to {} failed ({}): {}",
                        attempt,
                        self.policy.max_attempts(),
                        recipient.email,
                        err.kind,
                        err
                    );
                    self.persist(
                        id,
                        StatusUpdate::failed(err.message.clone(), Some(recorded_attempts)),
                    )
                    .await;

                    if !self.policy.should_retry(attempt, &err) {
                        break err;
                    }
                    self.backoff(attempt).await;
                }
            }
        };

        StatusEvent {
            recipient_id: id,
            outcome: SendOutcome::Failed {
                reason: last_error.message,
            },
            attempts: attempt,
        }
    }

    fn message_for(&self, recipient: &Recipient) -> OutgoingMessage {
        OutgoingMessage {
            from: self.sender.clone(),
            to: recipient.email.clone(),
            to_name: recipient.name.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
        }
    }

    async fn send_once(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        match tokio::time::timeout(self.send_timeout, self.transport.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "no response from mail transport within {:?}",
                self.send_timeout
            ))),
        }
    }

    // 取消時提早結束等待，下一輪迴圈開頭會回傳 Stopped
    async fn backoff(&self, attempt: u32) {
        let delay = self.policy.backoff(attempt);
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Store write failures are logged and swallowed.
    async fn persist(&self, id: RecipientId, update: StatusUpdate) {
        let status = update.status;
        if let Err(e) = self.store.update_status(id, update).await {
            tracing::warn!("Could not record '{}' for recipient {}: {}", status, id, e);
        }
    }
}

fn stopped(recipient_id: RecipientId, attempts: u32) -> StatusEvent {
    StatusEvent {
        recipient_id,
        outcome: SendOutcome::Stopped,
        attempts,
    }
}

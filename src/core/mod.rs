pub mod address;
pub mod delivery;
pub mod dispatcher;
pub mod rate_limiter;
pub mod retry;
pub mod worker_pool;

pub use crate::domain::model::{
    AggregateStats, DispatchJob, ProgressEvent, Recipient, RunSummary, SendOutcome, StatusEvent,
};
pub use crate::domain::ports::{ProgressSink, RecipientStore, Transport};
pub use crate::utils::error::Result;

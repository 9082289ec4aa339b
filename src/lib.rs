pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{Cli, Command};
pub use config::MailerConfig;

pub use adapters::{ChannelSink, JsonFileStore, LogSink, MemoryStore, SmtpSettings, SmtpTransport};
pub use core::dispatcher::DispatchEngine;
pub use domain::model::{
    AggregateStats, Campaign, DispatchJob, ProgressEvent, Recipient, RecipientStatus, RunSummary,
    SendOutcome, StatusEvent,
};
pub use utils::error::{MailerError, Result, TransportError, TransportErrorKind};

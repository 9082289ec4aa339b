// Adapters layer: concrete implementations of the domain ports (stores, transport, sinks).

pub mod json_store;
pub mod memory_store;
pub mod sinks;
pub mod smtp;

pub use json_store::JsonFileStore;
pub use memory_store::MemoryStore;
pub use sinks::{ChannelSink, LogSink, TeeSink};
pub use smtp::{SmtpSettings, SmtpTransport};

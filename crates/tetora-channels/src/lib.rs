pub mod adapter;
pub mod channel;
pub mod command;
pub mod dedup;
pub mod error;
pub mod mention;
pub mod progress;
pub mod runtime;
pub mod types;

pub use adapter::{handle_inbound, AdapterConfig, AdapterState};
pub use channel::Channel;
pub use command::{parse_command, ApproveDecision, Command};
pub use dedup::Deduplicator;
pub use error::ChannelError;
pub use mention::{classify_message, strip_mention, MessageClass};
pub use progress::ProgressView;
pub use runtime::ChannelRuntime;
pub use types::{ChannelStatus, InboundMessage, MessageFormat, MessageRef, OutboundMessage};

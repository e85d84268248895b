use serde::{Deserialize, Serialize};

/// A message received from an external channel (Discord, Telegram, WebChat, …).
///
/// Mention detection and DM/guild classification are channel-specific (a
/// Discord mention looks nothing like a Telegram one), so the concrete
/// adapter is expected to populate `is_dm`/`mentions_bot` itself; everything
/// downstream of that is generic (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform-native id for this message, used for dedup (spec §4.6 step 1).
    pub external_message_id: String,

    /// The conversational surface this message arrived on (a chat id, a
    /// guild/channel pair, …) — becomes `SessionKey::external_id`.
    pub channel_id: String,

    /// Platform-native identifier for the sender.
    pub sender_id: String,

    /// Human-readable display name for the sender, if available.
    pub sender_name: Option<String>,

    /// Plain text content of the message, before mention stripping.
    pub content: String,

    /// Whether this arrived as a direct message rather than in a shared channel.
    pub is_dm: bool,

    /// Whether the bot was explicitly mentioned in `content`.
    pub mentions_bot: bool,

    /// ISO-8601 timestamp of when the message was received.
    pub timestamp: String,

    /// Full raw payload from the platform for cases that need extra fields.
    pub raw_payload: Option<serde_json::Value>,
}

/// A message to be delivered to an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub content: String,
    pub format: MessageFormat,
}

impl OutboundMessage {
    pub fn plain(recipient_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            content: content.into(),
            format: MessageFormat::PlainText,
        }
    }
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    #[default]
    PlainText,
    Markdown,
    Html,
}

/// Opaque handle to a sent message, used to edit it in place or delete it
/// later (spec §4.6 step 7's "edit in place" vs "delete and chunk").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}

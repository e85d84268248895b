use async_trait::async_trait;

use crate::{
    error::ChannelError,
    types::{ChannelStatus, MessageRef, OutboundMessage},
};

/// Common interface implemented by every channel adapter. Extends the
/// teacher's connect/disconnect/send/status contract with the edit/delete
/// operations spec §4.6 step 7 needs for in-place progress updates.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"discord"`), used
    /// as the `SessionKey` channel component.
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<(), ChannelError>;

    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver a message, returning a handle that can later be passed to
    /// [`edit`](Channel::edit) or [`delete`](Channel::delete).
    async fn send(&self, msg: &OutboundMessage) -> Result<MessageRef, ChannelError>;

    /// Replace a previously sent message's content in place.
    async fn edit(&self, msg_ref: &MessageRef, content: &str) -> Result<(), ChannelError>;

    /// Remove a previously sent message.
    async fn delete(&self, msg_ref: &MessageRef) -> Result<(), ChannelError>;

    fn status(&self) -> ChannelStatus;

    /// Maximum content length the platform accepts in one message. Used to
    /// decide whether a completion can be delivered as a single edit or must
    /// be chunked (spec §4.6 step 7).
    fn max_message_len(&self) -> usize {
        2_000
    }
}

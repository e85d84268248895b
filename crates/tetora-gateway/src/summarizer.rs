//! Stand-in `CompactionSummarizer` (C4's seam into the non-interactive
//! summarisation child task, which is itself an external collaborator this
//! crate's scope stops short of: spawning it would mean running a second
//! full dispatch through this same dispatcher). Returning `None`
//! unconditionally is a defined, tested path on the session manager side
//! ("leaves history untouched when summarizer fails" in
//! `tetora-sessions/src/manager.rs`), so old messages are dropped only once
//! a real summarizer is wired in.

use async_trait::async_trait;
use tetora_sessions::CompactionSummarizer;
use tracing::debug;

pub struct NoSummarizer;

#[async_trait]
impl CompactionSummarizer for NoSummarizer {
    async fn summarize(&self, session_id: &str, _transcript: &str) -> Option<String> {
        debug!(session_id, "no summarizer configured, skipping compaction");
        None
    }
}

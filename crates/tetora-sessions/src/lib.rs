pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::SessionError;
pub use manager::{CompactionSummarizer, SessionManager};
pub use types::{classify_complexity, Complexity, Message, MessageRole, Session, SessionKey};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;

    fn manager() -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        SessionManager::new(conn)
    }

    #[test]
    fn get_or_create_is_idempotent_per_key() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let a = mgr.get_or_create(&key, "coordinator").unwrap();
        let b = mgr.get_or_create(&key, "coordinator").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn append_updates_rolling_totals_and_title() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let session = mgr.get_or_create(&key, "coordinator").unwrap();

        mgr.append(
            &session.id,
            MessageRole::User,
            "what's the weather",
            None,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        mgr.append(
            &session.id,
            MessageRole::Assistant,
            "sunny",
            None,
            Some("claude-haiku-4-5-20251001"),
            Some(0.002),
            Some(10),
            Some(4),
        )
        .unwrap();

        let refreshed = mgr.get_active(&key).unwrap().unwrap();
        assert_eq!(refreshed.message_count, 2);
        assert_eq!(refreshed.title.as_deref(), Some("what's the weather"));
        assert!((refreshed.cost_usd - 0.002).abs() < 1e-9);
        assert_eq!(refreshed.tokens_in, 10);
        assert_eq!(refreshed.tokens_out, 4);
    }

    #[test]
    fn archive_then_get_or_create_makes_a_fresh_session() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let first = mgr.get_or_create(&key, "coordinator").unwrap();
        mgr.archive(&key).unwrap();

        assert!(mgr.get_active(&key).unwrap().is_none());

        let second = mgr.get_or_create(&key, "coordinator").unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn build_context_prompt_fences_history_as_untrusted() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let session = mgr.get_or_create(&key, "coordinator").unwrap();
        mgr.append(&session.id, MessageRole::User, "hi", None, None, None, None, None)
            .unwrap();
        mgr.append(&session.id, MessageRole::Assistant, "hello!", None, None, None, None, None)
            .unwrap();

        let prompt = mgr
            .build_context_prompt(&session.id, Complexity::Standard, "what did I just say?")
            .unwrap();

        assert!(prompt.contains("<conversation_history>"));
        assert!(prompt.contains("untrusted data"));
        assert!(prompt.contains("[user]: hi"));
        assert!(prompt.ends_with("what did I just say?"));
    }

    #[test]
    fn build_context_prompt_with_no_history_is_just_the_prompt() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let session = mgr.get_or_create(&key, "coordinator").unwrap();
        let prompt = mgr
            .build_context_prompt(&session.id, Complexity::Simple, "hello")
            .unwrap();
        assert_eq!(prompt, "hello");
    }

    #[test]
    fn build_context_prompt_drops_oldest_messages_to_fit_budget() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let session = mgr.get_or_create(&key, "coordinator").unwrap();
        for i in 0..5 {
            mgr.append(
                &session.id,
                MessageRole::User,
                &"x".repeat(1_500),
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();
            let _ = i;
        }

        // Simple budget is 4000 chars; five 1500-char messages (~7500 chars
        // of rendered transcript) cannot all fit, so the oldest must be
        // dropped rather than the call failing or ignoring the budget.
        let prompt = mgr
            .build_context_prompt(&session.id, Complexity::Simple, "summarize")
            .unwrap();
        assert!(prompt.len() < 4_000 + "summarize".len() + 500);
    }

    struct FixedSummarizer(Option<&'static str>);

    #[async_trait]
    impl CompactionSummarizer for FixedSummarizer {
        async fn summarize(&self, _session_id: &str, _transcript: &str) -> Option<String> {
            self.0.map(|s| s.to_string())
        }
    }

    #[tokio::test]
    async fn maybe_compact_noop_below_threshold() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let session = mgr.get_or_create(&key, "coordinator").unwrap();
        mgr.append(&session.id, MessageRole::User, "hi", None, None, None, None, None)
            .unwrap();

        mgr.maybe_compact(&session.id, 40, &FixedSummarizer(Some("summary")))
            .await
            .unwrap();

        assert_eq!(mgr.recent_messages(&session.id, 100).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn maybe_compact_replaces_oldest_batch_with_a_summary() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let session = mgr.get_or_create(&key, "coordinator").unwrap();
        for i in 0..25 {
            mgr.append(
                &session.id,
                MessageRole::User,
                &format!("message {i}"),
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        }

        mgr.maybe_compact(&session.id, 20, &FixedSummarizer(Some("extracted facts")))
            .await
            .unwrap();

        let remaining = mgr.recent_messages(&session.id, 100).unwrap();
        // 20 oldest replaced by a single system summary, 5 newest untouched.
        assert_eq!(remaining.len(), 6);
        assert_eq!(remaining[0].role, MessageRole::System);
        assert_eq!(remaining[0].content, "extracted facts");
    }

    #[tokio::test]
    async fn maybe_compact_leaves_history_untouched_when_summarizer_fails() {
        let mgr = manager();
        let key = SessionKey::new("telegram", "chat-1", None);
        let session = mgr.get_or_create(&key, "coordinator").unwrap();
        for i in 0..25 {
            mgr.append(
                &session.id,
                MessageRole::User,
                &format!("message {i}"),
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        }

        mgr.maybe_compact(&session.id, 20, &FixedSummarizer(None)).await.unwrap();
        assert_eq!(mgr.recent_messages(&session.id, 100).unwrap().len(), 25);
    }
}

//! Task board (spec §6 `/api/tasks*`): a kanban-style view operators use to
//! track work items alongside the C5 dispatch pipeline. Distinct from
//! `tetora_core::types::Task` (the unit of dispatch work) — a board card
//! can exist before any task runs, or never spawn one at all.
//!
//! The persistence layer is explicitly out of scope per spec §1, so this
//! is an in-memory `DashMap`-backed store in the teacher's
//! `skynet-gateway::app::AppState::notifications` shape (keyed map, no
//! backing store), not a SQLite table. A restart loses the board; nothing
//! in spec §6 requires it to survive one.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub assignee: Option<String>,
    pub comments: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

const DEFAULT_STATUS: &str = "todo";

#[derive(Default)]
pub struct TaskBoard {
    cards: DashMap<String, BoardCard>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, title: String, description: String, status: Option<String>) -> BoardCard {
        let now = chrono::Utc::now().to_rfc3339();
        let card = BoardCard {
            id: Uuid::now_v7().to_string(),
            title,
            description,
            status: status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            assignee: None,
            comments: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.cards.insert(card.id.clone(), card.clone());
        card
    }

    pub fn list(&self) -> Vec<BoardCard> {
        let mut cards: Vec<BoardCard> = self.cards.iter().map(|e| e.value().clone()).collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        cards
    }

    pub fn get(&self, id: &str) -> Option<BoardCard> {
        self.cards.get(id).map(|e| e.value().clone())
    }

    pub fn patch(
        &self,
        id: &str,
        title: Option<String>,
        description: Option<String>,
        status: Option<String>,
    ) -> Option<BoardCard> {
        let mut entry = self.cards.get_mut(id)?;
        if let Some(t) = title {
            entry.title = t;
        }
        if let Some(d) = description {
            entry.description = d;
        }
        if let Some(s) = status {
            entry.status = s;
        }
        entry.updated_at = chrono::Utc::now().to_rfc3339();
        Some(entry.clone())
    }

    pub fn mv(&self, id: &str, status: String) -> Option<BoardCard> {
        self.patch(id, None, None, Some(status))
    }

    pub fn assign(&self, id: &str, assignee: String) -> Option<BoardCard> {
        let mut entry = self.cards.get_mut(id)?;
        entry.assignee = Some(assignee);
        entry.updated_at = chrono::Utc::now().to_rfc3339();
        Some(entry.clone())
    }

    pub fn comment(&self, id: &str, body: String) -> Option<BoardCard> {
        let mut entry = self.cards.get_mut(id)?;
        entry.comments.push(body);
        entry.updated_at = chrono::Utc::now().to_rfc3339();
        Some(entry.clone())
    }
}

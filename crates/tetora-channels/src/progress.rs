use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tetora_core::types::{SseEvent, SseEventType};

const MAX_TOOL_NAMES: usize = 5;

/// Rolling view of an in-flight task's progress, rendered into one outbound
/// message per spec §4.6 step 6: last `MAX_TOOL_NAMES` tool names, elapsed
/// seconds, and a tail of accumulated output trimmed to fit the platform's
/// message limit. Refreshed at most once per `min_interval` and only when
/// something actually changed since the last render.
pub struct ProgressView {
    started: Instant,
    tool_names: VecDeque<String>,
    output_tail: String,
    dirty: bool,
    last_rendered: Option<Instant>,
}

impl ProgressView {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            tool_names: VecDeque::new(),
            output_tail: String::new(),
            dirty: true,
            last_rendered: None,
        }
    }

    pub fn on_event(&mut self, event: &SseEvent) {
        match event.event_type {
            SseEventType::ToolCall => {
                if let Some(name) = event.data.get("name").and_then(|v| v.as_str()) {
                    if self.tool_names.len() == MAX_TOOL_NAMES {
                        self.tool_names.pop_front();
                    }
                    self.tool_names.push_back(name.to_string());
                    self.dirty = true;
                }
            }
            SseEventType::OutputChunk => {
                if let Some(chunk) = event.data.get("chunk").and_then(|v| v.as_str()) {
                    self.output_tail.push_str(chunk);
                    self.dirty = true;
                }
            }
            _ => {}
        }
    }

    pub fn should_refresh(&self, now: Instant, min_interval: Duration) -> bool {
        self.dirty && self.last_rendered.map_or(true, |t| now.duration_since(t) >= min_interval)
    }

    pub fn mark_rendered(&mut self) {
        self.dirty = false;
        self.last_rendered = Some(Instant::now());
    }

    pub fn render(&self, max_len: usize) -> String {
        let elapsed = self.started.elapsed().as_secs();
        let tools = if self.tool_names.is_empty() {
            "none yet".to_string()
        } else {
            self.tool_names.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let header = format!("working... {elapsed}s elapsed | tools: {tools}\n");
        let tail_budget = max_len.saturating_sub(header.chars().count());
        format!("{header}{}", tail_chars(&self.output_tail, tail_budget))
    }
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

fn tail_chars(s: &str, max: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max {
        s.to_string()
    } else {
        chars[chars.len() - max..].iter().collect()
    }
}

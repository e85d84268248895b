//! `GET /events/tasks/{id}` — server-sent events for one task (spec §6).

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use tetora_core::types::{SseEventType, TaskId};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::state::AppState;

/// `event:` field value for each type, matching
/// `SseEvent::to_sse_frame`'s own mapping — axum's `Event` builder assembles
/// the frame, so the label can't just be read back off that method.
fn event_label(event_type: SseEventType) -> &'static str {
    match event_type {
        SseEventType::TaskReceived => "task_received",
        SseEventType::TaskRouting => "task_routing",
        SseEventType::TaskProcessing => "task_processing",
        SseEventType::OutputChunk => "output_chunk",
        SseEventType::ToolCall => "tool_call",
        SseEventType::ToolResult => "tool_result",
        SseEventType::Completed => "completed",
        SseEventType::Error => "error",
        SseEventType::SessionMessage => "session_message",
        SseEventType::SlotPressure => "slot_pressure",
    }
}

pub async fn task_events_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let task_id = TaskId::from(id.as_str());
    let (rx, subscription) = state.events.subscribe(task_id);

    let stream = ReceiverStream::new(rx).map(move |event| {
        // Keep the subscription alive for the lifetime of the stream —
        // dropping it early would unsubscribe before the last frame sends.
        let _ = &subscription;
        Ok(Event::default()
            .event(event_label(event.event_type))
            .data(event.data.to_string()))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

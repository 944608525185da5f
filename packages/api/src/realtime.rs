//! Real-time event streaming via Server-Sent Events.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use imagegen_core::JobEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::auth::ApiKey;
use crate::state::AppState;

/// GET /events -- job lifecycle events as they happen.
pub async fn events(
    _key: ApiKey,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(event_stream(state.events.subscribe())).keep_alive(KeepAlive::default())
}

/// Turn a broadcast subscription into an SSE stream.
///
/// Slow subscribers skip the events they missed.
pub fn event_stream(
    rx: broadcast::Receiver<JobEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((Ok(format_sse_event(&event)), rx)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// Format an event for SSE.
pub fn format_sse_event(event: &JobEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use imagegen_core::Job;

    fn submitted(n: usize) -> JobEvent {
        let job = Job::new(format!("prompt {n}"), "stable-diffusion");
        JobEvent::JobSubmitted {
            job_id: job.id,
            model: job.model,
            timestamp: job.created_at,
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead_and_keeps_streaming() {
        let (tx, rx) = broadcast::channel(2);
        for n in 0..5 {
            tx.send(submitted(n)).unwrap();
        }

        let mut stream = Box::pin(event_stream(rx));
        // Three events were overwritten; the two retained ones still arrive.
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());

        tx.send(submitted(5)).unwrap();
        assert!(stream.next().await.is_some());

        drop(tx);
        assert!(stream.next().await.is_none());
    }
}

//! Server-Sent Events (SSE) stream
//!
//! Each client first receives a `Connected` event describing the replica as
//! it is now, then every sync, reorder and tag event as it happens.

use super::handlers::LevelsView;
use super::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use triage_common::events::TriageEvent;

/// GET /api/events - SSE event stream
pub async fn event_stream(
    State(app): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before reading the replica so nothing falls in between
    let rx = app.state.subscribe_events();

    let connected = {
        let replica = app.state.replica.read().await;
        json!({
            "records": replica.len(),
            "levels": LevelsView::from(replica.levels()),
            "last_update": replica.last_update(),
        })
    };
    debug!("SSE client connected ({} listeners)", app.state.events.subscriber_count());

    let greeting = stream::once(async move {
        Ok(Event::default().event("Connected").data(connected.to_string()))
    });

    let updates = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => to_sse(&event),
            Err(e) => {
                // Lagged receivers skip ahead
                warn!("SSE client lagging: {}", e);
                None
            }
        }
    });

    Sse::new(greeting.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse(event: &TriageEvent) -> Option<Result<Event, Infallible>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.event_type(), e);
            None
        }
    }
}

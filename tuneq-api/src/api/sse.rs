//! Server-Sent Events for job lifecycle streaming

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tuneq_common::sse::create_event_sse_stream;

use crate::AppState;

/// GET /music/events
///
/// Streams JobClaimed, JobReady, JobFailed and StaleWriteRejected.
pub async fn music_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_event_sse_stream("tuneq-api", state.dispatcher.event_bus())
}

use std::{convert::Infallible, pin::Pin, time::Duration};

use async_stream::stream;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{
        sse::{Event, KeepAlive, KeepAliveStream},
        Sse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use retrieval_pipeline::{FragmentStream, SearchKind, SearchRequest};
use tracing::{debug, error, info};

use super::{json_body, parse_kind};
use crate::{api_state::ApiState, error::ApiError};

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Streams the answer as `fragment` events followed by `close_stream`.
///
/// Failures before the first fragment are ordinary JSON error responses. A
/// failure mid-stream becomes an `error` event and ends the stream.
pub async fn search_stream(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Sse<KeepAliveStream<EventStream>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let request = json_body(payload)?;
    info!(kind = %kind, "Received streaming search request");

    let fragments = state
        .dispatcher
        .invoke_streaming(&state.config, kind, &request)
        .await?;

    Ok(Sse::new(fragment_events(kind, fragments)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn error_event(error: &ApiError) -> Event {
    let data = serde_json::to_string(&error.body())
        .unwrap_or_else(|_| r#"{"error":"Internal server error","status":"error"}"#.to_string());
    Event::default().event("error").data(data)
}

fn fragment_events(kind: SearchKind, mut fragments: FragmentStream) -> EventStream {
    Box::pin(stream! {
        let mut sent = 0_usize;
        let mut failed = false;

        while let Some(item) = fragments.next().await {
            let event = item
                .map_err(ApiError::from)
                .and_then(|fragment| {
                    Event::default()
                        .event("fragment")
                        .json_data(&fragment)
                        .map_err(|e| {
                            error!(error = %e, "Failed to encode fragment");
                            ApiError::InternalError("Internal server error".to_string())
                        })
                });
            match event {
                Ok(event) => {
                    sent += 1;
                    yield Ok(event);
                }
                Err(err) => {
                    error!(kind = %kind, sent, error = %err, "Search stream failed");
                    yield Ok(error_event(&err));
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            debug!(kind = %kind, sent, "Search stream complete");
            yield Ok(Event::default().event("close_stream").data("Stream complete"));
        }
    })
}

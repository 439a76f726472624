use crate::state::AppState;
use axum::{
    extract::State,
    http::Uri,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use roster::events::RegistrationEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    event_type: Vec<String>,
}

impl EventFilter {
    /// Parses `?type=created,cancelled`. Unknown parameters are ignored.
    fn from_query_string(query: &str) -> Self {
        let mut event_type = Vec::new();

        for pair in query.split('&') {
            if let Some(("type", value)) = pair.split_once('=') {
                event_type.extend(
                    value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty()),
                );
            }
        }

        Self { event_type }
    }

    fn allows(&self, event: &RegistrationEvent) -> bool {
        self.event_type.is_empty() || self.event_type.iter().any(|t| t == event.kind())
    }
}

/// SSE endpoint that streams registration events as they are published
pub async fn stream_events(
    State(state): State<AppState>,
    uri: Uri,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = uri
        .query()
        .map(EventFilter::from_query_string)
        .unwrap_or_default();

    tracing::info!("New SSE client connected. Filters: type={:?}", filter.event_type);

    let stream = BroadcastStream::new(state.event_channel.subscribe());
    let filtered_stream = stream.filter_map(move |result| {
        let filter = filter.clone();
        async move {
            match result {
                Ok(event) if filter.allows(&event) => Some(Ok(to_sse_event(&event))),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => Some(Ok(Event::default()
                    .event("error")
                    .data(format!("Lagged by {} events", n)))),
            }
        }
    });

    Sse::new(filtered_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(event: &RegistrationEvent) -> Event {
    let name = format!("registration.{}", event.kind());
    Event::default()
        .event(name)
        .id(event.event_id().to_string())
        .json_data(event)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

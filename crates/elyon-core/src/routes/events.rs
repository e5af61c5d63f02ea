//! Server-sent event stream for connected clients

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;

use super::CoreState;

/// Configure event routes
pub fn routes(state: CoreState) -> Router {
    Router::new()
        .route("/events/stream", get(stream_events))
        .with_state(state)
}

/// Heartbeat every `heartbeat_interval` until the client disconnects
async fn stream_events(
    State(state): State<CoreState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let interval = state.heartbeat_interval;
    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let payload = json!({
                "type": "heartbeat",
                "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            });
            yield Ok(Event::default().data(payload.to_string()));
        }
    };

    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::state;
    use super::*;
    use crate::llm::MockProvider;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_first_frame_is_heartbeat() {
        let state = state(MockProvider::seeded(1))
            .await
            .with_heartbeat_interval(Duration::from_millis(20));
        let response = routes(state)
            .oneshot(
                Request::builder()
                    .uri("/events/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let data = body.next().await.unwrap().unwrap();
        let text = std::str::from_utf8(&data).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains("\"type\":\"heartbeat\""));
    }
}

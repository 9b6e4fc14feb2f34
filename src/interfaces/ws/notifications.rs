//! WebSocket event stream
//!
//! `GET /api/v1/ws/events?port_id=&from_sequence=&cursor=` upgrades to a
//! socket that first receives a `connected` frame, then one JSON frame per
//! port event. `cursor` resumes several ports at once (`P1:4,P2:7`).
//! A subscriber that asks to resume from an evicted sequence, or falls too
//! far behind, gets a `stale` frame and the socket is closed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::select;
use tracing::{debug, error, info, warn};

use crate::application::engine::SharedAllocationEngine;
use crate::application::events::{ResumeCursor, SubscriptionFilter};
use crate::domain::{DomainError, DomainResult, PortEvent};
use crate::interfaces::http::common::ApiError;
use crate::interfaces::http::modules::ports::PortEventDto;

/// Query parameters of the event stream
#[derive(Debug, Default, Deserialize)]
pub struct EventStreamQuery {
    /// Restrict the stream to one port
    pub port_id: Option<String>,
    /// Resume `port_id` after this sequence; rejected without `port_id`
    pub from_sequence: Option<u64>,
    /// Per-port resume points, `port:sequence` pairs separated by commas
    pub cursor: Option<String>,
}

impl EventStreamQuery {
    pub fn filter(&self) -> SubscriptionFilter {
        match &self.port_id {
            Some(port_id) => SubscriptionFilter::Port(port_id.clone()),
            None => SubscriptionFilter::All,
        }
    }

    /// Resume points of the subscription. `from_sequence` takes precedence
    /// over a `cursor` entry for the same port.
    pub fn resume_cursor(&self) -> DomainResult<ResumeCursor> {
        let mut cursor = ResumeCursor::new();
        for pair in self.cursor.iter().flat_map(|c| c.split(',')) {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let parsed = pair
                .rsplit_once(':')
                .and_then(|(port, seq)| Some((port.trim(), seq.trim().parse::<u64>().ok()?)))
                .filter(|(port, _)| !port.is_empty());
            let Some((port_id, from)) = parsed else {
                return Err(DomainError::Validation(format!(
                    "cursor entry '{}' is not port:sequence",
                    pair
                )));
            };
            cursor.insert(port_id.to_string(), from);
        }

        match (&self.port_id, self.from_sequence) {
            (Some(port_id), Some(from)) => {
                cursor.insert(port_id.clone(), from);
            }
            (None, Some(_)) => {
                return Err(DomainError::Validation(
                    "from_sequence requires port_id; use cursor to resume several ports"
                        .to_string(),
                ))
            }
            _ => {}
        }
        Ok(cursor)
    }
}

#[derive(Serialize)]
struct EventFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    event: PortEventDto,
}

fn event_frame(event: PortEvent) -> serde_json::Result<String> {
    serde_json::to_string(&EventFrame {
        kind: "port_transition",
        event: event.into(),
    })
}

fn error_frame(e: &DomainError) -> serde_json::Value {
    match e {
        DomainError::StaleSubscriber {
            port_id,
            requested,
            oldest_retained,
        } => json!({
            "type": "stale",
            "port_id": port_id,
            "requested": requested,
            "oldest_retained": oldest_retained,
            "message": e.to_string(),
        }),
        other => json!({
            "type": "error",
            "code": other.label(),
            "message": other.to_string(),
        }),
    }
}

/// WebSocket upgrade handler for the event stream
pub async fn ws_events_handler(
    ws: WebSocketUpgrade,
    State(engine): State<SharedAllocationEngine>,
    Query(query): Query<EventStreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = query.resume_cursor()?;
    info!(port_id = ?query.port_id, ?cursor, "New event stream connection");
    Ok(ws.on_upgrade(move |socket| handle_event_socket(socket, engine, query, cursor)))
}

async fn handle_event_socket(
    socket: WebSocket,
    engine: SharedAllocationEngine,
    query: EventStreamQuery,
    cursor: ResumeCursor,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = match engine.subscribe(query.filter(), cursor) {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(error = %e, "Event stream subscription refused");
            let _ = sender
                .send(Message::Text(error_frame(&e).to_string().into()))
                .await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let welcome = json!({
        "type": "connected",
        "subscription_id": subscription.id(),
        "filter": { "port_id": query.port_id },
        "cursor": subscription.cursor(),
    });
    if let Err(e) = sender.send(Message::Text(welcome.to_string().into())).await {
        error!(error = %e, "Failed to send welcome frame");
        return;
    }

    loop {
        select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            next = subscription.recv() => {
                match next {
                    Ok(Some(event)) => match event_frame(event) {
                        Ok(text) => {
                            if let Err(e) = sender.send(Message::Text(text.into())).await {
                                debug!(error = %e, "Failed to deliver event");
                                break;
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to serialize event"),
                    },
                    Ok(None) => {
                        debug!("Event stream closed by server");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    Err(e) => {
                        warn!(subscription_id = subscription.id(), error = %e, "Subscriber dropped");
                        let _ = sender
                            .send(Message::Text(error_frame(&e).to_string().into()))
                            .await;
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    info!(subscription_id = subscription.id(), "Event stream client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(port_id: Option<&str>, from: Option<u64>, cursor: Option<&str>) -> EventStreamQuery {
        EventStreamQuery {
            port_id: port_id.map(str::to_string),
            from_sequence: from,
            cursor: cursor.map(str::to_string),
        }
    }

    #[test]
    fn from_sequence_without_port_is_rejected() {
        let all = query(None, Some(3), None);
        assert_eq!(all.filter(), SubscriptionFilter::All);
        assert!(matches!(
            all.resume_cursor(),
            Err(DomainError::Validation(_))
        ));

        let one = query(Some("P101"), Some(3), None);
        assert_eq!(one.filter(), SubscriptionFilter::Port("P101".into()));
        assert_eq!(one.resume_cursor().unwrap().get("P101"), Some(&3));
    }

    #[test]
    fn cursor_resumes_several_ports() {
        let q = query(None, None, Some("P1:4, P2:7,"));
        let cursor = q.resume_cursor().unwrap();
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.get("P1"), Some(&4));
        assert_eq!(cursor.get("P2"), Some(&7));

        let q = query(Some("P1"), Some(9), Some("P1:4"));
        assert_eq!(q.resume_cursor().unwrap().get("P1"), Some(&9));

        for bad in ["P1", "P1:x", ":4"] {
            assert!(query(None, None, Some(bad)).resume_cursor().is_err(), "{}", bad);
        }
    }

    #[test]
    fn invalid_resume_request_maps_to_422() {
        let err = query(None, Some(1), None).resume_cursor().unwrap_err();
        let resp = ApiError(err).into_response();
        assert_eq!(resp.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn stale_error_becomes_stale_frame() {
        let frame = error_frame(&DomainError::StaleSubscriber {
            port_id: "P101".into(),
            requested: 2,
            oldest_retained: 40,
        });
        assert_eq!(frame["type"], "stale");
        assert_eq!(frame["oldest_retained"], 40);
        assert_eq!(error_frame(&DomainError::not_found("Port", "P9"))["type"], "error");
    }
}

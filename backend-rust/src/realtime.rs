//! Socket.IO push channel. Clients `watch-event` an event id and get
//! `seating-updated` / `sync-trigger` broadcasts for that event only.

use serde::Serialize;
use serde_json::{json, Value};
use socketioxide::extract::{Data, SocketRef};
use socketioxide::SocketIo;
use tracing::{debug, info, warn};

fn event_room(event_id: &str) -> String {
    format!("event:{event_id}")
}

/// Accepts either a bare string or `{ "eventId": "..." }`.
fn watched_event_id(data: &Value) -> Option<String> {
    data.as_str()
        .or_else(|| data["eventId"].as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

// ─── Connection Handler ───────────────────────────────────────────────────────

pub async fn on_connect(socket: SocketRef) {
    info!("Client connected: {}", socket.id);

    socket.on_disconnect(|s: SocketRef| async move {
        info!("Client disconnected: {}", s.id);
    });

    // ── watch-event ───────────────────────────────────────────────────────────
    socket.on("watch-event", |s: SocketRef, Data::<Value>(data)| async move {
        let Some(event_id) = watched_event_id(&data) else {
            warn!("Client {}: watch-event without an event id: {data}", s.id);
            return;
        };
        let _ = s.join(event_room(&event_id));
        debug!("Client {} watching {event_id}", s.id);
        let _ = s.emit("watching", &json!({ "eventId": event_id }));
    });

    // ── unwatch-event ─────────────────────────────────────────────────────────
    socket.on("unwatch-event", |s: SocketRef, Data::<Value>(data)| async move {
        if let Some(event_id) = watched_event_id(&data) {
            let _ = s.leave(event_room(&event_id));
        }
    });
}

// ─── Broadcaster ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Realtime {
    io: SocketIo,
}

impl Realtime {
    /// Registers the default namespace on `io`.
    pub fn new(io: SocketIo) -> Self {
        io.ns("/", on_connect);
        Self { io }
    }

    pub fn seating_updated<T: Serialize>(&self, event_id: &str, payload: &T) {
        self.broadcast(event_id, "seating-updated", payload);
    }

    pub fn sync_trigger<T: Serialize>(&self, event_id: &str, payload: &T) {
        self.broadcast(event_id, "sync-trigger", payload);
    }

    fn broadcast<T: Serialize>(&self, event_id: &str, event: &'static str, payload: &T) {
        if let Err(e) = self.io.to(event_room(event_id)).emit(event, payload) {
            debug!("Broadcast {event} for {event_id} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_from_string_or_object() {
        assert_eq!(watched_event_id(&json!("ev-1")).as_deref(), Some("ev-1"));
        assert_eq!(watched_event_id(&json!({ "eventId": "ev-2" })).as_deref(), Some("ev-2"));
        assert_eq!(watched_event_id(&json!({ "other": 1 })), None);
        assert_eq!(watched_event_id(&json!("")), None);
    }

    #[test]
    fn rooms_are_scoped_per_event() {
        assert_eq!(event_room("abc"), "event:abc");
    }
}

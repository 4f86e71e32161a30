use std::sync::Arc;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use crate::handlers::remote_geolocation::RemoteGeolocation;
use crate::handlers::session_actor::{SessionActor, SessionServices};
use crate::models::error::LocatorError;
use crate::models::updates::{ClientInput, Outbound, UiIntent};

pub struct AutoCancelTask<T>(pub JoinHandle<T>);

impl<T> Drop for AutoCancelTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One connected client: the socket pumps plus its session actor.
/// Dropping it aborts all three tasks, which drops the session and its feed.
pub struct SessionConnection {
    actor: AutoCancelTask<()>,
    send_task: AutoCancelTask<()>,
    recv_task: AutoCancelTask<()>,
    _permit: OwnedSemaphorePermit,
}

impl SessionConnection {
    pub fn new(socket: WebSocket, services: SessionServices, permit: OwnedSemaphorePermit) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(32);
        let geolocation = Arc::new(RemoteGeolocation::new(outbound_tx.clone()));

        let actor = SessionActor::new(inbound_rx, outbound_tx.clone(), geolocation.clone(), services);
        let (ws_sender, ws_receiver) = socket.split();

        Self {
            actor: AutoCancelTask(tokio::spawn(actor.run_actor())),
            send_task: AutoCancelTask(tokio::spawn(pump_outbound(ws_sender, outbound_rx))),
            recv_task: AutoCancelTask(tokio::spawn(pump_inbound(ws_receiver, inbound_tx, outbound_tx, geolocation))),
            _permit: permit,
        }
    }

    pub async fn run_actor(mut self) {
        tokio::select! {
            _ = &mut self.recv_task.0 => debug!("Client socket closed"),
            _ = &mut self.send_task.0 => debug!("Outbound pump finished"),
            _ = &mut self.actor.0 => debug!("Session actor finished"),
        }
        info!("Session closed");
    }
}

/// Geolocation reports go straight to the provider, everything else is for the actor.
async fn dispatch(text: &str, geolocation: &RemoteGeolocation) -> serde_json::Result<Option<ClientInput>> {
    let input = match serde_json::from_str::<ClientInput>(text)? {
        ClientInput::PositionFix(position) => {
            geolocation.resolve_fix(Ok(position));
            None
        }
        ClientInput::PositionFailed(reason) => {
            geolocation.resolve_fix(Err(LocatorError::LocationUnavailable(reason)));
            None
        }
        ClientInput::WatchUpdate { watch_id, position } => {
            geolocation.deliver(watch_id, position).await;
            None
        }
        input => Some(input),
    };
    Ok(input)
}

async fn pump_inbound(mut ws_receiver: SplitStream<WebSocket>,
                      inbound: mpsc::Sender<ClientInput>,
                      outbound: mpsc::UnboundedSender<Outbound>,
                      geolocation: Arc<RemoteGeolocation>) {
    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        debug!("Received message from client: {}", text);

        match dispatch(&text, &geolocation).await {
            Ok(Some(input)) => {
                if inbound.send(input).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Error deserializing client message: {}", e);
                outbound
                    .send(Outbound::Ui(UiIntent::ShowError(format!("Error deserializing message: {}", e))))
                    .ok();
            }
        }
    }
}

async fn pump_outbound(mut ws_sender: SplitSink<WebSocket, Message>,
                       mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(message) = outbound.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                error!("Could not serialize {:?}: {}", message, e);
                continue;
            }
        };
        debug!("Sending message to client: {}", text);
        if ws_sender.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    ws_sender.send(Message::Close(None)).await.ok();
}

#[cfg(test)]
mod tests {
    use crate::models::position::Position;
    use crate::models::updates::GeoRequest;
    use crate::services::geolocation::GeolocationProvider;
    use super::*;

    #[tokio::test]
    async fn controls_are_forwarded_to_the_actor() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let geolocation = RemoteGeolocation::new(tx);
        assert_eq!(dispatch(r#""Recenter""#, &geolocation).await.unwrap(), Some(ClientInput::Recenter));
        assert_eq!(dispatch(r#"{"StartTracking": 1}"#, &geolocation).await.unwrap(), Some(ClientInput::StartTracking(1)));
    }

    #[tokio::test]
    async fn malformed_messages_are_errors() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let geolocation = RemoteGeolocation::new(tx);
        assert!(dispatch(r#"{"Teleport": true}"#, &geolocation).await.is_err());
        assert!(dispatch("not json", &geolocation).await.is_err());
    }

    #[tokio::test]
    async fn watch_updates_are_consumed_by_the_provider() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let geolocation = RemoteGeolocation::new(tx);
        let (sink, mut feed) = mpsc::channel(4);
        let watch_id = geolocation.watch(sink);
        assert_eq!(rx.recv().await, Some(Outbound::Geo(GeoRequest::Watch { watch_id })));

        let text = format!(
            r#"{{"WatchUpdate": {{"watch_id": {}, "position": {{"latitude": 40.5, "longitude": -75.5}}}}}}"#,
            watch_id
        );
        assert_eq!(dispatch(&text, &geolocation).await.unwrap(), None);
        assert_eq!(feed.recv().await, Some(Position::new(40.5, -75.5)));
    }
}

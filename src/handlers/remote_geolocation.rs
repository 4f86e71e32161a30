use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use crate::models::error::LocatorError;
use crate::models::position::Position;
use crate::models::updates::{GeoRequest, Outbound};
use crate::services::geolocation::{GeolocationProvider, WatchId};

/// Geolocation answered by the connected browser.
///
/// Requests go out as `Geo(..)` messages; the socket reader feeds the replies
/// back through `resolve_fix` and `deliver`.
pub struct RemoteGeolocation {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<Vec<oneshot::Sender<Result<Position, LocatorError>>>>,
    watches: DashMap<WatchId, mpsc::Sender<Position>>,
    next_watch: AtomicU64,
}

impl RemoteGeolocation {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            outbound,
            pending: Mutex::new(Vec::new()),
            watches: DashMap::new(),
            next_watch: AtomicU64::new(1),
        }
    }

    /// Answers every outstanding one-shot request.
    pub fn resolve_fix(&self, result: Result<Position, LocatorError>) {
        let waiting: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if waiting.is_empty() {
            debug!("Unsolicited position fix, dropping");
        }
        for request in waiting {
            request.send(result.clone()).ok();
        }
    }

    /// Waits for room in the feed, so a slow session holds back the socket reader
    /// instead of losing fixes.
    pub async fn deliver(&self, watch_id: WatchId, position: Position) {
        // clone out of the map: a shard guard must not live across the await
        let sink = match self.watches.get(&watch_id) {
            Some(sink) => sink.clone(),
            None => {
                debug!("Update for released watch {}, dropping", watch_id);
                return;
            }
        };
        if sink.send(position).await.is_err() {
            warn!("Feed for watch {} closed, dropping update", watch_id);
        }
    }

    pub fn active_watches(&self) -> usize {
        self.watches.len()
    }

    fn request(&self, request: GeoRequest) -> bool {
        self.outbound.send(Outbound::Geo(request)).is_ok()
    }
}

#[async_trait]
impl GeolocationProvider for RemoteGeolocation {
    async fn get_once(&self) -> Result<Position, LocatorError> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);

        if !self.request(GeoRequest::GetOnce) {
            return Err(LocatorError::LocationUnavailable("client disconnected".to_string()));
        }

        rx.await
            .unwrap_or_else(|_| Err(LocatorError::LocationUnavailable("client disconnected".to_string())))
    }

    fn watch(&self, sink: mpsc::Sender<Position>) -> WatchId {
        let watch_id = self.next_watch.fetch_add(1, Ordering::SeqCst);
        self.watches.insert(watch_id, sink);
        self.request(GeoRequest::Watch { watch_id });
        watch_id
    }

    fn clear(&self, watch_id: WatchId) {
        if self.watches.remove(&watch_id).is_some() {
            self.request(GeoRequest::ClearWatch { watch_id });
            debug!("Cleared watch {}, {} still active", watch_id, self.active_watches());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;

    #[tokio::test]
    async fn get_once_waits_for_client_fix() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = Arc::new(RemoteGeolocation::new(tx));

        let waiting = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.get_once().await })
        };

        assert_eq!(rx.recv().await, Some(Outbound::Geo(GeoRequest::GetOnce)));
        provider.resolve_fix(Ok(Position::new(40.0, -75.0)));
        assert_eq!(waiting.await.unwrap(), Ok(Position::new(40.0, -75.0)));
    }

    #[tokio::test]
    async fn get_once_reports_client_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = Arc::new(RemoteGeolocation::new(tx));

        let waiting = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.get_once().await })
        };
        rx.recv().await;
        provider.resolve_fix(Err(LocatorError::LocationUnavailable("denied".to_string())));

        assert_eq!(waiting.await.unwrap(), Err(LocatorError::LocationUnavailable("denied".to_string())));
    }

    #[tokio::test]
    async fn get_once_fails_when_client_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let provider = RemoteGeolocation::new(tx);
        assert!(matches!(provider.get_once().await, Err(LocatorError::LocationUnavailable(_))));
    }

    #[tokio::test]
    async fn watch_routes_updates_until_cleared() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = RemoteGeolocation::new(tx);
        let (sink, mut feed) = mpsc::channel(4);

        let id = provider.watch(sink);
        assert_eq!(rx.recv().await, Some(Outbound::Geo(GeoRequest::Watch { watch_id: id })));

        provider.deliver(id, Position::new(1.0, 2.0)).await;
        assert_eq!(feed.recv().await, Some(Position::new(1.0, 2.0)));

        provider.clear(id);
        provider.clear(id);
        assert_eq!(rx.recv().await, Some(Outbound::Geo(GeoRequest::ClearWatch { watch_id: id })));
        assert!(rx.try_recv().is_err());
        assert_eq!(provider.active_watches(), 0);

        provider.deliver(id, Position::new(3.0, 4.0)).await;
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_feed_holds_updates_back_instead_of_dropping() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let provider = Arc::new(RemoteGeolocation::new(tx));
        let (sink, mut feed) = mpsc::channel(2);
        let id = provider.watch(sink);

        let producer = {
            let provider = provider.clone();
            tokio::spawn(async move {
                for i in 0..5 {
                    provider.deliver(id, Position::new(i as f64, 0.0)).await;
                }
            })
        };

        let mut received = Vec::new();
        for _ in 0..5 {
            received.push(feed.recv().await.unwrap().latitude);
        }
        producer.await.unwrap();
        assert_eq!(received, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use crate::models::error::LocatorError;
use crate::models::position::Position;

pub type WatchId = u64;

/// Source of position fixes.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// Resolves when the provider answers or errors. There is no timeout.
    async fn get_once(&self) -> Result<Position, LocatorError>;

    /// Starts pushing fixes into `sink`, in the order the provider produces them.
    fn watch(&self, sink: mpsc::Sender<Position>) -> WatchId;

    fn clear(&self, id: WatchId);
}

/// Ownership of one continuous feed. Released explicitly or on drop, at most once.
pub struct WatchHandle {
    id: Option<WatchId>,
    provider: Arc<dyn GeolocationProvider>,
}

impl WatchHandle {
    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            debug!("Releasing position watch {}", id);
            self.provider.clear(id);
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone)]
pub struct GeoFixAcquirer {
    provider: Arc<dyn GeolocationProvider>,
}

impl GeoFixAcquirer {
    pub fn new(provider: Arc<dyn GeolocationProvider>) -> Self {
        Self { provider }
    }

    /// Single fix. Failures are reported as `LocationUnavailable` and never retried here.
    pub async fn acquire_once(&self) -> Result<Position, LocatorError> {
        self.provider.get_once().await.map_err(|e| match e {
            LocatorError::LocationUnavailable(reason) => LocatorError::LocationUnavailable(reason),
            other => LocatorError::LocationUnavailable(other.to_string()),
        })
    }

    pub fn acquire_continuous(&self, on_update: mpsc::Sender<Position>) -> WatchHandle {
        let id = self.provider.watch(on_update);
        debug!("Opened position watch {}", id);
        WatchHandle { id: Some(id), provider: self.provider.clone() }
    }

    pub fn release(&self, handle: &mut WatchHandle) {
        handle.release();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeGeolocation;
    use super::*;

    #[tokio::test]
    async fn acquire_once_maps_failures_to_location_unavailable() {
        let provider = Arc::new(FakeGeolocation::answering(Err(LocatorError::FetchFailed("boom".to_string()))));
        let acquirer = GeoFixAcquirer::new(provider);

        match acquirer.acquire_once().await {
            Err(LocatorError::LocationUnavailable(reason)) => assert!(reason.contains("boom")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn acquire_once_returns_fix() {
        let provider = Arc::new(FakeGeolocation::answering(Ok(Position::new(40.0, -75.0))));
        let acquirer = GeoFixAcquirer::new(provider);
        assert_eq!(acquirer.acquire_once().await, Ok(Position::new(40.0, -75.0)));
    }

    #[test]
    fn double_release_is_a_no_op() {
        let provider = Arc::new(FakeGeolocation::answering(Ok(Position::new(0.0, 0.0))));
        let acquirer = GeoFixAcquirer::new(provider.clone());
        let (tx, _rx) = mpsc::channel(4);

        let mut handle = acquirer.acquire_continuous(tx);
        assert!(handle.is_active());
        acquirer.release(&mut handle);
        acquirer.release(&mut handle);
        drop(handle);

        assert_eq!(provider.opened.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(provider.cleared.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_handle_releases_watch() {
        let provider = Arc::new(FakeGeolocation::answering(Ok(Position::new(0.0, 0.0))));
        let acquirer = GeoFixAcquirer::new(provider.clone());
        let (tx, _rx) = mpsc::channel(4);

        {
            let _handle = acquirer.acquire_continuous(tx);
            assert_eq!(provider.live_watches(), 1);
        }
        assert_eq!(provider.live_watches(), 0);
    }

    #[tokio::test]
    async fn updates_arrive_in_emission_order() {
        let provider = Arc::new(FakeGeolocation::answering(Ok(Position::new(0.0, 0.0))));
        let acquirer = GeoFixAcquirer::new(provider.clone());
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = acquirer.acquire_continuous(tx);

        provider.emit(Position::new(1.0, 1.0));
        provider.emit(Position::new(2.0, 2.0));

        assert_eq!(rx.recv().await, Some(Position::new(1.0, 1.0)));
        assert_eq!(rx.recv().await, Some(Position::new(2.0, 2.0)));
    }
}

use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use crate::models::error::LocatorError;
use crate::models::position::Position;
use crate::models::traffic::{CongestionLevel, TrafficEstimate};

/// Flow reading for the road segment nearest a point.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowSample {
    pub current_speed: f64,
    pub free_flow_speed: f64,
    /// Seconds.
    pub current_travel_time: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowSegmentResponse {
    flow_segment_data: FlowSample,
}

#[async_trait]
pub trait TrafficService: Send + Sync {
    async fn flow_at(&self, position: Position) -> Result<FlowSample, LocatorError>;
}

/// TomTom flow segment lookup.
pub struct FlowSegmentClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FlowSegmentClient {
    pub fn new(http: reqwest::Client, endpoint: String, api_key: String) -> Self {
        Self { http, endpoint, api_key }
    }
}

#[async_trait]
impl TrafficService for FlowSegmentClient {
    async fn flow_at(&self, position: Position) -> Result<FlowSample, LocatorError> {
        let point = format!("{},{}", position.latitude, position.longitude);
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("point", point.as_str()), ("unit", "KMPH"), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| LocatorError::FetchFailed(format!("Traffic request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(LocatorError::FetchFailed(format!("HTTP {} from traffic service", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LocatorError::FetchFailed(format!("Failed to read traffic response: {}", e)))?;

        let data: FlowSegmentResponse = serde_json::from_slice(&bytes)
            .map_err(|e| LocatorError::FetchFailed(format!("Malformed traffic response: {}", e)))?;

        Ok(data.flow_segment_data)
    }
}

pub struct TrafficAdvisor {
    service: Arc<dyn TrafficService>,
}

impl TrafficAdvisor {
    pub fn new(service: Arc<dyn TrafficService>) -> Self {
        Self { service }
    }

    /// `None` means unavailable: the caller hides the traffic display.
    pub async fn estimate_congestion(&self, position: Position) -> Option<TrafficEstimate> {
        match self.service.flow_at(position).await.and_then(|sample| classify(&sample)) {
            Ok(estimate) => {
                debug!("Traffic near {:?}: {:?}", position, estimate);
                Some(estimate)
            }
            Err(e) => {
                warn!("Traffic estimate unavailable: {}", e);
                None
            }
        }
    }
}

pub fn classify(sample: &FlowSample) -> Result<TrafficEstimate, LocatorError> {
    if !(sample.free_flow_speed > 0.0) || sample.current_speed < 0.0 || sample.current_travel_time < 0.0 {
        return Err(LocatorError::FetchFailed(format!("Implausible flow sample {:?}", sample)));
    }

    let ratio = sample.current_speed / sample.free_flow_speed;
    Ok(TrafficEstimate {
        level: CongestionLevel::from_ratio(ratio),
        eta_minutes: (sample.current_travel_time / 60.0).round() as u32,
    })
}

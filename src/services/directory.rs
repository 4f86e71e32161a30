//! Hospital directory lookup and ranking.
//!
//! The [`HospitalDirectory`] trait abstracts over the facility source so the
//! [`HospitalRanker`] can be exercised without a network. [`OverpassDirectory`]
//! queries an Overpass API interpreter for `amenity=hospital` nodes, ways and
//! relations around a point.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use crate::geo::{estimate_eta_minutes, haversine_km};
use crate::models::error::LocatorError;
use crate::models::hospital::HospitalCandidate;
use crate::models::position::Position;

pub const FACILITY_CATEGORY: (&str, &str) = ("amenity", "hospital");

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

/// One raw directory element. Ways and relations carry a `center` instead of coordinates.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DirectoryRecord {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: u64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<Centroid>,
    pub tags: Option<HashMap<String, String>>,
}

impl DirectoryRecord {
    pub fn coordinates(&self) -> Option<Position> {
        match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => Some(Position::new(lat, lon)),
            (_, _, Some(center)) => Some(Position::new(center.lat, center.lon)),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.tags
            .as_ref()
            .and_then(|tags| tags.get("name"))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<DirectoryRecord>,
}

#[async_trait]
pub trait HospitalDirectory: Send + Sync {
    /// Raw records in the order the directory returned them.
    async fn query(&self, origin: Position, radius_meters: u32) -> Result<Vec<DirectoryRecord>, LocatorError>;
}

pub struct OverpassDirectory {
    http: reqwest::Client,
    endpoint: String,
}

impl OverpassDirectory {
    pub fn new(http: reqwest::Client, endpoint: String) -> Self {
        Self { http, endpoint }
    }

    pub fn build_query(origin: Position, radius_meters: u32) -> String {
        let (key, value) = FACILITY_CATEGORY;
        let around = format!("(around:{},{},{})", radius_meters, origin.latitude, origin.longitude);
        format!(
            "[out:json];(node[\"{k}\"=\"{v}\"]{a};way[\"{k}\"=\"{v}\"]{a};relation[\"{k}\"=\"{v}\"]{a};);out center;",
            k = key,
            v = value,
            a = around
        )
    }
}

#[async_trait]
impl HospitalDirectory for OverpassDirectory {
    async fn query(&self, origin: Position, radius_meters: u32) -> Result<Vec<DirectoryRecord>, LocatorError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("data", Self::build_query(origin, radius_meters))])
            .send()
            .await
            .map_err(|e| LocatorError::FetchFailed(format!("Directory request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(LocatorError::FetchFailed(format!(
                "HTTP {} from {}",
                response.status(),
                self.endpoint
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LocatorError::FetchFailed(format!("Failed to read directory response: {}", e)))?;

        let data: OverpassResponse = serde_json::from_slice(&bytes)
            .map_err(|e| LocatorError::FetchFailed(format!("Malformed directory response: {}", e)))?;

        debug!(elements = data.elements.len(), "Directory query answered");
        Ok(data.elements)
    }
}

pub struct HospitalRanker {
    directory: Arc<dyn HospitalDirectory>,
    radius_meters: u32,
}

impl HospitalRanker {
    pub fn new(directory: Arc<dyn HospitalDirectory>, radius_meters: u32) -> Self {
        Self { directory, radius_meters }
    }

    /// Queries with the configured radius.
    pub async fn find(&self, origin: Position) -> Result<Vec<HospitalCandidate>, LocatorError> {
        self.find_nearby(origin, self.radius_meters).await
    }

    /// A fresh ranked set, never merged with a previous one.
    pub async fn find_nearby(&self, origin: Position, radius_meters: u32) -> Result<Vec<HospitalCandidate>, LocatorError> {
        let records = self.directory.query(origin, radius_meters).await.map_err(|e| {
            warn!("Hospital lookup around {:?} failed: {}", origin, e);
            e
        })?;
        Ok(rank(origin, &records))
    }
}

/// Resolves, names and orders raw records by full-precision distance from `origin`.
pub fn rank(origin: Position, records: &[DirectoryRecord]) -> Vec<HospitalCandidate> {
    let mut candidates: Vec<HospitalCandidate> = records
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            let position = record.coordinates()?;
            let distance_km = haversine_km(origin, position);
            Some(HospitalCandidate {
                id: format!("{}/{}", record.kind, record.id),
                name: record
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Hospital {}", idx + 1)),
                position,
                distance_km,
                eta_minutes: estimate_eta_minutes(distance_km),
            })
        })
        .collect();

    // stable: equal distances keep directory order
    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use super::*;

    /// Directory double returning a canned answer, swappable between calls.
    pub struct StaticDirectory {
        answer: Mutex<Result<Vec<DirectoryRecord>, LocatorError>>,
        pub calls: Mutex<Vec<(Position, u32)>>,
    }

    impl StaticDirectory {
        pub fn answering(answer: Result<Vec<DirectoryRecord>, LocatorError>) -> Self {
            Self { answer: Mutex::new(answer), calls: Mutex::new(Vec::new()) }
        }

        pub fn set_answer(&self, answer: Result<Vec<DirectoryRecord>, LocatorError>) {
            *self.answer.lock().unwrap() = answer;
        }
    }

    #[async_trait]
    impl HospitalDirectory for StaticDirectory {
        async fn query(&self, origin: Position, radius_meters: u32) -> Result<Vec<DirectoryRecord>, LocatorError> {
            self.calls.lock().unwrap().push((origin, radius_meters));
            self.answer.lock().unwrap().clone()
        }
    }

    /// Elements at 3.4 km and 1.2 km due north of (40, -75), in that order.
    pub fn two_hospitals_json() -> &'static str {
        r#"{
            "version": 0.6,
            "elements": [
                {"type": "node", "id": 11, "lat": 40.030576934601, "lon": -75.0, "tags": {"amenity": "hospital", "name": "Far General"}},
                {"type": "way", "id": 22, "center": {"lat": 40.010791859271, "lon": -75.0}, "tags": {"amenity": "hospital", "name": "Near Memorial"}}
            ]
        }"#
    }

    pub fn records(json: &str) -> Vec<DirectoryRecord> {
        serde_json::from_str::<OverpassResponse>(json).unwrap().elements
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use crate::services::testing::serve_canned;
    use super::testing::*;
    use super::*;

    #[test]
    fn nearest_candidate_comes_first() {
        let origin = Position::new(40.0, -75.0);
        let ranked = rank(origin, &records(two_hospitals_json()));

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "Near Memorial");
        assert_eq!(ranked[0].id, "way/22");
        assert!((ranked[0].distance_km - 1.2).abs() < 1e-6);
        assert_eq!(ranked[0].eta_minutes, 2);
        assert!((ranked[1].distance_km - 3.4).abs() < 1e-6);
        assert_eq!(ranked[1].eta_minutes, 5);
    }

    #[test]
    fn unnamed_elements_get_raw_position_label() {
        let json = r#"{"elements": [
            {"type": "node", "id": 1, "lat": 40.02, "lon": -75.0, "tags": {"name": "A"}},
            {"type": "relation", "id": 2, "tags": {"name": "No geometry"}},
            {"type": "node", "id": 3, "lat": 40.001, "lon": -75.0, "tags": {"amenity": "hospital"}},
            {"type": "node", "id": 4, "lat": 40.01, "lon": -75.0, "tags": {"name": ""}},
            {"type": "node", "id": 5, "lat": 40.03, "lon": -75.0}
        ]}"#;
        let ranked = rank(Position::new(40.0, -75.0), &records(json));

        let names: Vec<&str> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Hospital 3", "Hospital 4", "A", "Hospital 5"]);
    }

    #[test]
    fn names_are_kept_verbatim() {
        let json = r#"{"elements": [
            {"type": "node", "id": 1, "lat": 40.01, "lon": -75.0, "tags": {"name": " St. Luke's "}},
            {"type": "node", "id": 2, "lat": 40.02, "lon": -75.0, "tags": {"name": " "}}
        ]}"#;
        let ranked = rank(Position::new(40.0, -75.0), &records(json));

        assert_eq!(ranked[0].name, " St. Luke's ");
        assert_eq!(ranked[1].name, " ");
    }

    #[test]
    fn records_without_coordinates_are_dropped() {
        let json = r#"{"elements": [
            {"type": "way", "id": 9, "tags": {"name": "Outline only"}},
            {"type": "node", "id": 10, "lat": 40.0}
        ]}"#;
        assert!(rank(Position::new(40.0, -75.0), &records(json)).is_empty());
    }

    #[test]
    fn ranking_is_non_decreasing_and_stable() {
        let json = r#"{"elements": [
            {"type": "node", "id": 1, "lat": 40.05, "lon": -75.0},
            {"type": "node", "id": 2, "lat": 39.99, "lon": -75.0, "tags": {"name": "South"}},
            {"type": "node", "id": 3, "lat": 40.01, "lon": -75.0, "tags": {"name": "North"}},
            {"type": "node", "id": 4, "lat": 40.0, "lon": -74.98}
        ]}"#;
        let ranked = rank(Position::new(40.0, -75.0), &records(json));

        assert!(ranked.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
        // 39.99 and 40.01 are equidistant along the meridian
        assert_eq!(ranked[0].name, "South");
        assert_eq!(ranked[1].name, "North");
    }

    #[test]
    fn query_targets_all_geometry_kinds() {
        let query = OverpassDirectory::build_query(Position::new(40.0, -75.0), 2000);
        assert!(query.starts_with("[out:json];"));
        assert!(query.contains("node[\"amenity\"=\"hospital\"](around:2000,40,-75)"));
        assert!(query.contains("way[\"amenity\"=\"hospital\"](around:2000,40,-75)"));
        assert!(query.contains("relation[\"amenity\"=\"hospital\"](around:2000,40,-75)"));
        assert!(query.ends_with("out center;"));
    }

    #[tokio::test]
    async fn find_uses_configured_radius_and_replaces_wholesale() {
        let directory = Arc::new(StaticDirectory::answering(Ok(records(two_hospitals_json()))));
        let ranker = HospitalRanker::new(directory.clone(), 2000);
        let origin = Position::new(40.0, -75.0);

        let first = ranker.find(origin).await.unwrap();
        assert_eq!(first.len(), 2);

        directory.set_answer(Ok(vec![]));
        let second = ranker.find(origin).await.unwrap();
        assert!(second.is_empty());

        assert_eq!(directory.calls.lock().unwrap()[0], (origin, 2000));
    }

    #[tokio::test]
    async fn overpass_answer_is_decoded() {
        let server = serve_canned(StatusCode::OK, two_hospitals_json()).await;
        let directory = OverpassDirectory::new(reqwest::Client::new(), server.url.clone());

        let found = directory.query(Position::new(40.0, -75.0), 2000).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].name(), Some("Near Memorial"));
        assert!(server.queries.lock().unwrap()[0].starts_with("data="));
    }

    #[tokio::test]
    async fn overpass_error_status_is_fetch_failure() {
        let server = serve_canned(StatusCode::TOO_MANY_REQUESTS, "rate limited").await;
        let directory = OverpassDirectory::new(reqwest::Client::new(), server.url);

        match directory.query(Position::new(40.0, -75.0), 2000).await {
            Err(LocatorError::FetchFailed(reason)) => assert!(reason.contains("429")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn overpass_garbage_is_fetch_failure() {
        let server = serve_canned(StatusCode::OK, "<html>runtime error</html>").await;
        let directory = OverpassDirectory::new(reqwest::Client::new(), server.url);

        match directory.query(Position::new(40.0, -75.0), 2000).await {
            Err(LocatorError::FetchFailed(reason)) => assert!(reason.contains("Malformed")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn find_surfaces_fetch_failure() {
        let directory = Arc::new(StaticDirectory::answering(Err(LocatorError::FetchFailed("timeout".to_string()))));
        let ranker = HospitalRanker::new(directory, 2000);

        let result = ranker.find(Position::new(40.0, -75.0)).await;
        assert_eq!(result, Err(LocatorError::FetchFailed("timeout".to_string())));
    }
}

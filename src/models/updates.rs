use serde::{Deserialize, Serialize};
use crate::handlers::events::SessionStatus;
use crate::models::hospital::HospitalCandidate;
use crate::models::position::{Bounds, Position};
use crate::models::traffic::TrafficEstimate;

// Client -> server

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RouteInstruction {
    pub text: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum ClientInput {
    SelectCandidate(usize),
    RouteToNearest,
    StartTracking(usize),
    ToggleTracking,
    Recenter,
    ChangeDestination,
    RetryLocation,
    RouteComputed { instructions: Vec<RouteInstruction> },
    RouteFailed(String),
    // Geolocation reports, consumed by the remote provider
    PositionFix(Position),
    PositionFailed(String),
    WatchUpdate { watch_id: u64, position: Position },
}

// Server -> client

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum MapIntent {
    /// `zoom: None` keeps the current zoom.
    SetView { center: Position, zoom: Option<u8> },
    MoveUserMarker(Position),
    ShowHospitalMarkers(Vec<HospitalCandidate>),
    ClearHospitalMarkers,
    DrawRoute { waypoints: [Position; 2] },
    SpliceOrigin(Position),
    RemoveRoute,
    SetGestures { enabled: bool },
    FitBounds(Bounds),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum UiIntent {
    HideLoading,
    ShowRetryLocation,
    ShowError(String),
    ShowCandidates(Vec<HospitalCandidate>),
    HideCandidates,
    ShowTrackingToggle { tracking: bool },
    HideTrackingToggle,
    ShowRecenter(bool),
    ShowGuidance(String),
    HideGuidance,
    ShowTraffic(TrafficEstimate),
    HideTraffic,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum GeoRequest {
    GetOnce,
    Watch { watch_id: u64 },
    ClearWatch { watch_id: u64 },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum Outbound {
    Map(MapIntent),
    Ui(UiIntent),
    Geo(GeoRequest),
    Transition(SessionStatus),
}

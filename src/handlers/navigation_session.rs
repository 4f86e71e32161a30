//! The per-connection navigation state machine.
//!
//! `NavigationSession` is synchronous: every input is applied to completion and
//! answered with the [`Command`]s the actor has to carry out. The one resource
//! it owns directly is the continuous position feed, held as a [`WatchHandle`]
//! that exists only while tracking and is released on every way out of it
//! (including drop).

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use crate::handlers::events::{Command, SessionStatus};
use crate::models::error::LocatorError;
use crate::models::hospital::HospitalCandidate;
use crate::models::position::{Bounds, Position};
use crate::models::traffic::TrafficEstimate;
use crate::models::updates::{MapIntent, UiIntent};
use crate::services::geolocation::{GeoFixAcquirer, WatchHandle};

/// Zoom for the first overview around the user.
pub const OVERVIEW_ZOOM: u8 = 15;
/// Zoom used when starting to follow the user and on recenter.
pub const FOLLOW_ZOOM: u8 = 18;

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// `[origin, destination]`
    pub waypoints: [Position; 2],
    pub instructions: Vec<String>,
}

pub struct NavigationSession {
    status: SessionStatus,
    origin: Option<Position>,
    candidates: Vec<HospitalCandidate>,
    destination: Option<HospitalCandidate>,
    active_watch: Option<WatchHandle>,
    current_route: Option<Route>,
    guidance: Option<String>,
    acquirer: GeoFixAcquirer,
    feed: mpsc::Sender<Position>,
}

impl NavigationSession {
    /// `feed` receives the continuous updates while tracking.
    pub fn new(acquirer: GeoFixAcquirer, feed: mpsc::Sender<Position>) -> Self {
        Self {
            status: SessionStatus::Idle,
            origin: None,
            candidates: Vec::new(),
            destination: None,
            active_watch: None,
            current_route: None,
            guidance: None,
            acquirer,
            feed,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn origin(&self) -> Option<Position> {
        self.origin
    }

    pub fn candidates(&self) -> &[HospitalCandidate] {
        &self.candidates
    }

    pub fn destination(&self) -> Option<&HospitalCandidate> {
        self.destination.as_ref()
    }

    pub fn current_route(&self) -> Option<&Route> {
        self.current_route.as_ref()
    }

    pub fn guidance(&self) -> Option<&str> {
        self.guidance.as_deref()
    }

    pub fn is_watching(&self) -> bool {
        self.active_watch.as_ref().map_or(false, WatchHandle::is_active)
    }

    pub fn begin(&mut self) -> Vec<Command> {
        vec![Command::AcquireFix]
    }

    pub fn retry_location(&mut self) -> Vec<Command> {
        vec![Command::AcquireFix]
    }

    pub fn on_fix(&mut self, result: Result<Position, LocatorError>) -> Vec<Command> {
        let position = match result {
            Ok(position) => position,
            Err(e) => {
                warn!("Could not acquire position: {}", e);
                return vec![Command::Ui(UiIntent::ShowRetryLocation)];
            }
        };

        match self.status {
            SessionStatus::Tracking => self.apply_position(position),
            SessionStatus::Idle => {
                self.origin = Some(position);
                vec![
                    Command::Map(MapIntent::SetView { center: position, zoom: Some(OVERVIEW_ZOOM) }),
                    Command::Map(MapIntent::MoveUserMarker(position)),
                    Command::Ui(UiIntent::ShowRecenter(true)),
                    Command::FetchHospitals(position),
                ]
            }
            _ => {
                self.origin = Some(position);
                vec![Command::Map(MapIntent::MoveUserMarker(position))]
            }
        }
    }

    /// Replaces the candidate set wholesale. Ignored once a destination is pinned.
    pub fn on_hospitals(&mut self, result: Result<Vec<HospitalCandidate>, LocatorError>) -> Vec<Command> {
        let accepting = matches!(self.status, SessionStatus::Idle | SessionStatus::CandidatesShown)
            && self.destination.is_none();
        if !accepting {
            debug!("Discarding hospital list, session is {} with a pinned destination", self.status);
            return vec![];
        }

        let mut commands = vec![Command::Map(MapIntent::ClearHospitalMarkers)];
        match result {
            Ok(candidates) => {
                info!("{} hospitals nearby", candidates.len());
                self.candidates = candidates;
                self.transition(SessionStatus::CandidatesShown, &mut commands);
                commands.push(Command::Map(MapIntent::ShowHospitalMarkers(self.candidates.clone())));
                commands.push(Command::Ui(UiIntent::ShowCandidates(self.candidates.clone())));
            }
            Err(e) => {
                warn!("Error fetching hospitals: {}", e);
                self.candidates.clear();
                self.transition(SessionStatus::Idle, &mut commands);
                commands.push(Command::Ui(UiIntent::HideCandidates));
                commands.push(Command::Ui(UiIntent::ShowError("Couldn't fetch hospital data.".to_string())));
            }
        }
        commands
    }

    /// Pins the destination and draws its route without starting to follow.
    pub fn select_candidate(&mut self, index: usize) -> Result<Vec<Command>, LocatorError> {
        match self.status {
            SessionStatus::CandidatesShown => {}
            SessionStatus::Tracking | SessionStatus::Stopped => return Err(LocatorError::DestinationLocked),
            SessionStatus::Idle => return Err(LocatorError::InvalidCandidate(index)),
        }

        let candidate = self
            .candidates
            .get(index)
            .cloned()
            .ok_or(LocatorError::InvalidCandidate(index))?;
        let origin = self
            .origin
            .ok_or_else(|| LocatorError::LocationUnavailable("no position fix yet".to_string()))?;

        let mut commands = Vec::new();
        if self.current_route.take().is_some() {
            commands.push(Command::Map(MapIntent::RemoveRoute));
        }
        self.guidance = None;

        info!("Routing to {} ({:.2} km)", candidate.name, candidate.distance_km);
        let waypoints = [origin, candidate.position];
        self.current_route = Some(Route { waypoints, instructions: Vec::new() });

        commands.extend([
            Command::Ui(UiIntent::HideCandidates),
            Command::Map(MapIntent::ClearHospitalMarkers),
            Command::Map(MapIntent::DrawRoute { waypoints }),
            Command::Ui(UiIntent::HideTraffic),
            Command::Ui(UiIntent::ShowTrackingToggle { tracking: false }),
            Command::EstimateTraffic { hospital_id: candidate.id.clone(), position: candidate.position },
        ]);
        self.destination = Some(candidate);
        Ok(commands)
    }

    pub fn route_to_nearest(&mut self) -> Result<Vec<Command>, LocatorError> {
        self.select_candidate(0)
    }

    /// Selects (if needed) and starts following. A second start while tracking does nothing.
    pub fn start_tracking(&mut self, index: usize) -> Result<Vec<Command>, LocatorError> {
        match self.status {
            SessionStatus::Tracking => {
                debug!("Already tracking, ignoring start");
                Ok(vec![])
            }
            SessionStatus::CandidatesShown => {
                let mut commands = if self.is_selected(index) {
                    Vec::new()
                } else {
                    self.select_candidate(index)?
                };
                commands.extend(self.enter_tracking());
                Ok(commands)
            }
            SessionStatus::Stopped if self.is_selected(index) => Ok(self.enter_tracking()),
            SessionStatus::Stopped => Err(LocatorError::DestinationLocked),
            SessionStatus::Idle => Err(LocatorError::InvalidCandidate(index)),
        }
    }

    /// The start/stop button.
    pub fn toggle_tracking(&mut self) -> Vec<Command> {
        match self.status {
            SessionStatus::Tracking => self.stop_tracking(),
            SessionStatus::Stopped => self.enter_tracking(),
            SessionStatus::CandidatesShown if self.destination.is_some() => self.enter_tracking(),
            _ => {
                debug!("Nothing to toggle while {}", self.status);
                vec![]
            }
        }
    }

    /// Idempotent; outside tracking only makes sure no feed is left open.
    pub fn stop_tracking(&mut self) -> Vec<Command> {
        self.release_watch();
        if self.status != SessionStatus::Tracking {
            debug!("Stop requested while {}, nothing to do", self.status);
            return vec![];
        }

        let mut commands = Vec::new();
        self.transition(SessionStatus::Stopped, &mut commands);
        commands.extend([
            Command::Map(MapIntent::SetGestures { enabled: true }),
            Command::Ui(UiIntent::ShowTrackingToggle { tracking: false }),
            Command::Ui(UiIntent::ShowRecenter(true)),
            Command::Ui(UiIntent::HideGuidance),
        ]);
        if let Some(route) = &self.current_route {
            let [start, end] = route.waypoints;
            commands.push(Command::Map(MapIntent::FitBounds(Bounds::covering(start, end))));
        }
        commands
    }

    /// Drops the destination and route, then searches again from the current origin.
    pub fn change_destination(&mut self) -> Vec<Command> {
        let mut commands = self.stop_tracking();

        if self.current_route.take().is_some() {
            commands.push(Command::Map(MapIntent::RemoveRoute));
        }
        self.guidance = None;

        if self.status != SessionStatus::Idle {
            self.destination = None;
            self.candidates.clear();
            commands.push(Command::Ui(UiIntent::HideTraffic));
            commands.push(Command::Ui(UiIntent::HideTrackingToggle));
            commands.push(Command::Ui(UiIntent::HideCandidates));
            self.transition(SessionStatus::CandidatesShown, &mut commands);
        }

        if let Some(origin) = self.origin {
            commands.push(Command::FetchHospitals(origin));
        }
        commands
    }

    pub fn recenter(&mut self) -> Vec<Command> {
        match self.origin {
            Some(origin) => vec![Command::Map(MapIntent::SetView { center: origin, zoom: Some(FOLLOW_ZOOM) })],
            None => vec![],
        }
    }

    /// One live fix: move the origin, splice the route start, follow.
    pub fn apply_position(&mut self, position: Position) -> Vec<Command> {
        if self.status != SessionStatus::Tracking {
            debug!("Ignoring position update while {}", self.status);
            return vec![];
        }

        self.origin = Some(position);
        if let Some(route) = &mut self.current_route {
            route.waypoints[0] = position;
        }
        vec![
            Command::Map(MapIntent::MoveUserMarker(position)),
            Command::Map(MapIntent::SetView { center: position, zoom: None }),
            Command::Map(MapIntent::SpliceOrigin(position)),
        ]
    }

    /// Only the first instruction is surfaced; progress along the route is not tracked.
    pub fn on_route_computed(&mut self, instructions: Vec<String>) -> Vec<Command> {
        if self.destination.is_none() {
            debug!("Route computed without a destination, ignoring");
            return vec![];
        }

        let first = instructions.first().cloned();
        if let Some(route) = &mut self.current_route {
            route.instructions = instructions;
        }

        match first {
            Some(text) => {
                self.guidance = Some(text.clone());
                if self.status == SessionStatus::Tracking {
                    vec![Command::Ui(UiIntent::ShowGuidance(text))]
                } else {
                    vec![]
                }
            }
            None => self.withhold_guidance(&LocatorError::RouteUnavailable),
        }
    }

    pub fn on_route_failed(&mut self, reason: &str) -> Vec<Command> {
        warn!("Routing engine failed: {}", reason);
        self.withhold_guidance(&LocatorError::RouteUnavailable)
    }

    /// Applies a traffic answer if it still belongs to the current destination.
    pub fn on_traffic(&mut self, hospital_id: &str, estimate: Option<TrafficEstimate>) -> Vec<Command> {
        match &self.destination {
            Some(destination) if destination.id == hospital_id => match estimate {
                Some(estimate) => vec![Command::Ui(UiIntent::ShowTraffic(estimate))],
                None => vec![Command::Ui(UiIntent::HideTraffic)],
            },
            _ => {
                debug!("Stale traffic estimate for {}", hospital_id);
                vec![]
            }
        }
    }

    fn enter_tracking(&mut self) -> Vec<Command> {
        let origin = match (self.origin, &self.destination) {
            (Some(origin), Some(_)) => origin,
            _ => return vec![],
        };
        if self.is_watching() {
            warn!("Position watch already open, not opening another");
            return vec![];
        }

        self.active_watch = Some(self.acquirer.acquire_continuous(self.feed.clone()));

        let mut commands = Vec::new();
        self.transition(SessionStatus::Tracking, &mut commands);
        commands.extend([
            Command::Map(MapIntent::SetGestures { enabled: false }),
            Command::Map(MapIntent::SetView { center: origin, zoom: Some(FOLLOW_ZOOM) }),
            Command::Ui(UiIntent::ShowTrackingToggle { tracking: true }),
            Command::Ui(UiIntent::ShowRecenter(false)),
        ]);
        if let Some(text) = &self.guidance {
            commands.push(Command::Ui(UiIntent::ShowGuidance(text.clone())));
        }
        commands
    }

    fn withhold_guidance(&mut self, reason: &LocatorError) -> Vec<Command> {
        debug!("Withholding guidance: {}", reason);
        self.guidance = None;
        if self.status == SessionStatus::Tracking {
            vec![Command::Ui(UiIntent::HideGuidance)]
        } else {
            vec![]
        }
    }

    fn release_watch(&mut self) {
        if let Some(mut handle) = self.active_watch.take() {
            self.acquirer.release(&mut handle);
        }
    }

    fn is_selected(&self, index: usize) -> bool {
        match (&self.destination, self.candidates.get(index)) {
            (Some(destination), Some(candidate)) => destination.id == candidate.id,
            _ => false,
        }
    }

    fn transition(&mut self, to: SessionStatus, commands: &mut Vec<Command>) {
        if self.status != to {
            info!("Transitioning {} -> {}", self.status, to);
            self.status = to;
            commands.push(Command::Transition(to));
        }
    }
}

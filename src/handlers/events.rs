use std::fmt::{Display, Formatter};
use serde::Serialize;
use crate::models::position::Position;
use crate::models::updates::{MapIntent, UiIntent};

/// Effects requested by the navigation session, executed by the session actor.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Map(MapIntent),
    Ui(UiIntent),
    Transition(SessionStatus),
    AcquireFix,
    FetchHospitals(Position),
    EstimateTraffic { hospital_id: String, position: Position },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    CandidatesShown,
    Tracking,
    Stopped,
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::CandidatesShown => "CandidatesShown",
            SessionStatus::Tracking => "Tracking",
            SessionStatus::Stopped => "Stopped",
        };
        write!(f, "{}", name)
    }
}

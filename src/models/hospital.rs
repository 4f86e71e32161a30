use serde::{Serialize, Serializer};
use crate::geo::round_km;
use crate::models::position::Position;

/// One ranked facility. Lives for a single fetch cycle.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HospitalCandidate {
    pub id: String,
    pub name: String,
    pub position: Position,
    /// Full precision; only the wire form is rounded.
    #[serde(serialize_with = "serialize_rounded_km")]
    pub distance_km: f64,
    pub eta_minutes: u32,
}

fn serialize_rounded_km<S: Serializer>(km: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_km(*km))
}

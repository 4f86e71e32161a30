use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    /// `ratio` is live speed over free-flow speed.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 0.8 {
            CongestionLevel::Low
        } else if ratio > 0.5 {
            CongestionLevel::Medium
        } else {
            CongestionLevel::High
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficEstimate {
    pub level: CongestionLevel,
    pub eta_minutes: u32,
}

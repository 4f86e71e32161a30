use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

#[derive(Clone, PartialEq)]
pub enum LocatorError {
    /// The geolocation provider denied or failed the request.
    LocationUnavailable(String),
    /// A directory or traffic query failed at the network, HTTP or decode level.
    FetchFailed(String),
    /// The routing engine returned no instructions.
    RouteUnavailable,
    InvalidCandidate(usize),
    /// A destination is pinned; it has to be changed before picking another one.
    DestinationLocked,
}

impl Debug for LocatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for LocatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LocatorError::LocationUnavailable(reason) => write!(f, "Location unavailable: {}", reason),
            LocatorError::FetchFailed(reason) => write!(f, "Fetch failed: {}", reason),
            LocatorError::RouteUnavailable => write!(f, "No route instructions available"),
            LocatorError::InvalidCandidate(index) => write!(f, "No hospital candidate at index {}", index),
            LocatorError::DestinationLocked => write!(f, "Destination is locked, change destination first"),
        }
    }
}

impl Error for LocatorError {

}

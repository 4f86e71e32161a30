use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Axis-aligned view box, as handed to the map for `FitBounds`.
///
/// A box crossing the antimeridian has `north_east.longitude` above 180, which
/// the map wraps onto the far side.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Position,
    pub north_east: Position,
}

impl Bounds {
    /// Smallest box containing both points, taking the short way around in longitude.
    pub fn covering(a: Position, b: Position) -> Self {
        let (west, east) = if a.longitude <= b.longitude {
            (a.longitude, b.longitude)
        } else {
            (b.longitude, a.longitude)
        };
        let (west, east) = if east - west > 180.0 { (east, west + 360.0) } else { (west, east) };

        Self {
            south_west: Position::new(a.latitude.min(b.latitude), west),
            north_east: Position::new(a.latitude.max(b.latitude), east),
        }
    }

    pub fn contains(&self, p: Position) -> bool {
        let within_longitude = |lon: f64| lon >= self.south_west.longitude && lon <= self.north_east.longitude;
        p.latitude >= self.south_west.latitude
            && p.latitude <= self.north_east.latitude
            && (within_longitude(p.longitude) || within_longitude(p.longitude + 360.0))
    }
}

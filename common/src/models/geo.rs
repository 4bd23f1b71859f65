//! Geographic points.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Mean Earth radius used for haversine distances, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Creates a location, rejecting coordinates outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::InvalidLocation(format!(
                "latitude {latitude} is out of range"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::InvalidLocation(format!(
                "longitude {longitude} is out of range"
            )));
        }
        Ok(Self { latitude, longitude })
    }

    /// Extended WKT for PostGIS, e.g. `SRID=4326;POINT(-73.98 40.75)`.
    pub fn to_ewkt(&self) -> String {
        format!("SRID=4326;POINT({} {})", self.longitude, self.latitude)
    }

    /// Great-circle distance to `other`, in metres.
    pub fn distance_m(&self, other: &Location) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

impl TryFrom<(f64, f64)> for Location {
    type Error = AppError;

    fn try_from((latitude, longitude): (f64, f64)) -> Result<Self, Self::Error> {
        Location::new(latitude, longitude)
    }
}

impl FromStr for Location {
    type Err = AppError;

    /// Parses `"lat,long"`, tolerating whitespace around either number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || AppError::InvalidLocation(format!("'{s}' is not a 'latitude,longitude' pair"));

        let mut parts = s.split(',');
        let (Some(lat), Some(long), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let latitude: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let longitude: f64 = long.trim().parse().map_err(|_| invalid())?;
        Location::new(latitude, longitude)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_location() {
        let loc = Location::new(40.7, -73.9).unwrap();
        assert_eq!(loc.latitude, 40.7);
        assert_eq!(loc.longitude, -73.9);
        assert!(Location::new(90.0, 180.0).is_ok());
        assert!(Location::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_invalid_location() {
        assert!(matches!(Location::new(91.0, 0.0), Err(AppError::InvalidLocation(_))));
        assert!(Location::new(0.0, -180.5).is_err());
        assert!(Location::new(f64::NAN, 0.0).is_err());
        assert!(Location::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse() {
        let loc: Location = " 40.7 , -73.9 ".parse().unwrap();
        assert_eq!(loc, Location::new(40.7, -73.9).unwrap());
        assert!("40.7".parse::<Location>().is_err());
        assert!("40.7,-73.9,1".parse::<Location>().is_err());
        assert!("north,west".parse::<Location>().is_err());
        assert!("100,0".parse::<Location>().is_err());
    }

    #[test]
    fn test_from_pair() {
        assert!(Location::try_from((39.7, -97.8)).is_ok());
        assert!(Location::try_from((-97.8, 39.7)).is_err());
    }

    #[test]
    fn test_ewkt() {
        let loc = Location::new(40.5, -73.25).unwrap();
        assert_eq!(loc.to_ewkt(), "SRID=4326;POINT(-73.25 40.5)");
    }

    #[test]
    fn test_distance() {
        let nyc = Location::new(40.7128, -74.0060).unwrap();
        let la = Location::new(34.0522, -118.2437).unwrap();
        let km = nyc.distance_m(&la) / 1000.0;
        assert!((3930.0..3950.0).contains(&km), "got {km}");
        assert_eq!(nyc.distance_m(&nyc), 0.0);
    }
}

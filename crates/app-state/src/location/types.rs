//! Location value types and read models

use app_platform::{Address, Coordinates};
use serde::{Deserialize, Serialize};

use super::error::LocationError;

/// Tri-state permission outcome tracked for the session
pub use app_platform::PermissionStatus as PermissionOutcome;

/// A resolved device location
///
/// Produced only by a successful fetch and replaced wholesale by the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// City, or the subregion when the platform reports no city
    pub city: Option<String>,
    /// State or province
    pub region: Option<String>,
    /// Country name
    pub country: Option<String>,
}

impl LocationData {
    /// A location with coordinates only
    pub fn from_fix(fix: Coordinates) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            city: None,
            region: None,
            country: None,
        }
    }

    /// A location with place names taken from a geocode result
    pub fn with_address(fix: Coordinates, address: &Address) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            city: address.locality().map(str::to_string),
            region: address.region.clone(),
            country: address.country.clone(),
        }
    }

    /// Coordinates without the place names
    pub fn coordinates(&self) -> UserCoordinates {
        UserCoordinates { latitude: self.latitude, longitude: self.longitude }
    }
}

/// Latitude/longitude pair exposed to screens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserCoordinates {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// State published by the acquirer
///
/// `loading` is only true while a fetch attempt is in flight. A new attempt
/// clears the previous `error`; a failed fetch keeps the last good `location`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquirerState {
    /// Most recent successful location
    pub location: Option<LocationData>,
    /// Whether a fetch is in flight
    pub loading: bool,
    /// Failure of the most recent attempt
    pub error: Option<LocationError>,
}

impl AcquirerState {
    /// Human-readable error message, if the last attempt failed
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Simplified location view for the rest of the app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReadModel {
    /// City of the current location
    pub current_city: Option<String>,
    /// Coordinates of the current location
    pub user_location: Option<UserCoordinates>,
    /// Whether a fetch is in flight
    pub loading: bool,
}

impl From<&AcquirerState> for LocationReadModel {
    fn from(state: &AcquirerState) -> Self {
        LocationReadModel {
            current_city: state.location.as_ref().and_then(|l| l.city.clone()),
            user_location: state.location.as_ref().map(LocationData::coordinates),
            loading: state.loading,
        }
    }
}

//! Device location capability
//!
//! The location service is a process-wide platform resource. Callers never hold
//! it exclusively; every operation is a discrete async request/response and any
//! of them may fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by the platform location service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Location services are switched off at the OS level
    #[error("Location services are disabled")]
    ServicesDisabled,

    /// The platform did not produce a result in time
    #[error("Location request timed out")]
    Timeout,

    /// No provider could produce a result (no signal, no network)
    #[error("Location unavailable: {0}")]
    Unavailable(String),

    /// Any other platform failure
    #[error("Platform error: {0}")]
    Other(String),
}

/// Result type for platform location operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Permission status as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStatus {
    /// The user allowed location access
    Granted,
    /// The user or OS refused location access
    Denied,
    /// The user has not been asked yet
    #[default]
    Undetermined,
}

impl PermissionStatus {
    /// Whether location access is allowed
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
            PermissionStatus::Undetermined => "undetermined",
        };
        f.write_str(label)
    }
}

/// Accuracy tier for a position fix
///
/// Higher tiers take longer and use more power. `Balanced` is good to roughly
/// city block level, which is all a delivery-area display needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Accuracy {
    /// Accurate to about 3km
    Lowest,
    /// Accurate to about 1km
    Low,
    /// Accurate to about 100m
    #[default]
    Balanced,
    /// Accurate to about 10m
    High,
    /// Best the device can do
    Highest,
}

/// A single position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// One reverse-geocode result
///
/// Every component is optional; platforms fill in what they know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// City or town
    pub city: Option<String>,
    /// County or district, used when no city is reported
    pub subregion: Option<String>,
    /// State or province
    pub region: Option<String>,
    /// Country name
    pub country: Option<String>,
}

impl Address {
    /// Create an address with only a city set
    pub fn with_city(city: impl Into<String>) -> Self {
        Self { city: Some(city.into()), ..Self::default() }
    }

    /// The most specific locality name available
    ///
    /// Falls back to the subregion when the platform reports no city.
    pub fn locality(&self) -> Option<&str> {
        self.city.as_deref().or(self.subregion.as_deref())
    }
}

/// Device location service
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LocationService: Send + Sync {
    /// Read the current permission status without prompting the user
    async fn check_permission(&self) -> Result<PermissionStatus>;

    /// Ask for foreground location permission
    ///
    /// May surface an OS-level prompt.
    async fn request_permission(&self) -> Result<PermissionStatus>;

    /// Obtain a position fix at the given accuracy tier
    async fn current_fix(&self, accuracy: Accuracy) -> Result<Coordinates>;

    /// Translate coordinates into zero or more addresses
    async fn reverse_geocode(&self, coords: Coordinates) -> Result<Vec<Address>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locality_prefers_city() {
        let address = Address {
            city: Some("Brooklyn".to_string()),
            subregion: Some("Kings County".to_string()),
            ..Address::default()
        };
        assert_eq!(address.locality(), Some("Brooklyn"));
    }

    #[test]
    fn test_locality_falls_back_to_subregion() {
        let address = Address {
            subregion: Some("Kings County".to_string()),
            region: Some("NY".to_string()),
            ..Address::default()
        };
        assert_eq!(address.locality(), Some("Kings County"));
        assert_eq!(Address::default().locality(), None);
    }

    #[test]
    fn test_permission_status() {
        assert!(PermissionStatus::Granted.is_granted());
        assert!(!PermissionStatus::Denied.is_granted());
        assert!(!PermissionStatus::Undetermined.is_granted());
        assert_eq!(PermissionStatus::default(), PermissionStatus::Undetermined);
        assert_eq!(PermissionStatus::Denied.to_string(), "denied");
    }

    #[test]
    fn test_accuracy_default() {
        assert_eq!(Accuracy::default(), Accuracy::Balanced);
    }

    #[tokio::test]
    async fn test_mock_service() {
        let mut mock = MockLocationService::new();
        mock.expect_check_permission()
            .times(1)
            .returning(|| Ok(PermissionStatus::Denied));
        mock.expect_current_fix()
            .returning(|_| Err(PlatformError::ServicesDisabled));

        let service: &dyn LocationService = &mock;
        assert_eq!(service.check_permission().await, Ok(PermissionStatus::Denied));
        assert_eq!(
            service.current_fix(Accuracy::Balanced).await,
            Err(PlatformError::ServicesDisabled)
        );
    }
}

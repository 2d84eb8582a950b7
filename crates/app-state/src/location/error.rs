//! Location failure taxonomy

use app_platform::PlatformError;
use thiserror::Error;

/// Reasons a location attempt did not produce a fix
///
/// The `Display` text is what screens show, so it is written for users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The user or the OS refused location access
    #[error("Location permission was denied")]
    PermissionDenied,

    /// Asking for permission failed at the platform level
    #[error("Could not request location permission: {0}")]
    PermissionRequestFailed(String),

    /// No position fix could be obtained
    #[error("Could not get your current location: {0}")]
    FetchFailed(String),

    /// Reverse lookup failed or returned nothing
    ///
    /// Never stored in acquirer state; a fix without a place name is still a
    /// usable location.
    #[error("Could not look up your city: {0}")]
    GeocodeFailed(String),
}

impl LocationError {
    /// Wrap a platform failure raised while requesting permission
    pub fn permission_request(err: PlatformError) -> Self {
        LocationError::PermissionRequestFailed(err.to_string())
    }

    /// Wrap a platform failure raised while fetching a fix
    pub fn fetch(err: PlatformError) -> Self {
        LocationError::FetchFailed(err.to_string())
    }
}

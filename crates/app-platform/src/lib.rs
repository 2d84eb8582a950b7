//! Platform capabilities for Shopfront
//!
//! This crate defines the device services the app consumes (currently the
//! location service) as async traits, so state crates can be driven by real
//! platform bindings or by test doubles.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod location;

#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use location::{
    Accuracy, Address, Coordinates, LocationService, PermissionStatus, PlatformError,
};

#[cfg(any(test, feature = "testing"))]
pub use location::MockLocationService;

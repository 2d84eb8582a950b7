//! Application state management for Shopfront
//!
//! This crate provides the client-side state that screens read from. The
//! location subsystem decides when to ask for location permission, acquires a
//! fix, and publishes a small read model for the rest of the app.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod location;

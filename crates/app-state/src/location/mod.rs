//! Location acquisition and permission orchestration
//!
//! Two components, composed top-down:
//!
//! - [`LocationAcquirer`] talks to the device [`LocationService`]: it checks and
//!   requests permission, fetches a fix, reverse-geocodes it, and publishes an
//!   [`AcquirerState`].
//! - [`LocationOrchestrator`] owns the prompt policy: one deferred automatic
//!   prompt per session, manual re-prompts on demand, and mapping of the
//!   prompt's allow/deny/close callbacks onto acquirer operations. It
//!   republishes a [`LocationReadModel`] for screens.
//!
//! Failures never escape this module as errors. Permission and fetch failures
//! land in [`AcquirerState::error`]; geocoding failures are absorbed.
//!
//! [`LocationService`]: app_platform::LocationService

pub mod acquirer;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod types;

pub use acquirer::LocationAcquirer;
pub use config::{LocationConfig, LocationConfigError};
pub use error::LocationError;
pub use orchestrator::{LocationEvent, LocationOrchestrator, ReadModelWatch};
pub use prompt::{PromptAction, PromptMachine, PromptPhase, PromptProps, PromptResolution};
pub use types::{AcquirerState, LocationData, LocationReadModel, PermissionOutcome, UserCoordinates};

//! Location acquisition
//!
//! The acquirer owns the raw conversation with the device location service and
//! publishes the outcome as [`AcquirerState`] through a watch channel.
//!
//! Within one [`LocationAcquirer::get_current_location`] call the permission
//! check precedes the fix and the fix precedes geocoding. Overlapping calls are
//! resolved latest-started-wins: each call takes an attempt number, and only
//! the newest attempt may write results or clear `loading`.

use app_platform::{Address, Coordinates, LocationService};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::LocationConfig;
use super::error::LocationError;
use super::types::{AcquirerState, LocationData, PermissionOutcome};

/// Device location acquirer
///
/// # Example
///
/// ```no_run
/// use app_platform::LocationService;
/// use app_state::location::{LocationAcquirer, LocationConfig};
/// use std::sync::Arc;
///
/// async fn locate(service: Arc<dyn LocationService>) {
///     let acquirer = LocationAcquirer::new(service, LocationConfig::default());
///     acquirer.get_current_location().await;
///
///     let state = acquirer.state();
///     if let Some(location) = state.location {
///         println!("{:?}", location.city);
///     }
/// }
/// ```
pub struct LocationAcquirer {
    service: Arc<dyn LocationService>,
    config: LocationConfig,
    /// Published state
    state_tx: watch::Sender<AcquirerState>,
    /// Last permission status seen this session
    permission: Mutex<PermissionOutcome>,
    /// Number of the most recently started fetch attempt
    latest_attempt: AtomicU64,
    mounted: AtomicBool,
    initial_check_started: AtomicBool,
}

impl LocationAcquirer {
    /// Create an acquirer over the given location service
    pub fn new(service: Arc<dyn LocationService>, config: LocationConfig) -> Self {
        let (state_tx, _) = watch::channel(AcquirerState::default());

        Self {
            service,
            config,
            state_tx,
            permission: Mutex::new(PermissionOutcome::Undetermined),
            latest_attempt: AtomicU64::new(0),
            mounted: AtomicBool::new(true),
            initial_check_started: AtomicBool::new(false),
        }
    }

    /// Configuration this acquirer was built with
    pub fn config(&self) -> &LocationConfig {
        &self.config
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AcquirerState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<AcquirerState> {
        self.state_tx.subscribe()
    }

    /// Last permission status observed this session
    pub fn permission(&self) -> PermissionOutcome {
        *self.permission.lock()
    }

    /// Whether results are still being applied
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Run the mount-time permission check in the background
    ///
    /// See [`initial_check`](Self::initial_check).
    pub fn mount(self: &Arc<Self>) -> JoinHandle<()> {
        let acquirer = Arc::clone(self);
        tokio::spawn(async move { acquirer.initial_check().await })
    }

    /// Check permission without prompting and fetch if it is already granted
    ///
    /// Runs at most once per acquirer; later calls return immediately.
    pub async fn initial_check(&self) {
        if self.initial_check_started.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.service.check_permission().await {
            Ok(status) => {
                self.record_permission(status);
                if status.is_granted() {
                    tracing::debug!("Location permission already granted, fetching");
                    self.get_current_location().await;
                }
            }
            Err(e) => {
                tracing::warn!("Initial location permission check failed: {}", e);
            }
        }
    }

    /// Stop applying results
    ///
    /// In-flight platform calls keep running but their outcomes are dropped.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    /// Ask the user for location permission
    ///
    /// Fails closed: returns `true` only when the platform reports the
    /// permission granted. Otherwise `error` is set and `false` returned.
    /// While a fetch is in flight the error is not recorded; that fetch
    /// decides `location` and `error`.
    pub async fn request_permission(&self) -> bool {
        self.request_permission_for(None).await
    }

    /// Acquire the current location
    ///
    /// The result is observed through [`state`](Self::state). Never fails;
    /// failures are recorded in `error`.
    pub async fn get_current_location(&self) {
        let Some(attempt) = self.begin_attempt() else {
            return;
        };
        tracing::debug!("Location fetch {} started", attempt);

        self.fetch(attempt).await;

        self.update(Some(attempt), |state| state.loading = false);
    }

    async fn request_permission_for(&self, attempt: Option<u64>) -> bool {
        match self.service.request_permission().await {
            Ok(status) => {
                self.record_permission(status);
                if status.is_granted() {
                    return true;
                }
                tracing::warn!("Location permission {}", status);
                self.update(attempt, |state| {
                    state.error = Some(LocationError::PermissionDenied);
                });
                false
            }
            Err(e) => {
                tracing::warn!("Location permission request failed: {}", e);
                self.update(attempt, |state| {
                    state.error = Some(LocationError::permission_request(e));
                });
                false
            }
        }
    }

    async fn fetch(&self, attempt: u64) {
        let granted = match self.service.check_permission().await {
            Ok(status) => {
                self.record_permission(status);
                status.is_granted()
            }
            Err(e) => {
                tracing::warn!("Location permission check failed, requesting instead: {}", e);
                false
            }
        };

        if !granted && !self.request_permission_for(Some(attempt)).await {
            return;
        }

        let fix = match self.service.current_fix(self.config.accuracy).await {
            Ok(fix) => fix,
            Err(e) => {
                tracing::warn!("Location fetch {} failed: {}", attempt, e);
                self.update(Some(attempt), |state| {
                    state.error = Some(LocationError::fetch(e));
                });
                return;
            }
        };

        let location = match self.reverse_geocode(fix).await {
            Ok(address) => LocationData::with_address(fix, &address),
            Err(e) => {
                tracing::warn!("{}; keeping coordinates only", e);
                LocationData::from_fix(fix)
            }
        };

        tracing::info!(
            "Location resolved: {:?} ({}, {})",
            location.city,
            location.latitude,
            location.longitude
        );
        self.update(Some(attempt), |state| state.location = Some(location));
    }

    /// One lookup; the first result wins
    async fn reverse_geocode(&self, fix: Coordinates) -> Result<Address, LocationError> {
        let addresses = self
            .service
            .reverse_geocode(fix)
            .await
            .map_err(|e| LocationError::GeocodeFailed(e.to_string()))?;

        addresses
            .into_iter()
            .next()
            .ok_or_else(|| LocationError::GeocodeFailed("no results".to_string()))
    }

    /// Take a new attempt number and mark the fetch as started
    fn begin_attempt(&self) -> Option<u64> {
        if !self.is_mounted() {
            tracing::debug!("Ignoring location fetch after unmount");
            return None;
        }

        let mut attempt = 0;
        self.state_tx.send_modify(|state| {
            attempt = self.latest_attempt.fetch_add(1, Ordering::SeqCst) + 1;
            state.loading = true;
            state.error = None;
        });
        Some(attempt)
    }

    /// Apply a state change unless unmounted or superseded by a newer attempt
    ///
    /// `attempt` is `None` for writes that do not belong to a fetch. Those are
    /// dropped while any fetch is loading.
    fn update(&self, attempt: Option<u64>, apply: impl FnOnce(&mut AcquirerState)) -> bool {
        if !self.is_mounted() {
            tracing::debug!("Dropping location state update after unmount");
            return false;
        }

        // The attempt counter is only bumped inside the watch lock, so this
        // comparison cannot race with a newer attempt starting.
        self.state_tx.send_if_modified(|state| {
            match attempt {
                Some(attempt) if attempt != self.latest_attempt.load(Ordering::SeqCst) => {
                    tracing::debug!("Dropping result of superseded location fetch {}", attempt);
                    return false;
                }
                None if state.loading => {
                    tracing::debug!("Dropping permission outcome during location fetch");
                    return false;
                }
                _ => {}
            }
            apply(state);
            true
        })
    }

    fn record_permission(&self, status: PermissionOutcome) {
        if self.is_mounted() {
            *self.permission.lock() = status;
        }
    }
}

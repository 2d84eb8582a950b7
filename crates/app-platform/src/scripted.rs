//! Scripted location service for tests
//!
//! Each operation replays queued steps first and then repeats its fallback
//! step. A step carries an optional latency so tests running on a paused tokio
//! clock can observe in-flight state and force a completion order.

use crate::location::{
    Accuracy, Address, Coordinates, LocationService, PermissionStatus, PlatformError, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Step<T> {
    delay: Duration,
    result: Result<T>,
}

impl<T> Step<T> {
    fn immediate(result: Result<T>) -> Self {
        Self { delay: Duration::ZERO, result }
    }
}

#[derive(Debug)]
struct Script<T> {
    queued: VecDeque<Step<T>>,
    fallback: Step<T>,
}

impl<T: Clone> Script<T> {
    fn new(result: Result<T>) -> Self {
        Self { queued: VecDeque::new(), fallback: Step::immediate(result) }
    }

    fn next(&mut self) -> Step<T> {
        self.queued.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

async fn play<T>(step: Step<T>) -> Result<T> {
    if !step.delay.is_zero() {
        tokio::time::sleep(step.delay).await;
    }
    step.result
}

/// A [`LocationService`] whose answers are fixed up front
///
/// Defaults model a device that has never been asked for permission, grants it
/// when asked, cannot get a fix, and knows no addresses.
#[derive(Debug)]
pub struct ScriptedLocationService {
    check: Mutex<Script<PermissionStatus>>,
    request: Mutex<Script<PermissionStatus>>,
    fix: Mutex<Script<Coordinates>>,
    geocode: Mutex<Script<Vec<Address>>>,
    check_calls: AtomicUsize,
    request_calls: AtomicUsize,
    fix_calls: AtomicUsize,
    geocode_calls: AtomicUsize,
    last_accuracy: Mutex<Option<Accuracy>>,
}

impl ScriptedLocationService {
    /// Create a service with the default script
    pub fn new() -> Self {
        Self {
            check: Mutex::new(Script::new(Ok(PermissionStatus::Undetermined))),
            request: Mutex::new(Script::new(Ok(PermissionStatus::Granted))),
            fix: Mutex::new(Script::new(Err(PlatformError::Unavailable(
                "no fix scripted".to_string(),
            )))),
            geocode: Mutex::new(Script::new(Ok(Vec::new()))),
            check_calls: AtomicUsize::new(0),
            request_calls: AtomicUsize::new(0),
            fix_calls: AtomicUsize::new(0),
            geocode_calls: AtomicUsize::new(0),
            last_accuracy: Mutex::new(None),
        }
    }

    /// Status reported by `check_permission`
    pub fn with_permission(self, status: PermissionStatus) -> Self {
        self.check.lock().fallback = Step::immediate(Ok(status));
        self
    }

    /// Make `check_permission` fail
    pub fn with_check_error(self, error: PlatformError) -> Self {
        self.check.lock().fallback = Step::immediate(Err(error));
        self
    }

    /// Result of `request_permission`
    pub fn with_request_result(self, result: Result<PermissionStatus>) -> Self {
        self.request.lock().fallback.result = result;
        self
    }

    /// Time the user takes to answer `request_permission`
    pub fn with_request_delay(self, delay: Duration) -> Self {
        self.request.lock().fallback.delay = delay;
        self
    }

    /// Result of every `current_fix` call not covered by a queued step
    pub fn with_fix(self, result: Result<Coordinates>) -> Self {
        self.fix.lock().fallback.result = result;
        self
    }

    /// Latency of every `current_fix` call not covered by a queued step
    pub fn with_fix_delay(self, delay: Duration) -> Self {
        self.fix.lock().fallback.delay = delay;
        self
    }

    /// Queue a one-off `current_fix` answer
    pub fn push_fix(self, delay: Duration, result: Result<Coordinates>) -> Self {
        self.fix.lock().queued.push_back(Step { delay, result });
        self
    }

    /// Result of every `reverse_geocode` call
    pub fn with_geocode(self, result: Result<Vec<Address>>) -> Self {
        self.geocode.lock().fallback.result = result;
        self
    }

    /// Latency of every `reverse_geocode` call
    pub fn with_geocode_delay(self, delay: Duration) -> Self {
        self.geocode.lock().fallback.delay = delay;
        self
    }

    /// Number of `check_permission` calls so far
    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    /// Number of `request_permission` calls so far
    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }

    /// Number of `current_fix` calls so far
    pub fn fix_calls(&self) -> usize {
        self.fix_calls.load(Ordering::SeqCst)
    }

    /// Number of `reverse_geocode` calls so far
    pub fn geocode_calls(&self) -> usize {
        self.geocode_calls.load(Ordering::SeqCst)
    }

    /// Accuracy tier passed to the most recent `current_fix` call
    pub fn last_accuracy(&self) -> Option<Accuracy> {
        *self.last_accuracy.lock()
    }
}

impl Default for ScriptedLocationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationService for ScriptedLocationService {
    async fn check_permission(&self) -> Result<PermissionStatus> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.check.lock().next();
        play(step).await
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.request.lock().next();
        let result = play(step).await;

        // The OS remembers the answer; later checks report it.
        if let Ok(status) = result {
            self.check.lock().fallback = Step::immediate(Ok(status));
        }
        result
    }

    async fn current_fix(&self, accuracy: Accuracy) -> Result<Coordinates> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_accuracy.lock() = Some(accuracy);
        let step = self.fix.lock().next();
        play(step).await
    }

    async fn reverse_geocode(&self, _coords: Coordinates) -> Result<Vec<Address>> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.geocode.lock().next();
        play(step).await
    }
}

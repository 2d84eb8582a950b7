//! Location permission orchestration
//!
//! The orchestrator decides when the user is asked for location permission and
//! turns prompt answers into acquirer calls. Screens read the derived
//! [`LocationReadModel`] and may ask for a new prompt or a fresh fix at any
//! time.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use super::acquirer::LocationAcquirer;
use super::prompt::{PromptAction, PromptMachine, PromptPhase, PromptProps, PromptResolution};
use super::types::{AcquirerState, LocationReadModel};

/// Events broadcast by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationEvent {
    /// The permission prompt became visible
    PromptShown {
        /// Whether it was requested explicitly rather than by the timer
        manual: bool,
    },
    /// A prompt session ended
    PromptResolved(PromptResolution),
}

/// Read model subscription
///
/// Wraps the acquirer's state channel and derives the read model on demand.
pub struct ReadModelWatch {
    rx: watch::Receiver<AcquirerState>,
}

impl ReadModelWatch {
    /// Current read model
    pub fn current(&self) -> LocationReadModel {
        LocationReadModel::from(&*self.rx.borrow())
    }

    /// Wait for the next change
    ///
    /// Returns `None` once the acquirer is gone.
    pub async fn changed(&mut self) -> Option<LocationReadModel> {
        self.rx.changed().await.ok()?;
        Some(LocationReadModel::from(&*self.rx.borrow_and_update()))
    }

    /// Wait until the read model satisfies `predicate`
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&LocationReadModel) -> bool,
    ) -> Option<LocationReadModel> {
        let current = LocationReadModel::from(&*self.rx.borrow_and_update());
        if predicate(&current) {
            return Some(current);
        }
        loop {
            let next = self.changed().await?;
            if predicate(&next) {
                return Some(next);
            }
        }
    }
}

/// Handle for the deferred automatic prompt
///
/// When dropped, the timer is cancelled.
struct PromptTimer {
    stop_tx: Option<oneshot::Sender<()>>,
    _handle: JoinHandle<()>,
}

impl PromptTimer {
    fn start(orchestrator: Weak<LocationOrchestrator>, delay: Duration) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if let Some(orchestrator) = orchestrator.upgrade() {
                        orchestrator.prompt_delay_elapsed();
                    }
                }
                _ = stop_rx => {
                    tracing::debug!("Location prompt timer cancelled");
                }
            }
        });

        PromptTimer { stop_tx: Some(stop_tx), _handle: handle }
    }
}

impl Drop for PromptTimer {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Location permission orchestrator
///
/// # Example
///
/// ```no_run
/// use app_platform::LocationService;
/// use app_state::location::{LocationAcquirer, LocationConfig, LocationOrchestrator};
/// use std::sync::Arc;
///
/// async fn run(service: Arc<dyn LocationService>) {
///     let acquirer = Arc::new(LocationAcquirer::new(service, LocationConfig::default()));
///     let orchestrator = LocationOrchestrator::mount(acquirer);
///
///     // Render the prompt from this flag and route its callbacks back
///     let mut prompt = orchestrator.subscribe_prompt();
///     while prompt.changed().await.is_ok() {
///         if prompt.borrow().visible {
///             orchestrator.on_allow().await;
///             break;
///         }
///     }
///
///     println!("{:?}", orchestrator.read_model().current_city);
///     orchestrator.teardown();
/// }
/// ```
pub struct LocationOrchestrator {
    acquirer: Arc<LocationAcquirer>,
    machine: Mutex<PromptMachine>,
    prompt_tx: watch::Sender<PromptProps>,
    events_tx: broadcast::Sender<LocationEvent>,
    timer: Mutex<Option<PromptTimer>>,
    torn_down: AtomicBool,
}

impl LocationOrchestrator {
    /// Create an orchestrator without starting it
    pub fn new(acquirer: Arc<LocationAcquirer>) -> Self {
        let (prompt_tx, _) = watch::channel(PromptProps::default());
        let (events_tx, _) = broadcast::channel(16);

        Self {
            acquirer,
            machine: Mutex::new(PromptMachine::new()),
            prompt_tx,
            events_tx,
            timer: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Create and start an orchestrator
    pub fn mount(acquirer: Arc<LocationAcquirer>) -> Arc<Self> {
        let orchestrator = Arc::new(Self::new(acquirer));
        orchestrator.start();
        orchestrator
    }

    /// Run mount-time work
    ///
    /// Starts the acquirer's silent permission check and arms the automatic
    /// prompt. Calling it again has no further effect.
    pub fn start(self: &Arc<Self>) {
        if self.is_torn_down() {
            return;
        }

        // Detached; its results are dropped if we tear down first.
        let _initial_check = self.acquirer.mount();

        let config = self.acquirer.config();
        if !config.auto_prompt {
            return;
        }
        if !self.machine.lock().schedule() {
            return;
        }

        let delay = config.prompt_delay();
        tracing::debug!("Location prompt scheduled in {:?}", delay);
        *self.timer.lock() = Some(PromptTimer::start(Arc::downgrade(self), delay));
    }

    /// The acquirer this orchestrator drives
    pub fn acquirer(&self) -> &Arc<LocationAcquirer> {
        &self.acquirer
    }

    /// Current read model
    pub fn read_model(&self) -> LocationReadModel {
        LocationReadModel::from(&self.acquirer.state())
    }

    /// Subscribe to read model changes
    pub fn subscribe_read_model(&self) -> ReadModelWatch {
        ReadModelWatch { rx: self.acquirer.subscribe() }
    }

    /// Props for the prompt collaborator
    pub fn prompt_props(&self) -> PromptProps {
        *self.prompt_tx.borrow()
    }

    /// Subscribe to prompt visibility changes
    pub fn subscribe_prompt(&self) -> watch::Receiver<PromptProps> {
        self.prompt_tx.subscribe()
    }

    /// Subscribe to prompt lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<LocationEvent> {
        self.events_tx.subscribe()
    }

    /// Current prompt phase
    pub fn phase(&self) -> PromptPhase {
        self.machine.lock().phase()
    }

    /// Whether the automatic prompt has been used up
    pub fn has_prompted(&self) -> bool {
        self.machine.lock().has_prompted()
    }

    /// Whether [`teardown`](Self::teardown) has run
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Show the permission prompt now
    ///
    /// Bypasses the one-shot guard of the automatic prompt.
    pub fn request_location_permission(&self) {
        if self.is_torn_down() {
            return;
        }

        let shown = self.machine.lock().show_manually();
        if shown {
            tracing::debug!("Location prompt shown on request");
            self.publish_prompt();
            let _ = self.events_tx.send(LocationEvent::PromptShown { manual: true });
        }
    }

    /// Fetch a fresh location
    pub async fn update_location(&self) {
        self.acquirer.get_current_location().await;
    }

    /// The user accepted the prompt
    ///
    /// Hides the prompt, requests permission and fetches only if it was
    /// granted.
    pub async fn on_allow(&self) {
        if !self.resolve(PromptResolution::Allowed) {
            return;
        }

        if self.acquirer.request_permission().await && !self.is_torn_down() {
            self.acquirer.get_current_location().await;
        }
    }

    /// The user declined the prompt
    pub fn on_deny(&self) {
        self.resolve(PromptResolution::Denied);
    }

    /// The user dismissed the prompt
    pub fn on_close(&self) {
        self.resolve(PromptResolution::Dismissed);
    }

    /// Route a prompt callback
    pub async fn handle_prompt(&self, action: PromptAction) {
        match action {
            PromptAction::Allow => self.on_allow().await,
            PromptAction::Deny => self.on_deny(),
            PromptAction::Close => self.on_close(),
        }
    }

    /// Cancel the pending prompt and stop applying results
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        drop(self.timer.lock().take());
        self.acquirer.unmount();
        tracing::debug!("Location orchestrator torn down");
    }

    fn prompt_delay_elapsed(&self) {
        if self.is_torn_down() {
            return;
        }

        let already_granted = self.acquirer.config().skip_prompt_when_granted
            && self.acquirer.permission().is_granted();
        let transition = self.machine.lock().delay_elapsed(already_granted);

        match transition {
            Some(PromptPhase::PromptVisible) => {
                tracing::debug!("Location prompt shown");
                self.publish_prompt();
                let _ = self.events_tx.send(LocationEvent::PromptShown { manual: false });
            }
            Some(PromptPhase::Resolved(resolution)) => {
                tracing::debug!("Location prompt skipped, permission already granted");
                let _ = self.events_tx.send(LocationEvent::PromptResolved(resolution));
            }
            _ => {}
        }
    }

    fn resolve(&self, resolution: PromptResolution) -> bool {
        if self.is_torn_down() {
            return false;
        }

        let resolved = self.machine.lock().resolve(resolution);
        if resolved {
            tracing::debug!("Location prompt resolved: {:?}", resolution);
            self.publish_prompt();
            let _ = self.events_tx.send(LocationEvent::PromptResolved(resolution));
        } else {
            tracing::debug!("Ignoring {:?}, prompt not visible", resolution);
        }
        resolved
    }

    fn publish_prompt(&self) {
        let props = self.machine.lock().props();
        self.prompt_tx.send_if_modified(|current| {
            if *current == props {
                return false;
            }
            *current = props;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::config::LocationConfig;
    use crate::location::error::LocationError;
    use crate::location::types::UserCoordinates;
    use app_platform::scripted::ScriptedLocationService;
    use app_platform::{Address, Coordinates, MockLocationService, PermissionStatus};

    const PROMPT_DELAY: Duration = Duration::from_millis(2_000);

    fn mount_with(
        service: &Arc<ScriptedLocationService>,
        config: LocationConfig,
    ) -> Arc<LocationOrchestrator> {
        let acquirer = Arc::new(LocationAcquirer::new(service.clone(), config));
        LocationOrchestrator::mount(acquirer)
    }

    fn new_york_service() -> ScriptedLocationService {
        ScriptedLocationService::new()
            .with_fix(Ok(Coordinates::new(40.0, -74.0)))
            .with_geocode(Ok(vec![Address::with_city("New York")]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_appears_after_delay() {
        let service = Arc::new(ScriptedLocationService::new());
        let orchestrator = mount_with(&service, LocationConfig::default());
        assert_eq!(orchestrator.phase(), PromptPhase::PromptScheduled);

        tokio::time::sleep(PROMPT_DELAY - Duration::from_millis(1)).await;
        assert!(!orchestrator.prompt_props().visible);
        assert!(!orchestrator.has_prompted());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(orchestrator.prompt_props().visible);
        assert!(orchestrator.has_prompted());
        assert_eq!(orchestrator.phase(), PromptPhase::PromptVisible);
        assert_eq!(service.request_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_fetches_location() {
        let service = Arc::new(new_york_service());
        let orchestrator = mount_with(&service, LocationConfig::default());
        let mut events = orchestrator.subscribe_events();

        tokio::time::sleep(PROMPT_DELAY + Duration::from_millis(1)).await;
        assert_eq!(events.recv().await.unwrap(), LocationEvent::PromptShown { manual: false });

        orchestrator.on_allow().await;

        assert!(!orchestrator.prompt_props().visible);
        assert_eq!(
            events.recv().await.unwrap(),
            LocationEvent::PromptResolved(PromptResolution::Allowed)
        );
        let model = orchestrator.read_model();
        assert_eq!(model.current_city.as_deref(), Some("New York"));
        assert_eq!(
            model.user_location,
            Some(UserCoordinates { latitude: 40.0, longitude: -74.0 })
        );
        assert!(!model.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_with_os_denial_skips_fetch() {
        let service = Arc::new(
            new_york_service().with_request_result(Ok(PermissionStatus::Denied)),
        );
        let orchestrator = mount_with(&service, LocationConfig::default());

        tokio::time::sleep(PROMPT_DELAY + Duration::from_millis(1)).await;
        orchestrator.handle_prompt(PromptAction::Allow).await;

        let model = orchestrator.read_model();
        assert!(model.current_city.is_none());
        assert!(model.user_location.is_none());
        assert_eq!(service.fix_calls(), 0);
        assert_eq!(
            orchestrator.acquirer().state().error,
            Some(LocationError::PermissionDenied)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deny_and_close_only_hide() {
        let mut mock = MockLocationService::new();
        mock.expect_check_permission()
            .returning(|| Ok(PermissionStatus::Undetermined));
        mock.expect_request_permission().never();
        mock.expect_current_fix().never();
        mock.expect_reverse_geocode().never();

        let acquirer = Arc::new(LocationAcquirer::new(Arc::new(mock), LocationConfig::default()));
        let orchestrator = LocationOrchestrator::mount(acquirer);

        tokio::time::sleep(PROMPT_DELAY + Duration::from_millis(1)).await;
        orchestrator.on_deny();
        assert!(!orchestrator.prompt_props().visible);
        assert_eq!(orchestrator.phase(), PromptPhase::Resolved(PromptResolution::Denied));

        orchestrator.request_location_permission();
        orchestrator.on_close();
        assert!(!orchestrator.prompt_props().visible);
        assert_eq!(orchestrator.phase(), PromptPhase::Resolved(PromptResolution::Dismissed));
        assert_eq!(orchestrator.read_model(), LocationReadModel::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_request_after_one_shot() {
        let service = Arc::new(ScriptedLocationService::new());
        let orchestrator = mount_with(&service, LocationConfig::default());

        tokio::time::sleep(PROMPT_DELAY + Duration::from_millis(1)).await;
        orchestrator.on_close();
        assert!(orchestrator.has_prompted());

        orchestrator.request_location_permission();
        assert!(orchestrator.prompt_props().visible);

        orchestrator.on_deny();
        orchestrator.request_location_permission();
        assert!(orchestrator.prompt_props().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_without_visible_prompt_is_ignored() {
        let service = Arc::new(new_york_service());
        let orchestrator = mount_with(&service, LocationConfig::default());

        orchestrator.on_allow().await;

        assert_eq!(orchestrator.phase(), PromptPhase::PromptScheduled);
        assert_eq!(service.request_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prior_grant_skips_automatic_prompt() {
        let service = Arc::new(new_york_service().with_permission(PermissionStatus::Granted));
        let orchestrator = mount_with(&service, LocationConfig::default());

        tokio::time::sleep(PROMPT_DELAY + Duration::from_millis(1)).await;

        assert!(!orchestrator.prompt_props().visible);
        assert!(orchestrator.has_prompted());
        assert_eq!(
            orchestrator.phase(),
            PromptPhase::Resolved(PromptResolution::AlreadyGranted)
        );
        assert_eq!(orchestrator.read_model().current_city.as_deref(), Some("New York"));
        assert_eq!(service.request_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prior_grant_still_prompts_when_skip_disabled() {
        let service = Arc::new(new_york_service().with_permission(PermissionStatus::Granted));
        let orchestrator =
            mount_with(&service, LocationConfig::default().skip_prompt_when_granted(false));

        tokio::time::sleep(PROMPT_DELAY + Duration::from_millis(1)).await;

        assert!(orchestrator.prompt_props().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_prompt_disabled() {
        let service = Arc::new(ScriptedLocationService::new());
        let orchestrator = mount_with(&service, LocationConfig::default().auto_prompt(false));

        tokio::time::sleep(PROMPT_DELAY * 2).await;

        assert_eq!(orchestrator.phase(), PromptPhase::Idle);
        assert!(!orchestrator.has_prompted());

        orchestrator.request_location_permission();
        assert!(orchestrator.prompt_props().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_does_not_rearm() {
        let service = Arc::new(ScriptedLocationService::new());
        let orchestrator = mount_with(&service, LocationConfig::default());
        let mut events = orchestrator.subscribe_events();

        orchestrator.start();
        orchestrator.start();
        tokio::time::sleep(PROMPT_DELAY + Duration::from_millis(1)).await;
        orchestrator.on_close();
        tokio::time::sleep(PROMPT_DELAY * 3).await;

        assert_eq!(events.recv().await.unwrap(), LocationEvent::PromptShown { manual: false });
        assert_eq!(
            events.recv().await.unwrap(),
            LocationEvent::PromptResolved(PromptResolution::Dismissed)
        );
        assert!(events.try_recv().is_err());
        assert_eq!(service.check_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_before_delay() {
        let service = Arc::new(ScriptedLocationService::new());
        let orchestrator = mount_with(&service, LocationConfig::default());
        let mut events = orchestrator.subscribe_events();
        let prompt = orchestrator.subscribe_prompt();

        tokio::time::sleep(Duration::from_millis(500)).await;
        orchestrator.teardown();
        tokio::time::sleep(PROMPT_DELAY * 2).await;

        assert!(!orchestrator.prompt_props().visible);
        assert!(!orchestrator.has_prompted());
        assert!(!prompt.has_changed().unwrap());
        assert!(events.try_recv().is_err());

        orchestrator.request_location_permission();
        assert!(!orchestrator.prompt_props().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_timer_stops_prompt() {
        let service = Arc::new(ScriptedLocationService::new());
        let orchestrator = mount_with(&service, LocationConfig::default());

        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(orchestrator.timer.lock().take());
        tokio::time::sleep(PROMPT_DELAY * 2).await;

        assert!(!orchestrator.is_torn_down());
        assert!(!orchestrator.has_prompted());
        assert_eq!(orchestrator.phase(), PromptPhase::PromptScheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_location_independent_of_prompt() {
        let service = Arc::new(new_york_service().with_permission(PermissionStatus::Granted));
        let orchestrator = mount_with(&service, LocationConfig::default().auto_prompt(false));

        orchestrator.update_location().await;

        assert_eq!(orchestrator.read_model().current_city.as_deref(), Some("New York"));
        assert!(!orchestrator.prompt_props().visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_model_watch() {
        let service = Arc::new(
            new_york_service()
                .with_permission(PermissionStatus::Granted)
                .with_fix_delay(Duration::from_millis(300)),
        );
        let orchestrator = mount_with(&service, LocationConfig::default().auto_prompt(false));
        let mut watch = orchestrator.subscribe_read_model();

        let loading = watch.wait_for(|model| model.loading).await.unwrap();
        assert!(loading.current_city.is_none());

        let resolved = watch
            .wait_for(|model| model.current_city.is_some() && !model.loading)
            .await
            .unwrap();
        assert_eq!(resolved.current_city.as_deref(), Some("New York"));
        assert_eq!(watch.current(), resolved);
    }
}

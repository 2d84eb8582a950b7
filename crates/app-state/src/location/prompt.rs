//! Permission prompt state machine
//!
//! ```text
//! Idle ──schedule──▶ PromptScheduled ──delay elapsed──▶ PromptVisible ──allow/deny/close──▶ Resolved
//!                                   └──already granted──▶ Resolved(AlreadyGranted)
//! any phase ──show_manually──▶ PromptVisible
//! ```
//!
//! `has_prompted` is the one-shot guard for the automatic path. It flips once,
//! when the scheduled delay first elapses, and is never reset. Manual showing
//! ignores it.

use serde::{Deserialize, Serialize};

/// How a prompt session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptResolution {
    /// The user tapped allow
    Allowed,
    /// The user tapped deny
    Denied,
    /// The user dismissed the prompt
    Dismissed,
    /// The automatic prompt was skipped because permission was already granted
    AlreadyGranted,
}

/// Lifecycle phase of the permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptPhase {
    /// Nothing scheduled
    #[default]
    Idle,
    /// Waiting for the automatic prompt delay
    PromptScheduled,
    /// The prompt is on screen
    PromptVisible,
    /// The last prompt session ended
    Resolved(PromptResolution),
}

/// User response emitted by the prompt collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptAction {
    /// `onAllow`
    Allow,
    /// `onDeny`
    Deny,
    /// `onClose`
    Close,
}

impl From<PromptAction> for PromptResolution {
    fn from(action: PromptAction) -> Self {
        match action {
            PromptAction::Allow => PromptResolution::Allowed,
            PromptAction::Deny => PromptResolution::Denied,
            PromptAction::Close => PromptResolution::Dismissed,
        }
    }
}

/// Props handed to the prompt collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptProps {
    /// Whether the prompt is on screen
    pub visible: bool,
}

/// Prompt phase plus the one-shot guard
#[derive(Debug, Clone, Default)]
pub struct PromptMachine {
    phase: PromptPhase,
    has_prompted: bool,
}

impl PromptMachine {
    /// Create an idle machine
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase
    pub fn phase(&self) -> PromptPhase {
        self.phase
    }

    /// Whether the automatic prompt has been used up
    pub fn has_prompted(&self) -> bool {
        self.has_prompted
    }

    /// Whether the prompt is on screen
    pub fn show_modal(&self) -> bool {
        self.phase == PromptPhase::PromptVisible
    }

    /// Props for the prompt collaborator
    pub fn props(&self) -> PromptProps {
        PromptProps { visible: self.show_modal() }
    }

    /// Arm the automatic prompt
    ///
    /// Only valid from `Idle` before the one-shot is used. Returns whether the
    /// prompt was scheduled.
    pub fn schedule(&mut self) -> bool {
        if self.phase != PromptPhase::Idle || self.has_prompted {
            return false;
        }
        self.phase = PromptPhase::PromptScheduled;
        true
    }

    /// Handle the automatic prompt delay elapsing
    ///
    /// The first call uses up the one-shot whatever the phase. The prompt is
    /// shown only if it is still scheduled, so a prompt the user already saw or
    /// answered manually is not repeated. Returns the new phase if it changed.
    pub fn delay_elapsed(&mut self, already_granted: bool) -> Option<PromptPhase> {
        if self.has_prompted {
            return None;
        }
        self.has_prompted = true;

        if self.phase != PromptPhase::PromptScheduled {
            return None;
        }

        self.phase = if already_granted {
            PromptPhase::Resolved(PromptResolution::AlreadyGranted)
        } else {
            PromptPhase::PromptVisible
        };
        Some(self.phase)
    }

    /// Show the prompt regardless of the one-shot guard
    ///
    /// Returns `false` if it was already visible.
    pub fn show_manually(&mut self) -> bool {
        if self.show_modal() {
            return false;
        }
        self.phase = PromptPhase::PromptVisible;
        true
    }

    /// End the visible prompt session
    ///
    /// Returns `false` (and changes nothing) when the prompt is not visible.
    pub fn resolve(&mut self, resolution: PromptResolution) -> bool {
        if !self.show_modal() {
            return false;
        }
        self.phase = PromptPhase::Resolved(resolution);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automatic_path() {
        let mut machine = PromptMachine::new();
        assert_eq!(machine.phase(), PromptPhase::Idle);
        assert!(!machine.props().visible);

        assert!(machine.schedule());
        assert_eq!(machine.phase(), PromptPhase::PromptScheduled);
        assert!(!machine.has_prompted());

        assert_eq!(machine.delay_elapsed(false), Some(PromptPhase::PromptVisible));
        assert!(machine.has_prompted());
        assert!(machine.props().visible);

        assert!(machine.resolve(PromptResolution::Allowed));
        assert_eq!(machine.phase(), PromptPhase::Resolved(PromptResolution::Allowed));
        assert!(!machine.show_modal());
    }

    #[test]
    fn test_delay_fires_once() {
        let mut machine = PromptMachine::new();
        machine.schedule();

        assert!(machine.delay_elapsed(false).is_some());
        assert!(machine.resolve(PromptResolution::Dismissed));

        assert_eq!(machine.delay_elapsed(false), None);
        assert!(!machine.show_modal());
        assert!(!machine.schedule());
    }

    #[test]
    fn test_already_granted_consumes_one_shot() {
        let mut machine = PromptMachine::new();
        machine.schedule();

        assert_eq!(
            machine.delay_elapsed(true),
            Some(PromptPhase::Resolved(PromptResolution::AlreadyGranted))
        );
        assert!(machine.has_prompted());
        assert!(!machine.show_modal());
    }

    #[test]
    fn test_manual_show_bypasses_guard() {
        let mut machine = PromptMachine::new();
        machine.schedule();
        machine.delay_elapsed(false);
        machine.resolve(PromptResolution::Denied);

        assert!(machine.show_manually());
        assert!(machine.show_modal());
        assert!(!machine.show_manually());

        assert!(machine.resolve(PromptResolution::Denied));
        assert!(machine.show_manually());
    }

    #[test]
    fn test_manual_answer_before_delay_suppresses_automatic() {
        let mut machine = PromptMachine::new();
        machine.schedule();
        machine.show_manually();
        machine.resolve(PromptResolution::Dismissed);

        assert_eq!(machine.delay_elapsed(false), None);
        assert!(machine.has_prompted());
        assert_eq!(machine.phase(), PromptPhase::Resolved(PromptResolution::Dismissed));
    }

    #[test]
    fn test_resolve_requires_visible() {
        let mut machine = PromptMachine::new();
        assert!(!machine.resolve(PromptResolution::Allowed));
        machine.schedule();
        assert!(!machine.resolve(PromptResolution::Allowed));
        assert_eq!(machine.phase(), PromptPhase::PromptScheduled);
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(PromptResolution::from(PromptAction::Allow), PromptResolution::Allowed);
        assert_eq!(PromptResolution::from(PromptAction::Deny), PromptResolution::Denied);
        assert_eq!(PromptResolution::from(PromptAction::Close), PromptResolution::Dismissed);
    }
}

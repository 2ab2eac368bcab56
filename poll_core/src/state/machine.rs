//! Acquisition lifecycle transitions.
//!
//! Idle → Running → StopRequested → Idle for list-mode runs, with histogram
//! runs and reboots as side branches off Idle and ShuttingDown as the
//! terminal state.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of the acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum AcquisitionState {
    /// Nothing running.
    #[default]
    Idle,
    /// List-mode run active, spills being drained.
    Running,
    /// Stop sequence in progress.
    StopRequested,
    /// Histogram run active.
    HistogramRunning,
    /// Crate reboot in progress, waiting for acknowledgement.
    RebootPending,
    /// Exiting; no further transitions.
    ShuttingDown,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::StopRequested => "stopping",
            Self::HistogramRunning => "histogram",
            Self::RebootPending => "rebooting",
            Self::ShuttingDown => "shutting down",
        };
        f.write_str(text)
    }
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded, new state.
    Ok(AcquisitionState),
    /// Transition rejected with a reason.
    Rejected(&'static str),
}

/// Event that can trigger a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqEvent {
    /// Output file (if any) opened and modules started.
    RunStarted,
    /// Stop requested, deadline reached or fatal drain.
    StopBegin,
    /// Stop sequence finished.
    StopComplete,
    /// Histogram run started on the modules.
    HistogramStarted,
    /// Histogram run finished or failed.
    HistogramEnded,
    /// Reboot issued.
    RebootBegin,
    /// Reboot acknowledged.
    RebootComplete,
    /// Exit requested with nothing running.
    Kill,
}

/// Holder of the current acquisition state.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionMachine {
    state: AcquisitionState,
}

impl AcquisitionMachine {
    /// Create a machine in Idle state.
    pub const fn new() -> Self {
        Self {
            state: AcquisitionState::Idle,
        }
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Whether a list-mode or histogram run occupies the modules.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(
            self.state,
            AcquisitionState::Running
                | AcquisitionState::StopRequested
                | AcquisitionState::HistogramRunning
        )
    }

    /// Attempt a transition given an event.
    pub fn handle_event(&mut self, event: AcqEvent) -> TransitionResult {
        use AcqEvent::*;
        use AcquisitionState::*;

        let next = match (self.state, event) {
            // List-mode run
            (Idle, RunStarted) => Running,
            (Running, StopBegin) => StopRequested,
            (StopRequested, StopComplete) => Idle,

            // Histogram run
            (Idle, HistogramStarted) => HistogramRunning,
            (HistogramRunning, HistogramEnded) => Idle,

            // Reboot
            (Idle, RebootBegin) => RebootPending,
            (RebootPending, RebootComplete) => Idle,

            // Exit, only once nothing is active
            (Idle | RebootPending, Kill) => ShuttingDown,

            _ => {
                return TransitionResult::Rejected(invalid_transition_reason(self.state, event));
            }
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

fn invalid_transition_reason(state: AcquisitionState, event: AcqEvent) -> &'static str {
    use AcqEvent::*;
    use AcquisitionState::*;
    match (state, event) {
        (ShuttingDown, _) => "ShuttingDown: no transitions allowed",
        (Running | StopRequested | HistogramRunning, Kill) => "active run must be stopped first",
        (Running, _) => "Running: only StopBegin allowed",
        (StopRequested, _) => "StopRequested: only StopComplete allowed",
        (HistogramRunning, _) => "HistogramRunning: only HistogramEnded allowed",
        (RebootPending, _) => "RebootPending: only RebootComplete or Kill allowed",
        (Idle, _) => "Idle: invalid event for current state",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use AcqEvent::*;
    use AcquisitionState::*;

    #[test]
    fn initial_state_is_idle() {
        assert_eq!(AcquisitionMachine::new().state(), Idle);
    }

    #[test]
    fn list_mode_cycle() {
        let mut sm = AcquisitionMachine::new();
        assert_eq!(sm.handle_event(RunStarted), TransitionResult::Ok(Running));
        assert!(sm.is_active());
        assert_eq!(sm.handle_event(StopBegin), TransitionResult::Ok(StopRequested));
        assert_eq!(sm.handle_event(StopComplete), TransitionResult::Ok(Idle));
    }

    #[test]
    fn histogram_excludes_list_mode() {
        let mut sm = AcquisitionMachine::new();
        sm.handle_event(HistogramStarted);
        assert!(matches!(sm.handle_event(RunStarted), TransitionResult::Rejected(_)));
        assert_eq!(sm.handle_event(HistogramEnded), TransitionResult::Ok(Idle));
    }

    #[test]
    fn reboot_only_from_idle() {
        let mut sm = AcquisitionMachine { state: Running };
        assert!(matches!(sm.handle_event(RebootBegin), TransitionResult::Rejected(_)));

        let mut sm = AcquisitionMachine::new();
        assert_eq!(sm.handle_event(RebootBegin), TransitionResult::Ok(RebootPending));
        assert_eq!(sm.handle_event(RebootComplete), TransitionResult::Ok(Idle));
    }

    #[test]
    fn kill_requires_inactive_run() {
        for initial in [Running, StopRequested, HistogramRunning] {
            let mut sm = AcquisitionMachine { state: initial };
            assert_eq!(
                sm.handle_event(Kill),
                TransitionResult::Rejected("active run must be stopped first"),
                "Kill from {initial:?} should be rejected"
            );
        }
        let mut sm = AcquisitionMachine::new();
        assert_eq!(sm.handle_event(Kill), TransitionResult::Ok(ShuttingDown));
    }

    #[test]
    fn shutting_down_is_terminal() {
        let mut sm = AcquisitionMachine { state: ShuttingDown };
        for event in [RunStarted, HistogramStarted, RebootBegin, Kill] {
            assert!(matches!(sm.handle_event(event), TransitionResult::Rejected(_)));
        }
    }
}
